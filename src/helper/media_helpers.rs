use crate::config::UploadConfig;
use crate::error::{ApiError, ApiResult};
use crate::helper::sanitization_helpers::{file_extension, secure_filename};
use actix_multipart::Multipart;
use actix_web::web;
use futures_util::StreamExt;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// URL prefix under which the upload directory is served.
pub const UPLOAD_URL_PREFIX: &str = "/upload";

const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A fully read multipart body: plain fields and file fields by name.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Reads every part of the body. Files larger than `max_file_bytes` are rejected.
pub async fn read_multipart(mut payload: Multipart, max_file_bytes: u64) -> ApiResult<MultipartForm> {
    let mut form = MultipartForm::default();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?;
        let name = field.content_disposition().get_name().unwrap_or_default().to_string();
        let filename = field.content_disposition().get_filename().map(str::to_string);

        let limit = match filename {
            Some(_) => max_file_bytes as usize,
            None => MAX_TEXT_FIELD_BYTES,
        };
        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;
            if data.len() + chunk.len() > limit {
                return Err(ApiError::BadRequest(match filename {
                    Some(_) => format!("File is too large. Maximum size is {} bytes.", max_file_bytes),
                    None => format!("Form field '{}' is too large.", name),
                }));
            }
            data.extend_from_slice(&chunk);
        }

        match filename {
            Some(filename) => {
                form.files.insert(name, UploadedFile { filename, bytes: data });
            }
            None => {
                let value = String::from_utf8(data)
                    .map_err(|_| ApiError::BadRequest("Invalid UTF-8 in form field.".to_string()))?;
                form.fields.insert(name, value);
            }
        }
    }
    Ok(form)
}

pub fn is_allowed_image(filename: &str, config: &UploadConfig) -> bool {
    file_extension(filename).map_or(false, |ext| config.allowed_extensions.iter().any(|allowed| *allowed == ext))
}

fn random_segment() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(2)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Writes the file to `{upload_root}/xx/yy/zz/{name}` and returns its public path.
pub async fn store_upload(upload_root: &str, file: UploadedFile) -> ApiResult<String> {
    let mut filename = secure_filename(&file.filename);
    if file_extension(&filename).is_none() {
        let ext = file_extension(&file.filename).unwrap_or_else(|| "bin".to_string());
        filename = format!("{}.{}", Uuid::new_v4(), ext);
    }

    let segments = [random_segment(), random_segment(), random_segment()];
    let dir = segments.iter().fold(PathBuf::from(upload_root), |path, segment| path.join(segment));
    let full_path = dir.join(&filename);

    web::block(move || {
        fs::create_dir_all(&dir)?;
        fs::write(&full_path, &file.bytes)
    })
    .await?
    .map_err(|e| ApiError::Internal(format!("Failed to store upload: {}", e)))?;

    Ok(format!("{}/{}/{}", UPLOAD_URL_PREFIX, segments.join("/"), filename))
}

/// Maps a public upload path back onto the upload directory. Paths escaping the
/// directory are refused.
pub fn resolve_upload_path(upload_root: &str, public_path: &str) -> Option<PathBuf> {
    let relative = public_path.strip_prefix(UPLOAD_URL_PREFIX)?.trim_start_matches('/');
    if relative.is_empty() {
        return None;
    }
    let relative = Path::new(relative);
    if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(Path::new(upload_root).join(relative))
}

/// Deletes a previously stored upload. A missing file is not an error.
pub async fn remove_upload(upload_root: &str, public_path: &str) -> ApiResult<()> {
    let Some(path) = resolve_upload_path(upload_root, public_path) else {
        log::warn!("Refusing to delete upload outside the upload directory: '{}'", public_path);
        return Ok(());
    };

    let result = web::block(move || fs::remove_file(&path)).await?;
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("Upload '{}' was already gone.", public_path);
            Ok(())
        }
        Err(e) => Err(ApiError::Internal(format!("Failed to delete upload: {}", e))),
    }
}
