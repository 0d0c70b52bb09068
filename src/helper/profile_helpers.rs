use crate::config::Config;
use crate::error::{ApiError, ApiResult, ValidationErrors};
use crate::helper::media_helpers::{self, MultipartForm, UploadedFile};
use crate::helper::validators::{validate_email_format, validate_name, validate_password};
use crate::models::db_operations::users_db_operations;
use crate::models::User;
use crate::{with_conn, DbPool};
use actix_web::web;
use serde::{Deserialize, Deserializer};

/// Accepts `0`/`1`, `true`/`false` and their string forms.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(i)) => i != 0,
        Some(Flag::Text(s)) => parse_flag(&s),
        None => false,
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "True")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileJsonRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub remove_photo: bool,
}

#[derive(Debug)]
pub struct ProfileUpdate {
    pub name: String,
    pub email: String,
    pub password: Option<String>,
    pub remove_photo: bool,
    pub photo: Option<UploadedFile>,
}

impl From<ProfileJsonRequest> for ProfileUpdate {
    fn from(request: ProfileJsonRequest) -> Self {
        Self {
            name: request.name,
            email: request.email,
            password: request.password.filter(|p| !p.is_empty()),
            remove_photo: request.remove_photo,
            photo: None,
        }
    }
}

impl ProfileUpdate {
    pub fn from_form(mut form: MultipartForm) -> ApiResult<Self> {
        let (Some(name), Some(email)) = (form.fields.remove("name"), form.fields.remove("email")) else {
            return Err(ApiError::BadRequest("Wrong request parameters.".to_string()));
        };
        Ok(Self {
            name,
            email,
            password: form.fields.remove("password").filter(|p| !p.is_empty()),
            remove_photo: form.field("removePhoto").map_or(false, parse_flag),
            photo: form.files.remove("photo").filter(|f| !f.filename.is_empty()),
        })
    }
}

fn validate_profile(
    conn: &rusqlite::Connection,
    user: &User,
    update: &ProfileUpdate,
    config: &Config,
) -> ApiResult<()> {
    let mut errors = ValidationErrors::new();

    if let Some(photo) = &update.photo {
        if !media_helpers::is_allowed_image(&photo.filename, &config.upload) {
            errors.add("photo", "Wrong file format.");
        } else if photo.bytes.len() as u64 > config.max_upload_bytes() {
            errors.add("photo", format!("File is too large. Maximum size is {}MB.", config.upload.max_file_size_mb));
        }
    }

    validate_name(&update.name, &config.posts, &mut errors);

    let email = update.email.trim();
    let own_email = email.eq_ignore_ascii_case(&user.email);
    if validate_email_format(email, "email", &mut errors)
        && !own_email
        && users_db_operations::email_is_registered(conn, email)?
    {
        errors.add("email", "A user with this e-mail is already registered.");
    }

    if let Some(password) = &update.password {
        validate_password(password, &config.password, &mut errors);
    }

    errors.into_result()
}

/// Validates and applies a profile change. A replaced or removed photo is deleted
/// from disk once the new profile row is stored.
pub async fn update_profile(
    pool: &web::Data<DbPool>,
    config: &Config,
    user: User,
    update: ProfileUpdate,
) -> ApiResult<()> {
    let (user, mut update) = {
        let config = config.clone();
        with_conn(pool, move |conn| {
            validate_profile(conn, &user, &update, &config)?;
            Ok((user, update))
        })
        .await?
    };

    let new_photo = match update.photo.take() {
        Some(file) => Some(media_helpers::store_upload(&config.upload_path, file).await?),
        None => None,
    };

    let photo = match (&new_photo, update.remove_photo) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => None,
        (None, false) => user.photo.clone(),
    };
    let stale_photo = user.photo.clone().filter(|old| photo.as_deref() != Some(old.as_str()));

    let cost = config.password.bcrypt_cost;
    let user_id = user.id;
    let stored = with_conn(pool, move |conn| {
        users_db_operations::update_profile(
            conn,
            user_id,
            update.name.trim(),
            update.email.trim(),
            photo.as_deref(),
            update.password.as_deref(),
            cost,
        )?;
        Ok(())
    })
    .await;

    if let Err(e) = stored {
        // The row still points at the old photo; the new file is unreferenced.
        if let Some(path) = new_photo {
            if let Err(remove_err) = media_helpers::remove_upload(&config.upload_path, &path).await {
                log::warn!("Could not delete unused photo '{}' of user {}: {}", path, user_id, remove_err);
            }
        }
        return Err(e);
    }

    if let Some(old) = stale_photo {
        if let Err(e) = media_helpers::remove_upload(&config.upload_path, &old).await {
            log::warn!("Could not delete old photo of user {}: {}", user_id, e);
        }
    }
    log::info!("Profile of user {} updated", user_id);
    Ok(())
}
