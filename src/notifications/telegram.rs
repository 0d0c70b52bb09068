use crate::config::TelegramConfig;
use crate::helper::sanitization_helpers::strip_all_html;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct ProxyRequest<'a> {
    token: &'a str,
    message: &'a str,
}

#[derive(Deserialize)]
struct ProxyError {
    error: Option<String>,
    message: Option<String>,
}

/// Characters that MarkdownV2 requires to be escaped with a backslash.
const MARKDOWN_V2_SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

/// Strips HTML and escapes the result for a Telegram MarkdownV2 message.
pub fn escape_markdown(text: &str) -> String {
    let plain = strip_all_html(text);
    let plain = html_escape::decode_html_entities(&plain);
    let mut escaped = String::with_capacity(plain.len());
    for c in plain.chars() {
        if MARKDOWN_V2_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Posts messages to a Telegram proxy which holds the actual bot credentials.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.proxy_url.is_empty() && !self.config.proxy_token.is_empty()
    }

    /// Delivers one message. Failures are logged and reported as `false`.
    pub async fn send(&self, message: &str) -> bool {
        if message.is_empty() || !self.is_enabled() {
            return false;
        }

        let request = ProxyRequest { token: &self.config.proxy_token, message };
        let response = match self.client.post(&self.config.proxy_url).json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                log::error!("Telegram proxy request failed: {}", e);
                return false;
            }
        };

        let status = response.status();
        if status.is_success() {
            return true;
        }

        match response.json::<ProxyError>().await {
            Ok(ProxyError { error, message }) => log::error!(
                "Telegram proxy rejected the message ({}): {}: {}",
                status,
                error.unwrap_or_default(),
                message.unwrap_or_default()
            ),
            Err(_) => log::error!("Telegram proxy rejected the message with status {}", status),
        }
        false
    }

    /// Fire-and-forget alert about a post that now waits for moderation.
    pub fn notify_post_awaiting_moderation(&self, author_email: &str, title: &str, post_id: i64, public_url: &str) {
        if !self.is_enabled() {
            return;
        }

        let message = format!(
            "User *{}* added a new or edited a published post \"[{}]({}/post/{})\" \\(Post ID: {}\\)\\.\n\n\\#moderation",
            escape_markdown(author_email),
            escape_markdown(title),
            public_url.trim_end_matches('/'),
            post_id,
            post_id
        );

        let notifier = self.clone();
        actix_web::rt::spawn(async move {
            if !notifier.send(&message).await {
                log::warn!("Moderation alert for post {} was not delivered.", post_id);
            }
        });
    }
}
