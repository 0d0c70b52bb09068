//! Outbound side channels: Telegram moderation alerts and e-mail.

pub mod mail;
pub mod telegram;
