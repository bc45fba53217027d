//! Alert delivery channels.
//!
//! Uses teloxide `Bot` directly (send-only, no dispatcher). A transport is
//! stateless per call and shared by every watchdog instance.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{info, warn};

/// Sends a rendered alert to operators.
#[async_trait]
pub trait AlertTransport: Send + Sync {
    /// Deliver one alert.
    ///
    /// # Errors
    ///
    /// Returns an error if the alert could not be delivered.
    async fn send(&self, subject: &str, body: &str) -> anyhow::Result<()>;

    /// Whether a successful `send` reaches an operator.
    fn delivers(&self) -> bool {
        true
    }
}

/// Telegram transport for alert notifications.
pub struct TelegramTransport {
    bot: Bot,
    notify_users: Vec<i64>,
}

impl TelegramTransport {
    /// Create a new transport sending to `notify_users`.
    pub fn new(bot_token: &str, notify_users: Vec<i64>) -> Self {
        Self {
            bot: Bot::new(bot_token),
            notify_users,
        }
    }

    /// Number of configured recipients.
    pub fn recipient_count(&self) -> usize {
        self.notify_users.len()
    }
}

#[async_trait]
impl AlertTransport for TelegramTransport {
    async fn send(&self, subject: &str, body: &str) -> anyhow::Result<()> {
        if self.notify_users.is_empty() {
            anyhow::bail!("no telegram recipients configured");
        }

        let text = format_message(subject, body);
        let mut any_sent = false;
        for &user_id in &self.notify_users {
            match self
                .bot
                .send_message(ChatId(user_id), &text)
                .parse_mode(ParseMode::Html)
                .await
            {
                Ok(_) => any_sent = true,
                Err(e) => warn!(user_id, error = %e, "failed to send Telegram message"),
            }
        }
        if !any_sent {
            anyhow::bail!("failed to send Telegram message to any configured user");
        }
        Ok(())
    }
}

/// Writes alerts to the log instead of delivering them.
///
/// Used for dry runs and when no Telegram recipient is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyTransport;

#[async_trait]
impl AlertTransport for LogOnlyTransport {
    async fn send(&self, subject: &str, body: &str) -> anyhow::Result<()> {
        info!(subject, body, "alert logged, not delivered");
        Ok(())
    }

    fn delivers(&self) -> bool {
        false
    }
}

/// Render an alert as Telegram HTML.
pub fn format_message(subject: &str, body: &str) -> String {
    format!(
        "<b>{subject}</b>\n\n{body}",
        subject = html_escape(subject),
        body = html_escape(body),
    )
}

/// Escape HTML special characters for Telegram.
fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
