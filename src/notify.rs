use std::time::Duration;

use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::config::LoadFromEnv;

#[derive(Debug, Deserialize)]
struct TelegramEnv {
    telegram_bot_token: Option<String>,
    telegram_chat_id: Option<String>,
}

/// Fire-and-forget Telegram notifications. Delivery failures are logged and
/// dropped; they must never affect a booking result.
pub struct Notifier {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl Notifier {
    /// None when the bot token or chat id is not configured, in which case
    /// the run simply goes unnotified.
    pub fn from_env() -> Option<Self> {
        let env = TelegramEnv::load_from_env().ok()?;
        let bot_token = env.telegram_bot_token?;
        let chat_id = env.telegram_chat_id?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;
        info!("telegram notifications enabled");
        Some(Notifier {
            client,
            bot_token,
            chat_id,
        })
    }

    pub async fn send(&self, text: &str) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let payload = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        match self.client.post(&url).json(&payload).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!("telegram answered HTTP {}", response.status());
            }
            Ok(_) => {}
            Err(e) => warn!("telegram notification failed: {e:#}"),
        }
    }
}
