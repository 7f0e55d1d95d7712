use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use concat_string::concat_string;
use serde::{Deserialize, Serialize};

use crate::{bot::Notifier, config, logging, util::http};

pub struct Telegram {
    send_message_url: String,
    chat_id: String,
    disable_notification: bool,
    configured: bool,
}

impl Telegram {
    pub fn new(settings: &config::Telegram) -> Self {
        Self {
            send_message_url: concat_string!(
                settings.api_base.trim_end_matches('/'),
                "/bot",
                settings.token.trim(),
                "/sendMessage"
            ),
            chat_id: settings.chat_id.trim().to_string(),
            disable_notification: settings.disable_notification,
            configured: settings.is_configured(),
        }
    }

    async fn send_message(&self, payload: SendMessageRequest<'_>) -> Result<()> {
        let body = http::post(&self.send_message_url, None, Some(payload.into_form()))
            .await
            .map_err(|err| anyhow!("Failed to send_message because: {:?}", err))?;

        let response: SendMessageResponse = serde_json::from_str(&body)
            .map_err(|err| anyhow!("Unexpected sendMessage response {}: {:?}", body, err))?;

        if !response.ok {
            return Err(anyhow!(
                "Telegram rejected the message: {}",
                response.description.unwrap_or_default()
            ));
        }

        if let Some(message) = response.result {
            logging::debug_file_async(format!("telegram message_id:{}", message.message_id));
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for Telegram {
    /// Without a token or chat id nothing is sent.
    async fn send(&self, message: &str) -> Result<()> {
        if !self.configured {
            logging::warn_file_async(format!(
                "Telegram is not configured, dropping message: {}",
                message
            ));
            return Ok(());
        }

        self.send_message(SendMessageRequest::new(
            &self.chat_id,
            message,
            self.disable_notification,
        ))
        .await
    }
}

#[derive(Serialize, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    description: Option<String>,
    result: Option<Message>,
}

#[derive(Serialize, Deserialize)]
struct Message {
    message_id: i64,
}

#[derive(Serialize)]
pub struct SendMessageRequest<'a> {
    pub chat_id: &'a str,
    pub text: &'a str,
    pub parse_mode: &'a str,
    pub disable_notification: bool,
}

impl<'a> SendMessageRequest<'a> {
    pub fn new(chat_id: &'a str, text: &'a str, disable_notification: bool) -> Self {
        SendMessageRequest {
            chat_id,
            text,
            parse_mode: "HTML",
            disable_notification,
        }
    }

    fn into_form(self) -> HashMap<&'static str, String> {
        HashMap::from([
            ("chat_id", self.chat_id.to_string()),
            ("text", self.text.to_string()),
            ("parse_mode", self.parse_mode.to_string()),
            (
                "disable_notification",
                self.disable_notification.to_string(),
            ),
        ])
    }
}
