use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    config::EmailConfig,
    error::{AppError, Result},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub message_id: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail>;
}

/// Sends through a Resend-compatible HTTP API.
pub struct ResendMailer {
    http: Client,
    api_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ResendResponse {
    id: String,
}

impl ResendMailer {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl EmailSender for ResendMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(email)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Email API rejected message");
            return Err(AppError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body: ResendResponse = response.json().await?;
        info!(message_id = %body.id, subject = %email.subject, "Email sent");
        Ok(SentEmail { message_id: body.id })
    }
}

/// Development fallback: records the message in the log and sends nothing.
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail> {
        let preview: String = email.text.chars().take(80).collect();
        info!(
            to = ?email.to,
            from = %email.from,
            subject = %email.subject,
            preview = %preview,
            "Email API key not configured, logging email instead of sending"
        );
        Ok(SentEmail {
            message_id: format!("log_{}", uuid::Uuid::new_v4()),
        })
    }
}

/// Picks the HTTP mailer when an API key is configured.
pub fn mailer_from_config(config: &EmailConfig) -> Result<Arc<dyn EmailSender>> {
    match &config.api_key {
        Some(key) => Ok(Arc::new(ResendMailer::new(config.api_url.clone(), key.clone())?)),
        None => {
            warn!("RESEND_API_KEY not set, contact emails will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}
