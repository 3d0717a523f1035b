use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const HELP_EMAIL: &str = "help@loggit.net";

const BREVO_API_URL: &str = "https://api.brevo.com/v3/smtp/email";

// Transactional template ids configured in Brevo
const TEMPLATE_VERIFY_LOGIN: u32 = 3;
const TEMPLATE_VERIFY_UPDATE: u32 = 4;
const TEMPLATE_VERIFY_DELETE: u32 = 5;

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("email rejected: {0}")]
    Rejected(String),
}

#[derive(Serialize)]
struct EmailRecipient {
    email: String,
}

#[derive(Serialize)]
struct EmailRequestBody {
    #[serde(rename = "templateId")]
    template_id: u32,
    params: serde_json::Value,
    to: Vec<EmailRecipient>,
    #[serde(rename = "replyTo")]
    reply_to: EmailRecipient,
}

#[derive(Deserialize)]
struct EmailResponseBody {
    code: Option<String>,
    message: Option<String>,
}

/// Sends verification-code emails through Brevo. Without an API key
/// (local development) the code is logged instead of sent.
#[derive(Clone)]
pub struct Mailer {
    api_key: Option<String>,
    client: reqwest::Client,
}

impl Mailer {
    pub fn from_env() -> Self {
        let api_key = std::env::var("BREVO_API_KEY").ok().filter(|key| !key.is_empty());

        if api_key.is_none() {
            log::warn!("BREVO_API_KEY not set; verification codes will be logged, not emailed");
        }

        Self {
            api_key,
            client: reqwest::Client::new(),
        }
    }

    async fn send_with_template(
        &self,
        to: &str,
        template_id: u32,
        params: serde_json::Value,
    ) -> Result<(), EmailError> {
        let Some(api_key) = &self.api_key else {
            log::info!("email template {template_id} for {to}: {params}");
            return Ok(());
        };

        let body = EmailRequestBody {
            template_id,
            params,
            to: vec![EmailRecipient { email: to.to_string() }],
            reply_to: EmailRecipient { email: HELP_EMAIL.to_string() },
        };

        let response = self
            .client
            .post(BREVO_API_URL)
            .header("Api-Key", api_key)
            .json(&body)
            .send()
            .await?;

        let result: EmailResponseBody = response.json().await?;

        if result.code.is_some() || result.message.is_some() {
            return Err(EmailError::Rejected(format!(
                "template {template_id}: {} {}",
                result.code.unwrap_or_default(),
                result.message.unwrap_or_default(),
            )));
        }

        Ok(())
    }

    pub async fn send_verify_login_email(
        &self,
        email: &str,
        verification_code: &str,
    ) -> Result<(), EmailError> {
        self.send_with_template(
            email,
            TEMPLATE_VERIFY_LOGIN,
            serde_json::json!({ "verificationCode": verification_code }),
        )
        .await
    }

    /// `update_subject` is "your email" or "your password".
    pub async fn send_verify_update_email(
        &self,
        email: &str,
        verification_code: &str,
        update_subject: &str,
    ) -> Result<(), EmailError> {
        self.send_with_template(
            email,
            TEMPLATE_VERIFY_UPDATE,
            serde_json::json!({
                "verificationCode": verification_code,
                "updateSubject": update_subject,
            }),
        )
        .await
    }

    /// `deletion_subject` is "all your data" or "your account".
    pub async fn send_verify_delete_email(
        &self,
        email: &str,
        verification_code: &str,
        deletion_subject: &str,
    ) -> Result<(), EmailError> {
        self.send_with_template(
            email,
            TEMPLATE_VERIFY_DELETE,
            serde_json::json!({
                "verificationCode": verification_code,
                "deletionSubject": deletion_subject,
            }),
        )
        .await
    }
}
