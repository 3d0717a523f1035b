use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

#[derive(Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub subscription: Json<Subscription>,
    pub status: String, // "trial", "active" or "inactive"
    pub encrypted_key_pair: String,
    pub extra: Json<UserExtra>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Subscription {
    pub external: SubscriptionExternal,
    #[serde(rename = "isMonthly", skip_serializing_if = "Option::is_none")]
    pub is_monthly: Option<bool>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SubscriptionExternal {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paddle: Option<PaddleSubscription>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PaddleSubscription {
    pub user_id: String,
    pub subscription_id: String,
    pub update_url: String,
    pub cancel_url: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_current_month_stats_in_top_stats: Option<bool>,
}

#[derive(Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, sqlx::FromRow)]
pub struct VerificationCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub verification: Json<Verification>,
}

/// Scopes a verification code to the session and operation it was issued for.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Verification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub purpose: VerificationPurpose,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationPurpose {
    Session,
    UserUpdate,
    DataDelete,
    UserDelete,
}

impl VerificationPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationPurpose::Session => "session",
            VerificationPurpose::UserUpdate => "user-update",
            VerificationPurpose::DataDelete => "data-delete",
            VerificationPurpose::UserDelete => "user-delete",
        }
    }
}

#[derive(Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Ciphertext at rest and in transit; only the client ever sees the name.
    pub name: String,
    pub date: String, // YYYY-MM-DD
    pub extra: Json<serde_json::Value>,
}

/// The part of an event the user actually owns: a name and a date.
/// Also the shape of entries in the export/import file format.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EventContent {
    pub name: String,
    pub date: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_purpose_serializes_kebab_case() {
        for (purpose, expected) in [
            (VerificationPurpose::Session, "session"),
            (VerificationPurpose::UserUpdate, "user-update"),
            (VerificationPurpose::DataDelete, "data-delete"),
            (VerificationPurpose::UserDelete, "user-delete"),
        ] {
            assert_eq!(serde_json::to_value(purpose).unwrap(), expected);
            assert_eq!(purpose.as_str(), expected);
        }
    }

    #[test]
    fn test_subscription_wire_format() {
        let subscription = Subscription {
            external: SubscriptionExternal::default(),
            is_monthly: Some(true),
            expires_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let value = serde_json::to_value(&subscription).unwrap();
        assert!(value.get("isMonthly").is_some());
        assert!(value.get("external").is_some());
    }
}
