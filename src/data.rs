use chrono::{Duration, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    Event, EventContent, Subscription, SubscriptionExternal, User, UserExtra, UserSession,
    Verification, VerificationCode, VerificationPurpose,
};
use crate::utils::{generate_random_code, split_array_in_chunks};

const TRIAL_DAYS: i64 = 30;
const SESSION_DAYS: i64 = 90;
const VERIFICATION_CODE_MINUTES: i64 = 30;

// Bulk imports run in transactions of this many events each, with a fixed
// pause in between so a large import doesn't monopolize the pool.
const IMPORT_CHUNK_LENGTH: usize = 100;
const IMPORT_CHUNK_DELAY_MS: u64 = 100;

pub async fn get_user_by_email(db: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    let lowercase_email = email.to_lowercase().trim().to_string();

    sqlx::query_as::<_, User>(
        "SELECT id, email, subscription, status, encrypted_key_pair, extra, created_at
         FROM loggit_users WHERE email = $1 LIMIT 1",
    )
    .bind(&lowercase_email)
    .fetch_optional(db)
    .await
}

pub async fn get_user_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT id, email, subscription, status, encrypted_key_pair, extra, created_at
         FROM loggit_users WHERE id = $1 LIMIT 1",
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

/// Create a user on a 30-day trial.
pub async fn create_user(
    db: &PgPool,
    email: &str,
    encrypted_key_pair: &str,
) -> Result<User, sqlx::Error> {
    let now = Utc::now();

    let subscription = Subscription {
        external: SubscriptionExternal::default(),
        is_monthly: None,
        expires_at: now + Duration::days(TRIAL_DAYS),
        updated_at: now,
    };

    sqlx::query_as::<_, User>(
        "INSERT INTO loggit_users (email, subscription, status, encrypted_key_pair, extra)
         VALUES ($1, $2, 'trial', $3, $4)
         RETURNING id, email, subscription, status, encrypted_key_pair, extra, created_at",
    )
    .bind(email)
    .bind(Json(subscription))
    .bind(encrypted_key_pair)
    .bind(Json(UserExtra::default()))
    .fetch_one(db)
    .await
}

pub async fn update_user(db: &PgPool, user: &User) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE loggit_users SET
            email = $2,
            subscription = $3,
            status = $4,
            encrypted_key_pair = $5,
            extra = $6
         WHERE id = $1",
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.subscription)
    .bind(&user.status)
    .bind(&user.encrypted_key_pair)
    .bind(&user.extra)
    .execute(db)
    .await?;

    Ok(())
}

/// Delete a user and everything they own.
pub async fn delete_user(db: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM loggit_user_sessions WHERE user_id = $1")
        .bind(user_id)
        .execute(db)
        .await?;

    sqlx::query("DELETE FROM loggit_verification_codes WHERE user_id = $1")
        .bind(user_id)
        .execute(db)
        .await?;

    sqlx::query("DELETE FROM loggit_events WHERE user_id = $1")
        .bind(user_id)
        .execute(db)
        .await?;

    sqlx::query("DELETE FROM loggit_users WHERE id = $1")
        .bind(user_id)
        .execute(db)
        .await?;

    Ok(())
}

pub async fn get_session_by_id(
    db: &PgPool,
    id: Uuid,
) -> Result<Option<UserSession>, sqlx::Error> {
    sqlx::query_as::<_, UserSession>(
        "SELECT id, user_id, expires_at, verified, last_seen_at, created_at
         FROM loggit_user_sessions WHERE id = $1 AND expires_at > now() LIMIT 1",
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

/// Sessions for brand-new users are born verified; login sessions start
/// unverified until the emailed code is confirmed.
pub async fn create_session(
    db: &PgPool,
    user: &User,
    verified: bool,
) -> Result<UserSession, sqlx::Error> {
    sqlx::query_as::<_, UserSession>(
        "INSERT INTO loggit_user_sessions (user_id, expires_at, verified, last_seen_at)
         VALUES ($1, $2, $3, now())
         RETURNING id, user_id, expires_at, verified, last_seen_at, created_at",
    )
    .bind(user.id)
    .bind(Utc::now() + Duration::days(SESSION_DAYS))
    .bind(verified)
    .fetch_one(db)
    .await
}

pub async fn update_session(db: &PgPool, session: &UserSession) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE loggit_user_sessions SET
            expires_at = $2,
            verified = $3,
            last_seen_at = $4
         WHERE id = $1",
    )
    .bind(session.id)
    .bind(session.expires_at)
    .bind(session.verified)
    .bind(session.last_seen_at)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn delete_session(db: &PgPool, session_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM loggit_user_sessions WHERE id = $1")
        .bind(session_id)
        .execute(db)
        .await?;

    Ok(())
}

/// Validate a (user, session) pair and slide the session expiry forward.
/// Every failure mode maps to the same generic `NotFound`.
pub async fn validate_user_and_session(
    db: &PgPool,
    user_id: Uuid,
    session_id: Uuid,
    accept_unverified_session: bool,
) -> Result<(User, UserSession), AppError> {
    let user = get_user_by_id(db, user_id).await?.ok_or(AppError::NotFound)?;

    let mut session = get_session_by_id(db, session_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if session.user_id != user.id || (!session.verified && !accept_unverified_session) {
        return Err(AppError::NotFound);
    }

    session.last_seen_at = Utc::now();
    session.expires_at = Utc::now() + Duration::days(SESSION_DAYS);

    update_session(db, &session).await?;

    Ok((user, session))
}

/// Issue a 6-digit single-use code scoped to (user, session, purpose),
/// valid for 30 minutes. Returns the code for delivery.
pub async fn create_verification_code(
    db: &PgPool,
    user: &User,
    session: &UserSession,
    purpose: VerificationPurpose,
) -> Result<String, sqlx::Error> {
    let code = generate_random_code();

    sqlx::query(
        "INSERT INTO loggit_verification_codes (user_id, code, expires_at, verification)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(user.id)
    .bind(&code)
    .bind(Utc::now() + Duration::minutes(VERIFICATION_CODE_MINUTES))
    .bind(Json(Verification { id: session.id, purpose }))
    .execute(db)
    .await?;

    Ok(code)
}

/// Consume a verification code. Expired, already-used and mismatched codes
/// all surface as `NotFound`.
pub async fn validate_verification_code(
    db: &PgPool,
    user: &User,
    session: &UserSession,
    code: &str,
    purpose: VerificationPurpose,
) -> Result<(), AppError> {
    let verification_code = sqlx::query_as::<_, VerificationCode>(
        "SELECT id, user_id, code, expires_at, verification
         FROM loggit_verification_codes
         WHERE user_id = $1 AND
            code = $2 AND
            verification ->> 'type' = $3 AND
            verification ->> 'id' = $4 AND
            expires_at > now()
         LIMIT 1",
    )
    .bind(user.id)
    .bind(code)
    .bind(purpose.as_str())
    .bind(session.id.to_string())
    .fetch_optional(db)
    .await?
    .ok_or(AppError::NotFound)?;

    sqlx::query("DELETE FROM loggit_verification_codes WHERE id = $1")
        .bind(verification_code.id)
        .execute(db)
        .await?;

    Ok(())
}

pub async fn get_all_events(db: &PgPool, user_id: Uuid) -> Result<Vec<Event>, sqlx::Error> {
    sqlx::query_as::<_, Event>(
        "SELECT id, user_id, name, date, extra
         FROM loggit_events WHERE user_id = $1 ORDER BY date DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}

/// Events for a given YYYY-MM month. Dates are stored as text, so the
/// lexical `-01`/`-31` bounds cover every month.
pub async fn get_events_by_month(
    db: &PgPool,
    user_id: Uuid,
    month: &str,
) -> Result<Vec<Event>, sqlx::Error> {
    sqlx::query_as::<_, Event>(
        "SELECT id, user_id, name, date, extra
         FROM loggit_events
         WHERE user_id = $1 AND date >= $2 AND date <= $3
         ORDER BY date DESC",
    )
    .bind(user_id)
    .bind(format!("{month}-01"))
    .bind(format!("{month}-31"))
    .fetch_all(db)
    .await
}

pub async fn create_event(
    db: &PgPool,
    user_id: Uuid,
    content: &EventContent,
    extra: &serde_json::Value,
) -> Result<Event, sqlx::Error> {
    sqlx::query_as::<_, Event>(
        "INSERT INTO loggit_events (user_id, name, date, extra)
         VALUES ($1, $2, $3, $4)
         RETURNING id, user_id, name, date, extra",
    )
    .bind(user_id)
    .bind(&content.name)
    .bind(&content.date)
    .bind(Json(extra))
    .fetch_one(db)
    .await
}

/// Update an event, scoped to its owner. Returns false when no row matched.
pub async fn update_event(db: &PgPool, event: &Event) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE loggit_events SET
            name = $3,
            date = $4,
            extra = $5
         WHERE id = $1 AND user_id = $2",
    )
    .bind(event.id)
    .bind(event.user_id)
    .bind(&event.name)
    .bind(&event.date)
    .bind(&event.extra)
    .execute(db)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_event(db: &PgPool, event_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM loggit_events WHERE id = $1 AND user_id = $2")
        .bind(event_id)
        .bind(user_id)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_all_events(db: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM loggit_events WHERE user_id = $1")
        .bind(user_id)
        .execute(db)
        .await?;

    Ok(())
}

/// Bulk-import events in paced chunks, one transaction per chunk.
pub async fn import_user_data(
    db: &PgPool,
    user_id: Uuid,
    events: &[EventContent],
) -> Result<(), sqlx::Error> {
    let chunks = split_array_in_chunks(events, IMPORT_CHUNK_LENGTH);
    let chunk_count = chunks.len();

    for (index, chunk) in chunks.into_iter().enumerate() {
        let mut transaction = db.begin().await?;

        for event in &chunk {
            sqlx::query(
                "INSERT INTO loggit_events (user_id, name, date, extra)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(user_id)
            .bind(&event.name)
            .bind(&event.date)
            .bind(Json(serde_json::json!({})))
            .execute(&mut *transaction)
            .await?;
        }

        transaction.commit().await?;

        if index + 1 < chunk_count {
            tokio::time::sleep(std::time::Duration::from_millis(IMPORT_CHUNK_DELAY_MS)).await;
        }
    }

    Ok(())
}
