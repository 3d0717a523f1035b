//! Client-local session state: the unwrapped key pair lives only here, never
//! on the server. Everything in this module runs on the user's device.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::encryption::{self, EncryptionError, KeyPair, SharedKey};
use crate::models::{Event, EventContent};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum LoginError {
    /// Deliberately the same for unknown email and wrong password.
    #[error("Failed email/password combination.")]
    FailedCombination,
}

/// A previously logged-in account kept around for quick account swapping.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OtherSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub key_pair: KeyPair,
}

/// The session blob the client keeps in local storage. Cleared on logout and
/// on any failed decryption (treated as an authentication failure).
#[derive(Serialize, Deserialize, Clone)]
pub struct StoredSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub key_pair: KeyPair,
    #[serde(default)]
    pub other_sessions: Vec<OtherSession>,
    // Derived once per session, not a process-wide cache
    #[serde(skip)]
    shared_key: OnceCell<SharedKey>,
}

/// Export file format: `{"events": [{"name": ..., "date": "YYYY-MM-DD"}]}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ExportFile {
    pub events: Vec<EventContent>,
}

/// Generate the key material for a new account: a fresh key pair plus its
/// wrapped form for the server to store.
pub fn signup_key_material(password: &str) -> Result<(KeyPair, String), EncryptionError> {
    let auth_key = encryption::derive_auth_key(password);
    let key_pair = encryption::generate_key_pair();
    let wrapped_key_pair = encryption::wrap(&key_pair, &auth_key)?;

    Ok((key_pair, wrapped_key_pair))
}

/// Complete a login by unwrapping the server-returned key pair with the
/// password. Failure is the wrong-password signal; the caller must discard
/// any local state and delete the half-created server session.
pub fn login(
    email: &str,
    password: &str,
    wrapped_key_pair: &str,
    session_id: Uuid,
    user_id: Uuid,
    existing_session: Option<StoredSession>,
) -> Result<StoredSession, LoginError> {
    let auth_key = encryption::derive_auth_key(password);

    let key_pair = encryption::unwrap(wrapped_key_pair, &auth_key)
        .map_err(|_| LoginError::FailedCombination)?;

    Ok(establish_session(email, key_pair, session_id, user_id, existing_session))
}

/// Build the stored session, pushing any previous session for a different
/// account onto the swap list.
pub fn establish_session(
    email: &str,
    key_pair: KeyPair,
    session_id: Uuid,
    user_id: Uuid,
    existing_session: Option<StoredSession>,
) -> StoredSession {
    let lowercase_email = email.trim().to_lowercase();

    let mut other_sessions = existing_session
        .as_ref()
        .map(|session| session.other_sessions.clone())
        .unwrap_or_default();

    if let Some(existing) = existing_session {
        if existing.email != lowercase_email {
            other_sessions.insert(
                0,
                OtherSession {
                    session_id: existing.session_id,
                    user_id: existing.user_id,
                    email: existing.email,
                    key_pair: existing.key_pair,
                },
            );
        }
    }

    StoredSession {
        session_id,
        user_id,
        email: lowercase_email,
        key_pair,
        other_sessions,
        shared_key: OnceCell::new(),
    }
}

/// Swap to another logged-in account by email. The current session moves to
/// the front of the swap list. Returns `None` when no such account is stored.
pub fn swap_account(session: StoredSession, new_email: &str) -> Option<StoredSession> {
    let found_index = session
        .other_sessions
        .iter()
        .position(|other| other.email == new_email)?;

    let mut other_sessions = session.other_sessions.clone();
    let found = other_sessions.remove(found_index);

    other_sessions.insert(
        0,
        OtherSession {
            session_id: session.session_id,
            user_id: session.user_id,
            email: session.email,
            key_pair: session.key_pair,
        },
    );

    Some(StoredSession {
        session_id: found.session_id,
        user_id: found.user_id,
        email: found.email,
        key_pair: found.key_pair,
        other_sessions,
        shared_key: OnceCell::new(),
    })
}

impl StoredSession {
    /// The field-encryption key, derived once per session and reused.
    pub fn shared_key(&self) -> Result<&SharedKey, EncryptionError> {
        self.shared_key
            .get_or_try_init(|| encryption::derive_shared_key(&self.key_pair))
    }

    pub fn encrypt_name(&self, name: &str) -> Result<String, EncryptionError> {
        encryption::encrypt_field(name, self.shared_key()?)
    }

    /// Decrypt event names in place, after fetching them from the server.
    pub fn decrypt_event_names(&self, events: &mut [Event]) -> Result<(), EncryptionError> {
        let shared_key = self.shared_key()?;

        for event in events {
            event.name = encryption::decrypt_field(&event.name, shared_key)?;
        }

        Ok(())
    }

    /// Build the export payload from decrypted events, dropping ids.
    pub fn export_all_data(&self, events: &[Event]) -> ExportFile {
        ExportFile {
            events: events
                .iter()
                .map(|event| EventContent {
                    name: event.name.clone(),
                    date: event.date.clone(),
                })
                .collect(),
        }
    }

    /// Encrypt imported event names before sending them to the server.
    pub fn prepare_import(
        &self,
        events: &[EventContent],
    ) -> Result<Vec<EventContent>, EncryptionError> {
        let shared_key = self.shared_key()?;

        events
            .iter()
            .map(|event| {
                Ok(EventContent {
                    name: encryption::encrypt_field(&event.name, shared_key)?,
                    date: event.date.clone(),
                })
            })
            .collect()
    }
}
