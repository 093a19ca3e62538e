//! Clerk webhook payloads
//!
//! Every delivery is an envelope `{"type", "object", "data"}`. The `type`
//! selects how `data` is interpreted; unknown types are surfaced as
//! [`WebhookEvent::Unhandled`] so the caller can acknowledge them.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::models::user::{UpdateUser, UpsertUser};

pub const USER_CREATED: &str = "user.created";
pub const USER_UPDATED: &str = "user.updated";
pub const USER_DELETED: &str = "user.deleted";
pub const SESSION_CREATED: &str = "session.created";

/// Outer shape shared by every event
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub object: String,

    #[serde(default)]
    pub data: Value,
}

/// The payload of an event could not be interpreted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("Invalid user data")]
    InvalidUserData,

    #[error("Invalid session data")]
    InvalidSessionData,

    #[error("Missing user_id in session data")]
    MissingSessionUser,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EmailVerification {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EmailAddress {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub email_address: String,

    #[serde(default)]
    pub verification: Option<EmailVerification>,
}

/// A Clerk user object; timestamps are Unix milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClerkUser {
    pub id: String,

    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub last_name: Option<String>,

    #[serde(default)]
    pub image_url: Option<String>,

    #[serde(default)]
    pub banned: bool,

    #[serde(default)]
    pub created_at: Option<i64>,

    #[serde(default)]
    pub updated_at: Option<i64>,

    #[serde(default)]
    pub last_sign_in_at: Option<i64>,
}

/// Payload of `user.deleted`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeletedUser {
    pub id: String,

    #[serde(default)]
    pub deleted: bool,
}

/// A parsed, typed webhook event
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    UserCreated(ClerkUser),
    UserUpdated(ClerkUser),
    UserDeleted(DeletedUser),
    /// Carries the signed-in user's identity-provider ID
    SessionCreated { user_id: String },
    Unhandled(String),
}

impl WebhookEvent {
    /// Interprets `data` according to the envelope's `type`
    pub fn from_envelope(envelope: WebhookEnvelope) -> Result<Self, EventError> {
        let user = |data: Value| -> Result<ClerkUser, EventError> {
            serde_json::from_value(data).map_err(|_| EventError::InvalidUserData)
        };

        match envelope.event_type.as_str() {
            USER_CREATED => Ok(WebhookEvent::UserCreated(user(envelope.data)?)),
            USER_UPDATED => Ok(WebhookEvent::UserUpdated(user(envelope.data)?)),
            USER_DELETED => serde_json::from_value(envelope.data)
                .map(WebhookEvent::UserDeleted)
                .map_err(|_| EventError::InvalidUserData),
            SESSION_CREATED => {
                let Value::Object(session) = envelope.data else {
                    return Err(EventError::InvalidSessionData);
                };
                let user_id = session
                    .get("user_id")
                    .and_then(Value::as_str)
                    .ok_or(EventError::MissingSessionUser)?;
                Ok(WebhookEvent::SessionCreated {
                    user_id: user_id.to_string(),
                })
            }
            _ => Ok(WebhookEvent::Unhandled(envelope.event_type)),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

impl ClerkUser {
    /// First non-empty address in list order
    ///
    /// Clerk's primary-address marker is not consulted.
    pub fn primary_email(&self) -> Option<&str> {
        self.email_addresses
            .iter()
            .map(|e| e.email_address.trim())
            .find(|e| !e.is_empty())
    }

    /// True when any address has been verified
    pub fn email_verified(&self) -> bool {
        self.email_addresses.iter().any(|e| {
            e.verification
                .as_ref()
                .is_some_and(|v| v.status == "verified")
        })
    }

    /// First and last name joined by a space, skipping empty parts
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<String> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .filter_map(non_empty)
            .collect();

        (!parts.is_empty()).then(|| parts.join(" "))
    }

    pub fn last_sign_in(&self) -> Option<DateTime<Utc>> {
        self.last_sign_in_at.and_then(from_millis)
    }

    /// The full row to store for this user
    ///
    /// None when the user has no usable email address.
    pub fn to_upsert(&self) -> Option<UpsertUser> {
        let email = self.primary_email()?;

        Some(UpsertUser {
            clerk_id: self.id.clone(),
            email: email.to_string(),
            first_name: non_empty(self.first_name.as_deref()),
            last_name: non_empty(self.last_name.as_deref()),
            name: self.full_name(),
            image_url: non_empty(self.image_url.as_deref()),
            email_verified: self.email_verified(),
            last_sign_in_at: self.last_sign_in(),
            banned: self.banned,
        })
    }

    /// The profile fields to overwrite on an existing row
    ///
    /// The ban flag is applied separately. None when the user has no usable
    /// email address.
    pub fn to_update(&self) -> Option<UpdateUser> {
        let row = self.to_upsert()?;

        Some(UpdateUser {
            email: Some(row.email),
            first_name: Some(row.first_name),
            last_name: Some(row.last_name),
            name: Some(row.name),
            image_url: Some(row.image_url),
            email_verified: Some(row.email_verified),
            last_sign_in_at: Some(row.last_sign_in_at),
        })
    }
}
