/// Inbound identity-provider webhooks
///
/// - `signature`: Svix HMAC signature verification
/// - `events`: Clerk event envelope and typed payloads

pub mod events;
pub mod signature;

pub use events::{ClerkUser, EventError, WebhookEnvelope, WebhookEvent};
pub use signature::{WebhookError, WebhookHeaders, WebhookVerifier};
