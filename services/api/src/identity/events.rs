//! Identity provider lifecycle events (Clerk webhook payloads).
use serde::Deserialize;
use serde_json::Value;

pub const USER_CREATED: &str = "user.created";
pub const USER_UPDATED: &str = "user.updated";
pub const USER_DELETED: &str = "user.deleted";

/// Envelope of every delivery. `data` is only interpreted for recognised
/// types; anything else is acknowledged untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EmailAddress {
    pub id: String,
    pub email_address: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProviderUser {
    pub id: String,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    pub primary_email_address_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ProviderUser {
    /// The address flagged as primary, else the first listed one.
    pub fn primary_email(&self) -> Option<&str> {
        let primary = self.primary_email_address_id.as_deref().and_then(|id| {
            self.email_addresses
                .iter()
                .find(|address| address.id == id)
        });
        primary
            .or_else(|| self.email_addresses.first())
            .map(|address| address.email_address.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DeletedObject {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IdentityAction {
    Upsert(ProviderUser),
    Delete(DeletedObject),
    Ignore,
}

impl IdentityEvent {
    pub fn action(&self) -> Result<IdentityAction, serde_json::Error> {
        match self.event_type.as_str() {
            USER_CREATED | USER_UPDATED => {
                ProviderUser::deserialize(&self.data).map(IdentityAction::Upsert)
            }
            USER_DELETED => DeletedObject::deserialize(&self.data).map(IdentityAction::Delete),
            _ => Ok(IdentityAction::Ignore),
        }
    }

    /// Metric label; unknown types share one bucket.
    pub fn type_label(&self) -> &'static str {
        match self.event_type.as_str() {
            USER_CREATED => USER_CREATED,
            USER_UPDATED => USER_UPDATED,
            USER_DELETED => USER_DELETED,
            _ => "other",
        }
    }
}
