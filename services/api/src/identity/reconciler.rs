//! Applies identity provider lifecycle events to the local user store.
//!
//! # Key invariants
//! - Create and update events are the same upsert keyed on the provider's
//!   user id, so duplicate or reordered deliveries converge on one record.
//! - Deleting an absent user is a distinct [`ReconcileError::UserNotFound`],
//!   which the webhook handler treats as an already-applied delivery.
//! - Unknown event types have no side effects.
//!
//! The caller must have verified the delivery signature before calling
//! [`IdentityReconciler::apply`].
use crate::identity::events::{IdentityAction, IdentityEvent, ProviderUser};
use crate::model::{User, UserUpsert};
use crate::observability;
use crate::store::{StoreError, UserStore};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Created(User),
    Updated(User),
    Deleted { external_id: String },
    Ignored { event_type: String },
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Created(_) => "created",
            ReconcileOutcome::Updated(_) => "updated",
            ReconcileOutcome::Deleted { .. } => "deleted",
            ReconcileOutcome::Ignored { .. } => "ignored",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("invalid {event_type} payload: {source}")]
    InvalidPayload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("user {0} not found")]
    UserNotFound(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ReconcileError {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileError::InvalidPayload { .. } => "invalid_payload",
            ReconcileError::UserNotFound(_) => "not_found",
            ReconcileError::Store(_) => "store_error",
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn upsert_from(user: ProviderUser) -> UserUpsert {
    UserUpsert {
        email: user.primary_email().unwrap_or_default().to_string(),
        external_id: user.id,
        first_name: non_blank(user.first_name),
        last_name: non_blank(user.last_name),
        image_url: non_blank(user.image_url),
    }
}

/// Event-driven user synchronisation over a [`UserStore`].
pub struct IdentityReconciler<S: ?Sized> {
    store: Arc<S>,
}

impl<S: UserStore + ?Sized> IdentityReconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn apply(&self, event: &IdentityEvent) -> Result<ReconcileOutcome, ReconcileError> {
        let action = event
            .action()
            .map_err(|source| ReconcileError::InvalidPayload {
                event_type: event.event_type.clone(),
                source,
            })?;
        let result = match action {
            IdentityAction::Upsert(user) => self.upsert(user).await,
            IdentityAction::Delete(deleted) => self.delete(deleted.id).await,
            IdentityAction::Ignore => {
                tracing::debug!(event_type = %event.event_type, "ignoring identity event");
                Ok(ReconcileOutcome::Ignored {
                    event_type: event.event_type.clone(),
                })
            }
        };
        let outcome = match &result {
            Ok(outcome) => outcome.label(),
            Err(err) => err.label(),
        };
        metrics::counter!(
            observability::IDENTITY_EVENTS_TOTAL,
            "type" => event.type_label(),
            "outcome" => outcome
        )
        .increment(1);
        result
    }

    async fn upsert(&self, user: ProviderUser) -> Result<ReconcileOutcome, ReconcileError> {
        let upsert = upsert_from(user);
        if upsert.email.is_empty() {
            tracing::warn!(external_id = %upsert.external_id, "identity event carries no email address");
        }
        let stored = self.store.upsert_user_by_external_id(upsert).await?;
        if stored.is_freshly_created() {
            tracing::info!(external_id = %stored.external_id, user_id = %stored.id, "user created");
            Ok(ReconcileOutcome::Created(stored))
        } else {
            tracing::info!(external_id = %stored.external_id, user_id = %stored.id, "user updated");
            Ok(ReconcileOutcome::Updated(stored))
        }
    }

    async fn delete(&self, external_id: String) -> Result<ReconcileOutcome, ReconcileError> {
        match self.store.delete_user_by_external_id(&external_id).await {
            Ok(()) => {
                tracing::info!(%external_id, "user deleted");
                Ok(ReconcileOutcome::Deleted { external_id })
            }
            Err(StoreError::NotFound(_)) => Err(ReconcileError::UserNotFound(external_id)),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use serde_json::json;

    fn event(value: serde_json::Value) -> IdentityEvent {
        serde_json::from_value(value).expect("event")
    }

    fn user_event(kind: &str, id: &str, email: &str, first_name: &str) -> IdentityEvent {
        event(json!({
            "type": kind,
            "data": {
                "id": id,
                "email_addresses": [
                    { "id": "idn_other", "email_address": "other@example.com" },
                    { "id": "idn_primary", "email_address": email }
                ],
                "primary_email_address_id": "idn_primary",
                "first_name": first_name,
                "last_name": "",
                "image_url": "https://img.example/u.png"
            }
        }))
    }

    fn reconciler() -> (Arc<InMemoryStore>, IdentityReconciler<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), IdentityReconciler::new(store))
    }

    #[tokio::test]
    async fn created_then_updated_converges_on_one_record() {
        let (store, reconciler) = reconciler();
        let created = reconciler
            .apply(&user_event("user.created", "user_1", "ada@example.com", "Ada"))
            .await
            .expect("create");
        let ReconcileOutcome::Created(first) = created else {
            panic!("expected created, got {created:?}");
        };
        assert_eq!(first.created_at, first.updated_at);
        assert_eq!(first.email, "ada@example.com");
        assert_eq!(first.last_name, None);

        let updated = reconciler
            .apply(&user_event("user.updated", "user_1", "ada@new.example", "Augusta"))
            .await
            .expect("update");
        let ReconcileOutcome::Updated(second) = updated else {
            panic!("expected updated, got {updated:?}");
        };
        assert_eq!(second.id, first.id);
        assert!(second.updated_at > second.created_at);

        let stored = store.get_user_by_external_id("user_1").await.expect("user");
        assert_eq!(stored.email, "ada@new.example");
        assert_eq!(stored.first_name.as_deref(), Some("Augusta"));
    }

    #[tokio::test]
    async fn duplicate_created_event_reports_update() {
        let (_store, reconciler) = reconciler();
        let event = user_event("user.created", "user_1", "ada@example.com", "Ada");
        reconciler.apply(&event).await.expect("first");
        let again = reconciler.apply(&event).await.expect("second");
        assert!(matches!(again, ReconcileOutcome::Updated(_)));
    }

    #[tokio::test]
    async fn delete_twice_reports_not_found_and_spares_others() {
        let (store, reconciler) = reconciler();
        reconciler
            .apply(&user_event("user.created", "user_1", "a@example.com", "A"))
            .await
            .expect("user 1");
        reconciler
            .apply(&user_event("user.created", "user_2", "b@example.com", "B"))
            .await
            .expect("user 2");

        let delete = event(json!({ "type": "user.deleted", "data": { "id": "user_1", "deleted": true } }));
        let outcome = reconciler.apply(&delete).await.expect("delete");
        assert_eq!(
            outcome,
            ReconcileOutcome::Deleted {
                external_id: "user_1".to_string()
            }
        );
        let err = reconciler.apply(&delete).await.unwrap_err();
        assert!(matches!(err, ReconcileError::UserNotFound(id) if id == "user_1"));
        store
            .get_user_by_external_id("user_2")
            .await
            .expect("user 2 untouched");
    }

    #[tokio::test]
    async fn unknown_event_type_is_ignored_without_side_effects() {
        let (store, reconciler) = reconciler();
        let outcome = reconciler
            .apply(&event(json!({ "type": "org.created", "data": { "id": "user_1" } })))
            .await
            .expect("ignored");
        assert_eq!(
            outcome,
            ReconcileOutcome::Ignored {
                event_type: "org.created".to_string()
            }
        );
        assert!(store.get_user_by_external_id("user_1").await.is_err());
    }

    #[tokio::test]
    async fn malformed_user_payload_is_invalid() {
        let (_store, reconciler) = reconciler();
        let err = reconciler
            .apply(&event(json!({ "type": "user.updated", "data": { "first_name": "x" } })))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidPayload { .. }));
    }
}
