//! Identity provider integration.
//!
//! # Purpose
//! Verifies signed webhook deliveries from the identity provider and keeps
//! the local user table in step with its user lifecycle.
pub mod events;
pub mod reconciler;
pub mod signature;
