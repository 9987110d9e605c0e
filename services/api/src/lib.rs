//! Clearflow API service library crate.
//!
//! # Purpose
//! Exposes the HTTP surface, token verification, identity provider
//! reconciliation, finance rules, configuration, and storage backends for
//! use by the binary and tests.
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod finance;
pub mod identity;
pub mod model;
pub mod observability;
pub mod store;
