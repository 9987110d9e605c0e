//! Authentication for inbound API requests.
//!
//! # Purpose
//! Groups the provider key-set cache, bearer token verification, and the
//! principal extractor used by authenticated handlers.
pub mod keyset;
pub mod principal;
pub mod verifier;
