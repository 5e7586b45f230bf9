//! ID Onboard: identity onboarding pipeline.
//!
//! Uploaded identity documents flow through extraction, verification
//! against a national registry, and exactly-once customer registration.

pub mod api;
pub mod config;
pub mod error;
pub mod identity;
pub mod pipeline;
pub mod registry;
pub mod store;
