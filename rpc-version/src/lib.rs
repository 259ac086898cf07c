//! API version negotiation for the JSON-RPC peers of a stake pool.
//!
//! Peers advertise the version of their JSON-RPC API as a semantic version triple. A [`semver::Semver`] is
//! checked against the version this pool requires using a [`semver::CompatibilityPolicy`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod semver;

pub use semver::{CompatibilityPolicy, Semver, SemverParseError};
