#![warn(unreachable_pub)]
//! The transactional staging/activation engine for a population of senders and
//! receivers: per-transceiver two-slot parameter stores, the auto-resolution algorithm,
//! SDP transport-file ingestion, a scheduling activator with lock/cancel/rollback, and
//! the in-memory registry tying them together.
//!
//! This crate has no HTTP awareness; the router, schema validation, and device registry
//! publishing a deployment needs around it are external collaborators.

pub mod activator;
pub mod bulk;
pub mod clock;
pub mod error;
pub mod params;
pub mod registry;
pub mod resolve;
pub mod transceiver;
pub mod transport_file;
pub mod value;
