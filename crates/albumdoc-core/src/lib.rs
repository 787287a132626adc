#![deny(missing_docs)]
//! Albumdoc core library.
//!
//! Transport-agnostic logic: album aggregation, per-user staging sessions,
//! document rendering and the conversion trigger.

/// Album (media group) aggregation.
pub mod aggregator;
/// Configuration management.
pub mod config;
/// Error taxonomy shared by intake and conversion.
pub mod error;
/// Validation and staging of inbound media.
pub mod intake;
/// Output kinds and file naming policy.
pub mod output;
/// Image to PDF/DOCX rendering.
pub mod render;
/// Per-user session store.
pub mod session;
/// Per-user staging directories.
pub mod staging;
/// Ports implemented by the messaging transport.
pub mod transport;
/// Conversion trigger and cancellation.
pub mod trigger;
/// Utility functions.
pub mod utils;

#[cfg(test)]
pub mod testing;
