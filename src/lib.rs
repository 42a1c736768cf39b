//! # Nolossia
//!
//! Deduplicates and merges photo libraries without ever destroying data.
//!
//! ## Core Philosophy
//! - **Never delete** - duplicates are quarantined, near-duplicates only annotated
//! - **Preview first** - nothing moves until the user types the confirmation token
//! - **Audit everything** - every verified move lands in a durable manifest
//!
//! ## Architecture
//! The library is split into a core engine (UI-agnostic) and presentation layers:
//! - `core` - scanning, extraction, classification, planning, execution
//! - `events` - Event-driven progress reporting
//! - `error` - User-friendly error types
//! - `cli` - Command-line interface (binary only)

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{NolossiaError, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point. Logs go to stderr so
/// that process workers keep stdout free for their line protocol. Calling it
/// twice is harmless.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
