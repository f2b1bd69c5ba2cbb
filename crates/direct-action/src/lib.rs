//! # Callbridge Direct Action - background HTTP fallback
//!
//! This crate performs the remote side effect of a user decline directly
//! from the native layer, for the case where no application listener can be
//! assumed reachable (cold start, killed process).
//!
//! ## Proper Layer Separation
//! ```text
//! bridge-core -> direct-action
//! ```
//!
//! Direct-action focuses on:
//! - Namespaced credential storage
//! - `{key}` placeholder template resolution
//! - Issuing the configured HTTP request with a bearer credential
//! - One-shot authentication refresh and retry on 401
//!
//! Call state, event delivery and durability live in `bridge-core`; this
//! crate knows nothing about calls beyond the metadata map it is handed.

pub mod config;
pub mod error;
pub mod executor;
pub mod secrets;
pub mod template;

pub use config::{ActionConfigStore, BackgroundActionConfig, RefreshConfig};
pub use error::{ActionError, ActionResult};
pub use executor::DirectActionExecutor;
pub use secrets::SecretStore;

/// Direct-action version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
