//! # Vigil Runtime Conformance Validation Layer
//!
//! Vigil interposes between an application and the real implementation of
//! a handle-based XR session API, mirrors every call, and checks
//! arguments, results, and state transitions against the specification's
//! behavior contract. Findings are reported through a failure sink; the
//! result returned to the application is never altered.
//!
//! ## Architecture
//!
//! Vigil is built on a modular architecture:
//! - `registry`: Concurrent hierarchical tracker of opaque object handles
//! - `session`: Session lifecycle state machine and frame-loop checks
//! - `swapchain`: Per-image acquire/wait/release protocol validation
//! - `actions`: Input-synchronization window tracking
//! - `chain`: Extension struct-chain integrity guard
//! - `layer`: Per-call entry points for the generated interceptor
//! - `report`: Finding taxonomy and failure sinks
//! - `config`: Configuration parsing and management
//! - `api`: Marshalled-argument vocabulary shared with the interceptor
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vigil::{VigilConfig, VigilLayer};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = VigilConfig::default();
//!     vigil::logging::init_logging(&config.logging)?;
//!     let layer = VigilLayer::new(&config)?;
//!
//!     // The generated trampolines call into `layer` around every
//!     // intercepted call.
//!     let _ = layer.on_instance_created(vigil::ApiResult::Success, 0x1);
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod api;
pub mod chain;
pub mod config;
pub mod layer;
pub mod logging;
pub mod registry;
pub mod report;
pub mod session;
pub mod swapchain;

// Re-export main types for easy access
pub use api::{ApiResult, Event, ObjectType, SessionPhase};
pub use config::VigilConfig;
pub use layer::VigilLayer;
pub use registry::{HandleKey, HandleRegistry, RegistryError};
pub use report::{CollectingSink, FailureSink, Finding, Reporter, Severity};

// Re-export common error types
pub use anyhow::{Context, Error, Result};

/// Version information for Vigil
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
