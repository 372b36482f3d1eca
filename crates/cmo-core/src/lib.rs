#![forbid(unsafe_code)]

//! Core: input events and logging for the CMO alert feed.
//!
//! # Role in the workspace
//! `cmo-core` is the input layer. It owns the normalized event types that the
//! runtime (`cmo-runtime`) routes into models and the logging facade every
//! other crate reports through.
//!
//! # Primary responsibilities
//! - **Event**: canonical host events (keys, scroll offsets, viewport resizes).
//! - **Logging**: `tracing` re-exports and optional subscriber installation.

pub mod event;
pub mod logging;

// Re-export tracing macros at crate root for ergonomic use.
#[cfg(feature = "tracing")]
pub use logging::{
    debug, debug_span, error, error_span, info, info_span, trace, trace_span, warn, warn_span,
};
