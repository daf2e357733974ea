//! Flatstage Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types and utilities for the flatstage workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all flatstage
//! workspace members:
//!
//! - **Error Handling**: the [`StageError`] taxonomy and [`Result`] alias
//! - **Logging**: tracing subscriber initialization
//! - **Locking**: the cross-process advisory job lock
//!
//! # Example
//!
//! ```no_run
//! use flatstage_common::{Result, StageError};
//! use flatstage_common::lock::JobLock;
//!
//! async fn guarded() -> Result<()> {
//!     let mut lock = JobLock::open("/tmp/flatstage/markers.lock")?;
//!     let guard = lock
//!         .try_acquire()?
//!         .ok_or_else(|| StageError::lock_timeout("/tmp/flatstage/markers.lock", 0))?;
//!     // ... exclusive work ...
//!     drop(guard);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod lock;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, StageError};
