//! vfscache Common - Shared types and utilities
//!
//! This crate provides the identifiers, error taxonomy and configuration
//! used across all vfscache components.

pub mod config;
pub mod error;
pub mod types;

pub use config::{CacheFiles, ViewerConfig};
pub use error::{Error, Result};
pub use types::*;
