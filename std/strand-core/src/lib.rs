//!
//! strand-core - Shared Foundation
//!
//! This crate provides the types shared across all strand crates:
//!
//! - `StorageAllocator` for placing fixed-size queue storage
//! - `SystemStorage` and `TrackingStorage` allocator implementations
//! - `StrandConfig` with its logging, queue and thread sections
//! - `CoreError` for configuration, allocation and logging failures
//! - `logging::init` to install the tracing subscriber
//!

pub mod alloc;
pub mod config;
pub mod errors;
pub mod logging;

pub use alloc::{AllocError, StorageAllocator, SystemStorage, TrackingStorage};
pub use config::{parse_config_str, LoggingConfig, QueueConfig, StrandConfig, ThreadConfig};
pub use errors::CoreError;
