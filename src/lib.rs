//! Dropbox Backup Core Library
//!
//! This library provides the core functionality for the `dropbox-backup`
//! tool, which mirrors a remote Dropbox tree onto local disk with bounded
//! parallelism, adaptive rate limiting, retry with backoff, and a live
//! terminal progress view.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`remote`] - Remote client abstraction and the Dropbox HTTP client
//! - [`scan`] - Paged listing, filtering and scan totals
//! - [`download`] - Worker pool, rate limiter, retry policy and run statistics
//! - [`display`] - Fixed-slot progress block and run summaries
//! - [`config`] - Run configuration, defaults and validation

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod display;
pub mod download;
pub mod remote;
pub mod scan;

// Re-export commonly used types
pub use config::BackupConfig;
pub use download::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, Engine, EngineConfig, EngineError, FailureType,
    MAX_CHUNK_SIZE, RateLimiter, RetryDecision, RetryPolicy, RunReport, StatsStore, StopSignal,
    classify_error,
};
pub use remote::{DropboxClient, FileDescriptor, RemoteError, RemoteSource};
pub use scan::{FilterOptions, ScanResult, ScanSummary, scan};
