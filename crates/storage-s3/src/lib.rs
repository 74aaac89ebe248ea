//! AWS SDK S3 backend for the DeltaGlider object store port.
//!
//! This crate provides an [`deltaglider_core::ObjectStore`] implementation
//! using the AWS SDK for Rust. Any S3-compatible provider works: set
//! `AWS_ENDPOINT_URL` for MinIO or R2 and path-style addressing is enabled
//! automatically.
//!
//! Transient failures (timeouts, 5xx, throttling) are retried with full
//! jittered exponential backoff before surfacing.
//!
//! # Example
//!
//! ```ignore
//! use deltaglider_common::DeltaGliderConfig;
//! use deltaglider_s3::S3ObjectStore;
//!
//! let config = DeltaGliderConfig::from_env()?;
//! let store = S3ObjectStore::from_env(&config).await;
//! let engine = deltaglider_core::DeltaEngine::new(store, config);
//! ```

mod client;
mod error;
mod retry;

pub use client::S3ObjectStore;
pub use retry::RetryPolicy;
