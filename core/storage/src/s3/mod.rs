//! Amazon S3 (and S3-compatible) storage backend.
//!
//! This module provides a storage backend using the AWS SDK with:
//! - Static credentials from configuration or the `AWS_*` environment
//! - Custom API endpoints and path-style addressing for MinIO, Ceph and friends
//! - Canned ACLs mapped onto public/private URL policy
//! - SDK presigning for private objects

pub mod config;
pub mod provider;

pub use config::S3Config;
pub use provider::{create_s3_backend, S3Backend};
