//! Vendor-neutral object storage for Omnistore.
//!
//! This crate provides one trait-based contract ([`Storage`]) over object
//! stores (memory, local filesystem, S3 and S3-compatible services) and a
//! registry for resolving a backend from configuration.
//!
//! # Design Principles
//! - Path agnosticism: keys, rooted keys and absolute URLs name the same object
//! - Async operations: all I/O operations are async
//! - Streaming support: large objects are handled via streams or temp files
//! - Unified error semantics: consistent error kinds across backends

pub mod endpoint;
pub mod local;
pub mod memory;
pub mod object;
pub mod path;
pub mod provider;
pub mod registry;
pub mod s3;
pub mod signing;
pub mod spool;
pub mod url_policy;

#[cfg(test)]
mod conformance;

pub use endpoint::resolve_endpoint;
pub use local::{LocalBackend, LocalConfig};
pub use memory::{MemoryBackend, MemoryConfig};
pub use object::Object;
pub use path::{normalize_key, Addressing};
pub use provider::{reader_stream, Body, ByteStream, LocalFile, Storage};
pub use registry::{create_default_registry, ProviderConfig, ProviderFactory, ProviderRegistry};
pub use s3::{S3Backend, S3Config};
pub use signing::KeyedSigner;
pub use url_policy::{AccessMode, UrlPolicy, UrlSigner};
