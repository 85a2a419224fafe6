//! Common utilities and types shared across omnistore crates.
//!
//! Every backend reports failures through the same [`Error`] taxonomy so
//! callers can branch on the kind of failure without knowing the vendor.

pub mod error;

pub use error::{Error, Result};
