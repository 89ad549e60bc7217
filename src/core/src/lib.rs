//! ECI Core - Foundational Types
//!
//! Descriptors, digests, media types, configuration and the error type
//! shared by the store, registry and CLI crates.

pub mod config;
pub mod descriptor;
pub mod digest;
pub mod error;
pub mod media_type;

// Re-export commonly used types
pub use config::PullConfig;
pub use descriptor::{Descriptor, ANNOTATION_MEDIA_TYPE, ANNOTATION_ROLE, ANNOTATION_TITLE};
pub use digest::{Digest, Digester};
pub use error::{EciError, Result};
pub use media_type::Compression;

/// ECI version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
