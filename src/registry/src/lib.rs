//! ECI Registry - pulling Edge Container Images.
//!
//! Fetches an image from an OCI registry, decompresses its layers while they
//! stream in, and reports where the kernel, initrd and disks were written.

#![allow(clippy::result_large_err)]

pub mod artifact;
pub mod fetch;
pub mod pull;
pub mod reference;
pub mod status;
pub mod target;

// Re-export common types
pub use artifact::{Artifact, Disk, DiskType, Role};
pub use fetch::{ingest_stream, ArtifactFetch, RegistryAuth, RegistryFetch};
pub use pull::Puller;
pub use reference::ImageReference;
pub use status::StatusTracker;
pub use target::Target;
