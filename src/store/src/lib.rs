//! ECI Store - content stores and streaming decompression.
//!
//! Provides the content writer traits, a verbatim in-memory cache, a
//! filesystem target and the decompressing store that gunzips and untars
//! layers while they are being ingested.

#![allow(clippy::result_large_err)]

pub mod content;
pub mod decompress;
pub mod file;
pub mod memory;
pub mod pipe;
pub mod transform;

// Re-export common types
pub use content::{copy, read_all, write_all, ContentWriter, Ingester, Provider, ReaderAt, Status};
pub use decompress::DecompressStore;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use pipe::{PipeOptions, TransformPipe};
pub use transform::{Decode, Gunzip, Untar};
