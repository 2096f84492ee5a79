//! Artifact storage adapters.
//!
//! This crate provides:
//! - The `ArtifactStore` trait (fetch/put/delete over binary blobs)
//! - A local-disk backend
//! - A Cloudflare R2 backend

pub mod client;
pub mod error;
pub mod local;
pub mod store;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use local::{LocalArtifactStore, LocalStoreConfig};
pub use store::ArtifactStore;
