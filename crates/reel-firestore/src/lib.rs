//! Job record store.
//!
//! This crate provides:
//! - The `JobStore` trait (CRUD plus one atomic conditional update)
//! - A Firestore REST backend using `updateTime` preconditions
//! - An in-memory backend for tests and single-process use
//! - Service account authentication via gcp_auth, emulator support
//! - Retry with backoff and request metrics

pub mod auth;
pub mod client;
pub mod error;
pub mod job_repo;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig, Precondition};
pub use error::{FirestoreError, FirestoreResult};
pub use job_repo::FirestoreJobStore;
pub use memory::InMemoryJobStore;
pub use retry::RetryConfig;
pub use store::JobStore;
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
