//! Collaborators injected into the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use reel_firestore::{FirestoreJobStore, InMemoryJobStore, JobStore};
use reel_media::{FfmpegEngine, FfmpegEngineConfig, MediaEngine};
use reel_ml_client::{
    ContentGenerator, GeminiClient, MlError, MlResult, SpeechToText, WhisperClient,
};
use reel_storage::{ArtifactStore, LocalArtifactStore, R2Client};
use tracing::{info, warn};

use crate::config::{ArtifactBackend, JobStoreBackend, WorkerConfig};
use crate::error::WorkerResult;
use crate::lock_registry::LockRegistry;
use crate::quota::{QuotaGate, UnlimitedQuota};

/// Everything the executor talks to, as trait objects so tests can swap in
/// fakes.
#[derive(Clone)]
pub struct Services {
    pub artifacts: Arc<dyn ArtifactStore>,
    pub jobs: Arc<dyn JobStore>,
    pub engine: Arc<dyn MediaEngine>,
    pub speech: Arc<dyn SpeechToText>,
    pub generator: Arc<dyn ContentGenerator>,
    pub quota: Arc<dyn QuotaGate>,
    pub locks: Arc<LockRegistry>,
}

impl Services {
    /// Build production collaborators from the environment.
    pub fn from_config(config: &WorkerConfig) -> WorkerResult<Self> {
        let artifacts: Arc<dyn ArtifactStore> = match config.artifact_backend {
            ArtifactBackend::Local => Arc::new(LocalArtifactStore::from_env()),
            ArtifactBackend::R2 => Arc::new(R2Client::from_env()?),
        };

        let jobs: Arc<dyn JobStore> = match config.job_store_backend {
            JobStoreBackend::Memory => {
                warn!("Using in-memory job store; claims do not coordinate across processes");
                Arc::new(InMemoryJobStore::new())
            }
            JobStoreBackend::Firestore => Arc::new(FirestoreJobStore::from_env()?),
        };

        let generator: Arc<dyn ContentGenerator> = match GeminiClient::from_env() {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!("Headline generation unavailable: {}", e);
                Arc::new(UnavailableGenerator)
            }
        };

        info!(
            artifacts = artifacts.backend(),
            job_store = ?config.job_store_backend,
            "Services initialized"
        );

        Ok(Self {
            artifacts,
            jobs,
            engine: Arc::new(FfmpegEngine::new(FfmpegEngineConfig::from_env())),
            speech: Arc::new(WhisperClient::from_env()?),
            generator,
            quota: Arc::new(UnlimitedQuota),
            locks: Arc::new(LockRegistry::new()),
        })
    }
}

/// Generator used when no API key is configured. Every call fails, so a
/// `generated` headline degrades instead of failing the job.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableGenerator;

#[async_trait]
impl ContentGenerator for UnavailableGenerator {
    async fn generate_headline(&self, _transcript: &str, _max_chars: usize) -> MlResult<String> {
        Err(MlError::config("content generation is not configured"))
    }
}
