//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::WorkerError;
use crate::speech_correction::CorrectionConfig;

/// Where artifacts are fetched from and persisted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactBackend {
    Local,
    R2,
}

impl FromStr for ArtifactBackend {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "r2" | "s3" => Ok(Self::R2),
            other => Err(WorkerError::config_error(format!(
                "unknown ARTIFACT_BACKEND '{other}' (expected local or r2)"
            ))),
        }
    }
}

/// Where job records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStoreBackend {
    Memory,
    Firestore,
}

impl FromStr for JobStoreBackend {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "firestore" => Ok(Self::Firestore),
            other => Err(WorkerError::config_error(format!(
                "unknown JOB_STORE_BACKEND '{other}' (expected memory or firestore)"
            ))),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Work directory for per-job intermediate files
    pub work_dir: PathBuf,
    /// Upper bound on one pipeline execution
    pub job_timeout: Duration,
    /// Grace period for in-flight work on shutdown
    pub shutdown_timeout: Duration,
    /// Files older than this are eligible for the retention sweep
    pub retention_max_age: Duration,
    /// How often the retention sweep runs
    pub sweep_interval: Duration,
    /// Cap on the slug part of output file names
    pub output_name_max_len: usize,
    /// Cap on extracted hook and generated headline text
    pub hook_max_chars: usize,
    /// Retries for persisting the final artifact
    pub persist_retries: u32,
    /// Filler list and gap thresholds for speech correction
    pub correction: CorrectionConfig,
    pub artifact_backend: ArtifactBackend,
    pub job_store_backend: JobStoreBackend,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/reelsmith"),
            job_timeout: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(30),
            retention_max_age: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
            output_name_max_len: 60,
            hook_max_chars: 80,
            persist_retries: 3,
            correction: CorrectionConfig::default(),
            artifact_backend: ArtifactBackend::Local,
            job_store_backend: JobStoreBackend::Memory,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_millis(key: &str) -> Option<f64> {
    env_parse::<u64>(key).map(|ms| ms as f64 / 1000.0)
}

fn correction_from_env(defaults: CorrectionConfig) -> CorrectionConfig {
    let fillers = std::env::var("WORKER_CORRECTION_FILLERS")
        .ok()
        .map(|list| {
            list.split(',')
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|list| !list.is_empty())
        .unwrap_or(defaults.fillers);

    CorrectionConfig {
        fillers,
        join_gap: env_millis("WORKER_CORRECTION_JOIN_GAP_MS").unwrap_or(defaults.join_gap),
        merge_gap: env_millis("WORKER_CORRECTION_MERGE_GAP_MS").unwrap_or(defaults.merge_gap),
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    ///
    /// Unparseable numbers fall back to defaults; an unknown backend name is
    /// an error since silently picking one would hide a deployment mistake.
    pub fn from_env() -> Result<Self, WorkerError> {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            env_parse::<u64>(key)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Ok(Self {
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            job_timeout: secs("WORKER_JOB_TIMEOUT", defaults.job_timeout),
            shutdown_timeout: secs("WORKER_SHUTDOWN_TIMEOUT", defaults.shutdown_timeout),
            retention_max_age: secs("WORKER_RETENTION_MAX_AGE_SECS", defaults.retention_max_age),
            sweep_interval: secs("WORKER_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            output_name_max_len: env_parse("WORKER_OUTPUT_NAME_MAX_LEN")
                .unwrap_or(defaults.output_name_max_len),
            hook_max_chars: env_parse("WORKER_HOOK_MAX_CHARS").unwrap_or(defaults.hook_max_chars),
            persist_retries: env_parse("WORKER_PERSIST_RETRIES")
                .unwrap_or(defaults.persist_retries),
            correction: correction_from_env(defaults.correction),
            artifact_backend: match std::env::var("ARTIFACT_BACKEND") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.artifact_backend,
            },
            job_store_backend: match std::env::var("JOB_STORE_BACKEND") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.job_store_backend,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 7] = [
        "WORKER_WORK_DIR",
        "WORKER_JOB_TIMEOUT",
        "ARTIFACT_BACKEND",
        "JOB_STORE_BACKEND",
        "WORKER_CORRECTION_FILLERS",
        "WORKER_CORRECTION_JOIN_GAP_MS",
        "WORKER_CORRECTION_MERGE_GAP_MS",
    ];

    fn clear() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear();
        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.job_timeout, Duration::from_secs(600));
        assert_eq!(config.hook_max_chars, 80);
        assert_eq!(config.artifact_backend, ArtifactBackend::Local);
        assert_eq!(config.job_store_backend, JobStoreBackend::Memory);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear();
        std::env::set_var("WORKER_WORK_DIR", "/var/lib/reel");
        std::env::set_var("WORKER_JOB_TIMEOUT", "90");
        std::env::set_var("ARTIFACT_BACKEND", "R2");
        std::env::set_var("JOB_STORE_BACKEND", "firestore");
        let config = WorkerConfig::from_env().unwrap();
        clear();

        assert_eq!(config.work_dir, PathBuf::from("/var/lib/reel"));
        assert_eq!(config.job_timeout, Duration::from_secs(90));
        assert_eq!(config.artifact_backend, ArtifactBackend::R2);
        assert_eq!(config.job_store_backend, JobStoreBackend::Firestore);
    }

    #[test]
    #[serial]
    fn test_unknown_backend_is_error() {
        clear();
        std::env::set_var("ARTIFACT_BACKEND", "ftp");
        let result = WorkerConfig::from_env();
        clear();
        assert!(matches!(result, Err(WorkerError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_correction_from_env() {
        clear();
        std::env::set_var("WORKER_CORRECTION_FILLERS", " Um, like ,, Basically");
        std::env::set_var("WORKER_CORRECTION_JOIN_GAP_MS", "500");
        let config = WorkerConfig::from_env().unwrap();
        clear();

        assert_eq!(config.correction.fillers, vec!["um", "like", "basically"]);
        assert!((config.correction.join_gap - 0.5).abs() < 1e-9);
        assert!((config.correction.merge_gap - 0.05).abs() < 1e-9);
    }

    #[test]
    #[serial]
    fn test_blank_filler_list_keeps_defaults() {
        clear();
        std::env::set_var("WORKER_CORRECTION_FILLERS", " , ");
        let config = WorkerConfig::from_env().unwrap();
        clear();
        assert!(config.correction.fillers.iter().any(|w| w == "um"));
    }
}
