//! In-memory collaborators and a harness wiring them to the real local
//! artifact store and in-memory job store.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reel_firestore::InMemoryJobStore;
use reel_media::silence_removal::plan_trim;
use reel_media::{MediaEngine, MediaError, MediaResult, SilenceTrimConfig, TrimOutcome};
use reel_ml_client::{ContentGenerator, MlError, MlResult, SpeechToText, TranscribeOptions};
use reel_models::{AspectRatio, StageConfig, TimeSpan, TimedText, Transcript};
use reel_storage::{LocalArtifactStore, LocalStoreConfig};
use reel_worker::{
    IngressHandler, IngressRequest, JobExecutor, JobLifecycle, LockRegistry, PipelineExecutor,
    Services, UnlimitedQuota, WorkerConfig,
};
use tempfile::TempDir;
use tokio::sync::{watch, Notify};

/// `silencedetect` output for a 2 s gap at [3 s, 5 s].
pub const GAP_LOG: &str = "\
[silencedetect @ 0x1] silence_start: 3.0
[silencedetect @ 0x1] silence_end: 5.0 | silence_duration: 2.0
";

/// Engine that appends one line per operation to the file it copies.
///
/// Output content therefore encodes exactly which stages touched it.
pub struct FakeEngine {
    pub source_secs: f64,
    pub silence_log: String,
    pub ops: Mutex<Vec<String>>,
    pub fail_on: Mutex<HashSet<&'static str>>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self {
            source_secs: 10.0,
            silence_log: GAP_LOG.to_string(),
            ops: Mutex::new(Vec::new()),
            fail_on: Mutex::new(HashSet::new()),
        }
    }
}

impl FakeEngine {
    pub fn failing(op: &'static str) -> Self {
        let engine = Self::default();
        engine.fail_on.lock().unwrap().insert(op);
        engine
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    async fn apply(&self, op: &'static str, input: &Path, output: &Path, line: String) -> MediaResult<()> {
        self.ops.lock().unwrap().push(op.to_string());
        if input == output {
            // ffmpeg -y would truncate its own input
            return Err(MediaError::invalid_input(format!("{op} would overwrite {}", input.display())));
        }
        if self.fail_on.lock().unwrap().contains(op) {
            // leave a partial file behind like a crashed encoder would
            tokio::fs::write(output, b"partial").await?;
            return Err(MediaError::ffmpeg_failed(
                format!("{op} exited with status 1"),
                Some(format!("{op}: simulated encoder failure\n")),
                Some(1),
            ));
        }
        let mut content = tokio::fs::read_to_string(input).await?;
        content.push_str(&line);
        content.push('\n');
        tokio::fs::write(output, content).await?;
        Ok(())
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn trim_silence(&self, input: &Path, output: &Path) -> MediaResult<TrimOutcome> {
        let plan = plan_trim(&self.silence_log, self.source_secs, &SilenceTrimConfig::default());
        let kept: f64 = if plan.apply {
            plan.keep_spans().iter().map(TimeSpan::duration).sum()
        } else {
            self.source_secs
        };
        self.apply("trim-silence", input, output, format!("trim-silence duration={kept:.3}"))
            .await?;
        Ok(TrimOutcome {
            applied: plan.apply,
            duration_secs: kept,
            removed_secs: self.source_secs - kept,
        })
    }

    async fn normalize_audio(&self, input: &Path, output: &Path) -> MediaResult<()> {
        self.apply("normalize-audio", input, output, "normalize-audio".into()).await
    }

    async fn cut_spans(&self, input: &Path, output: &Path, cuts: &[TimeSpan]) -> MediaResult<()> {
        self.apply("cut-spans", input, output, format!("cut-spans n={}", cuts.len()))
            .await
    }

    async fn burn_captions(&self, input: &Path, output: &Path, transcript: &Transcript) -> MediaResult<()> {
        let line = format!("burn-captions words={}", transcript.words.as_ref().map_or(0, Vec::len));
        self.apply("burn-captions", input, output, line).await
    }

    async fn overlay_headline(&self, input: &Path, output: &Path, text: &str) -> MediaResult<()> {
        self.apply("overlay-headline", input, output, format!("overlay-headline text={text}"))
            .await
    }

    async fn convert_aspect(&self, input: &Path, output: &Path, ratio: AspectRatio) -> MediaResult<()> {
        self.apply("convert-aspect", input, output, format!("convert-aspect {ratio}"))
            .await
    }

    async fn duration(&self, _input: &Path) -> MediaResult<f64> {
        Ok(self.source_secs)
    }
}

/// Speech-to-text returning a canned transcript with a filler and a repeat.
#[derive(Default)]
pub struct FakeSpeech {
    pub calls: Mutex<Vec<(PathBuf, TranscribeOptions)>>,
    pub fail: AtomicBool,
    /// Fail only calls after this many successful ones (0 = no limit)
    pub fail_after: AtomicU32,
    pub block: AtomicBool,
    pub entered: Notify,
}

impl FakeSpeech {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(PathBuf, TranscribeOptions)> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn canned_transcript(with_words: bool) -> Transcript {
    let words = vec![
        TimedText::new(0.0, 0.4, "Stop"),
        TimedText::new(0.5, 1.0, "scrolling."),
        TimedText::new(1.1, 1.4, "um"),
        TimedText::new(1.5, 1.7, "This"),
        TimedText::new(1.8, 2.0, "is"),
        TimedText::new(2.1, 2.2, "the"),
        TimedText::new(2.2, 2.4, "the"),
        TimedText::new(2.5, 2.9, "part."),
    ];
    Transcript {
        full_text: "Stop scrolling. um This is the the part.".to_string(),
        segments: vec![
            TimedText::new(0.0, 1.0, "Stop scrolling."),
            TimedText::new(1.1, 2.9, "um This is the the part."),
        ],
        words: with_words.then_some(words),
    }
}

#[async_trait]
impl SpeechToText for FakeSpeech {
    async fn transcribe(&self, path: &Path, options: TranscribeOptions) -> MlResult<Transcript> {
        let seen = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((path.to_path_buf(), options));
            calls.len() as u32
        };
        self.entered.notify_one();
        if self.block.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let limit = self.fail_after.load(Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) || (limit > 0 && seen > limit) {
            return Err(MlError::ServiceUnavailable("speech backend down".into()));
        }
        if !path.exists() {
            return Err(MlError::invalid_response(format!("{} vanished", path.display())));
        }
        Ok(canned_transcript(options.word_level))
    }
}

/// Content generator with a fixed answer, or an error when `fail` is set.
#[derive(Default)]
pub struct FakeGenerator {
    pub fail: AtomicBool,
    pub calls: AtomicU32,
}

impl FakeGenerator {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn generate_headline(&self, _transcript: &str, _max_chars: usize) -> MlResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(MlError::ServiceUnavailable("generator offline".into()));
        }
        Ok("Rust In Sixty Seconds".to_string())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub store_root: PathBuf,
    pub work_dir: PathBuf,
    pub jobs: Arc<InMemoryJobStore>,
    pub engine: Arc<FakeEngine>,
    pub speech: Arc<FakeSpeech>,
    pub generator: Arc<FakeGenerator>,
    pub locks: Arc<LockRegistry>,
    pub executor: Arc<JobExecutor>,
    pub handler: Arc<IngressHandler>,
    pub shutdown: watch::Sender<bool>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakeEngine::default(), FakeSpeech::default(), FakeGenerator::default())
    }

    pub fn with(engine: FakeEngine, speech: FakeSpeech, generator: FakeGenerator) -> Self {
        Self::with_timeout(engine, speech, generator, Duration::from_secs(30))
    }

    pub fn with_timeout(
        engine: FakeEngine,
        speech: FakeSpeech,
        generator: FakeGenerator,
        job_timeout: Duration,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let store_root = dir.path().join("store");
        let work_dir = dir.path().join("work");
        std::fs::create_dir_all(&store_root).unwrap();
        std::fs::create_dir_all(&work_dir).unwrap();

        let jobs = Arc::new(InMemoryJobStore::new());
        let engine = Arc::new(engine);
        let speech = Arc::new(speech);
        let generator = Arc::new(generator);
        let locks = Arc::new(LockRegistry::new());

        let services = Services {
            artifacts: Arc::new(LocalArtifactStore::new(LocalStoreConfig {
                root: store_root.clone(),
            })),
            jobs: jobs.clone(),
            engine: engine.clone(),
            speech: speech.clone(),
            generator: generator.clone(),
            quota: Arc::new(UnlimitedQuota),
            locks: locks.clone(),
        };
        let config = WorkerConfig {
            work_dir: work_dir.clone(),
            job_timeout,
            persist_retries: 0,
            ..Default::default()
        };

        let lifecycle = Arc::new(JobLifecycle::new(jobs.clone(), services.quota.clone()));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let pipeline = Arc::new(PipelineExecutor::new(services, config));
        let executor = Arc::new(JobExecutor::new(pipeline, lifecycle, shutdown_rx));
        let handler = Arc::new(IngressHandler::new(executor.clone()));

        Self {
            dir,
            store_root,
            work_dir,
            jobs,
            engine,
            speech,
            generator,
            locks,
            executor,
            handler,
            shutdown,
        }
    }

    /// Place a source file in the store and return its key.
    pub fn upload(&self, name: &str) -> String {
        let key = format!("uploads/u1/{name}");
        let path = self.store_root.join(&key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "source\n").unwrap();
        key
    }

    pub fn request(&self, source: &str, stage_config: StageConfig) -> IngressRequest {
        IngressRequest {
            source_artifact_ref: source.to_string(),
            owner_id: "u1".to_string(),
            stage_config,
            existing_job_id: None,
        }
    }

    pub fn stored(&self, key: &str) -> String {
        std::fs::read_to_string(self.store_root.join(key)).unwrap()
    }

    /// Files left anywhere under the work dir.
    pub fn work_files(&self) -> Vec<PathBuf> {
        fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
            if let Ok(entries) = std::fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_dir() {
                        walk(&path, out);
                    } else {
                        out.push(path);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.work_dir, &mut out);
        out
    }
}
