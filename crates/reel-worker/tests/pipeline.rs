//! End-to-end pipeline runs against in-memory collaborators.

mod common;

use std::sync::atomic::Ordering;

use common::{FakeEngine, FakeGenerator, FakeSpeech, Harness};
use reel_firestore::JobStore;
use reel_models::{
    ArtifactRef, AspectRatio, FailureKind, HeadlineSource, JobStatus, Stage, StageConfig,
};
use reel_worker::{ExecutionReport, IngressCode, PipelineJob};

async fn run_direct(h: &Harness, key: &str, stage_config: StageConfig) -> ExecutionReport {
    let submission = h
        .executor
        .lifecycle()
        .submit_or_reprocess("u1", key, None)
        .await
        .unwrap();
    let job = PipelineJob {
        job_id: submission.job_id().clone(),
        owner_id: "u1".into(),
        source: ArtifactRef::new(key),
        stage_config,
    };
    h.executor.execute(&job).await.unwrap()
}

fn assert_clean(h: &Harness) {
    for id in h.jobs.ids() {
        assert_eq!(h.locks.held_by(&id), 0, "job {id} still holds locks");
    }
    assert!(h.locks.is_empty(), "lock entries leaked: {}", h.locks.len());
    assert!(h.work_files().is_empty(), "work files left: {:?}", h.work_files());
}

#[tokio::test]
async fn test_trim_only_shortens_output() {
    let h = Harness::new();
    let key = h.upload("talk.mp4");

    let resp = h
        .handler
        .handle(h.request(&key, StageConfig::default()))
        .await
        .unwrap();

    assert_eq!(
        resp.output_artifact_ref,
        format!("outputs/u1/{}/talk.mp4", resp.job_id)
    );
    let output = h.stored(&resp.output_artifact_ref);
    assert_eq!(output, "source\ntrim-silence duration=8.400\n");

    let record = h.jobs.get(&resp.job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.output_artifact_ref.as_deref(), Some(resp.output_artifact_ref.as_str()));
    assert_eq!(h.speech.call_count(), 0);
    assert_clean(&h);
}

#[tokio::test]
async fn test_captions_and_hook_share_one_transcription() {
    let h = Harness::new();
    let key = h.upload("talk.mp4");
    let config = StageConfig {
        captions: true,
        headline: HeadlineSource::ExtractedHook,
        ..Default::default()
    };

    let report = run_direct(&h, &key, config).await;

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.transcription_calls, 1);
    let calls = h.speech.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].0.ends_with("01-trim-silence.mp4"));
    assert!(calls[0].1.word_level);

    let output_ref = report.output_artifact.unwrap();
    assert!(output_ref.ends_with("/stop-scrolling.mp4"));
    let output = h.stored(&output_ref);
    assert!(output.contains("burn-captions words=8"));
    assert!(output.contains("overlay-headline text=Stop scrolling."));
    assert_clean(&h);
}

#[tokio::test]
async fn test_generated_headline_transcribes_source_early() {
    let h = Harness::new();
    let key = h.upload("talk.mp4");
    let config = StageConfig {
        headline: HeadlineSource::Generated,
        ..Default::default()
    };

    let report = run_direct(&h, &key, config).await;

    assert_eq!(report.status, JobStatus::Completed);
    assert!(report.stages_run.contains(&Stage::EarlyTranscribe));
    let calls = h.speech.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].0.ends_with("talk.mp4"));
    assert!(!calls[0].1.word_level);

    let output_ref = report.output_artifact.unwrap();
    assert!(output_ref.ends_with("/rust-in-sixty-seconds.mp4"));
    assert!(h
        .stored(&output_ref)
        .ends_with("overlay-headline text=Rust In Sixty Seconds\n"));
    assert_clean(&h);
}

#[tokio::test]
async fn test_generator_failure_degrades_to_no_overlay() {
    let degraded = Harness::with(
        FakeEngine::default(),
        FakeSpeech::default(),
        FakeGenerator::failing(),
    );
    let key = degraded.upload("talk.mp4");
    let report = run_direct(
        &degraded,
        &key,
        StageConfig {
            headline: HeadlineSource::Generated,
            ..Default::default()
        },
    )
    .await;

    assert_eq!(report.status, JobStatus::Completed);
    assert!(report.was_degraded(Stage::OverlayHeadline));
    assert_eq!(degraded.generator.calls.load(Ordering::SeqCst), 1);
    let record = degraded.jobs.get(&report.job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert!(record.error_message.is_none());
    assert_clean(&degraded);

    let baseline = Harness::new();
    let key = baseline.upload("talk.mp4");
    let plain = run_direct(&baseline, &key, StageConfig::default()).await;

    let degraded_ref = report.output_artifact.unwrap();
    let plain_ref = plain.output_artifact.unwrap();
    assert!(degraded_ref.ends_with("/talk.mp4"));
    assert_eq!(degraded.stored(&degraded_ref), baseline.stored(&plain_ref));
}

#[tokio::test]
async fn test_speech_correction_forces_retranscription() {
    let h = Harness::new();
    let key = h.upload("talk.mp4");
    let config = StageConfig {
        speech_correction: true,
        captions: true,
        ..Default::default()
    };

    let report = run_direct(&h, &key, config).await;

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.transcription_calls, 2);
    let calls = h.speech.calls();
    assert!(calls[0].1.word_level && calls[0].1.prompt_for_disfluencies);
    assert!(calls[1].0.ends_with("02-speech-correct.mp4"));
    assert!(!calls[1].1.prompt_for_disfluencies);

    let output = h.stored(&report.output_artifact.unwrap());
    assert_eq!(
        output,
        "source\ntrim-silence duration=8.400\ncut-spans n=2\nburn-captions words=8\n"
    );
    assert_clean(&h);
}

#[tokio::test]
async fn test_retranscription_failure_skips_captions() {
    let speech = FakeSpeech::default();
    speech.fail_after.store(1, Ordering::SeqCst);
    let h = Harness::with(FakeEngine::default(), speech, FakeGenerator::default());
    let key = h.upload("talk.mp4");
    let config = StageConfig {
        speech_correction: true,
        captions: true,
        ..Default::default()
    };

    let report = run_direct(&h, &key, config).await;

    assert_eq!(report.status, JobStatus::Completed);
    assert!(report.was_degraded(Stage::Retranscribe));
    assert!(!h.engine.ops().contains(&"burn-captions".to_string()));
    let output = h.stored(&report.output_artifact.unwrap());
    assert!(output.ends_with("cut-spans n=2\n"));
    assert_clean(&h);
}

#[tokio::test]
async fn test_all_stages_run_in_order() {
    let h = Harness::new();
    let key = h.upload("talk.mp4");
    let config = StageConfig {
        trim_silence: true,
        normalize_audio: true,
        speech_correction: false,
        captions: true,
        headline: HeadlineSource::Literal("Big News".into()),
        aspect_ratio: Some(AspectRatio::PORTRAIT),
    };

    let report = run_direct(&h, &key, config).await;

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(
        h.engine.ops(),
        vec![
            "trim-silence",
            "normalize-audio",
            "burn-captions",
            "overlay-headline",
            "convert-aspect"
        ]
    );
    let output_ref = report.output_artifact.unwrap();
    assert!(output_ref.ends_with("/big-news.mp4"));
    assert!(h.stored(&output_ref).ends_with("convert-aspect 9:16\n"));
    assert_clean(&h);
}

#[tokio::test]
async fn test_fatal_stage_fails_job_and_cleans_up() {
    let h = Harness::with(
        FakeEngine::failing("burn-captions"),
        FakeSpeech::default(),
        FakeGenerator::default(),
    );
    let key = h.upload("talk.mp4");
    let config = StageConfig {
        captions: true,
        ..Default::default()
    };

    let err = h.handler.handle(h.request(&key, config)).await.unwrap_err();

    assert_eq!(err.code, IngressCode::InternalError);
    assert_eq!(err.status, 500);
    assert!(!err.message.contains("simulated"));

    let job_id = err.job_id.unwrap();
    let record = h.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.failure_kind, Some(FailureKind::Stage));
    let message = record.error_message.unwrap();
    assert!(message.contains("burn-captions"));
    assert!(message.contains("simulated encoder failure"));
    assert!(record.output_artifact_ref.is_none());

    assert!(!h.store_root.join("outputs").exists());
    assert_clean(&h);
}

#[tokio::test]
async fn test_missing_source_is_not_found() {
    let h = Harness::new();

    let err = h
        .handler
        .handle(h.request("uploads/u1/missing.mp4", StageConfig::default()))
        .await
        .unwrap_err();

    assert_eq!(err.code, IngressCode::NotFound);
    let record = h.jobs.get(&err.job_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.failure_kind, Some(FailureKind::NotFound));
    assert_clean(&h);
}

#[tokio::test]
async fn test_invalid_request_has_no_side_effects() {
    let h = Harness::new();
    let mut request = h.request("/etc/passwd", StageConfig::default());
    request.owner_id = String::new();

    let err = h.handler.handle(request).await.unwrap_err();

    assert_eq!(err.code, IngressCode::ValidationError);
    assert!(err.job_id.is_none());
    assert!(h.jobs.is_empty());
}

#[tokio::test]
async fn test_reprocess_after_failure_matches_first_success() {
    let h = Harness::new();
    let config = StageConfig {
        captions: true,
        ..Default::default()
    };

    let err = h
        .handler
        .handle(h.request("uploads/u1/talk.mp4", config.clone()))
        .await
        .unwrap_err();
    let job_id = err.job_id.unwrap();

    let key = h.upload("talk.mp4");
    let mut retry = h.request(&key, config.clone());
    retry.existing_job_id = Some(job_id.clone());
    let resp = h.handler.handle(retry).await.unwrap();

    assert_eq!(resp.job_id, job_id);
    assert_eq!(h.jobs.len(), 1);
    let record = h.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert!(record.error_message.is_none());
    assert!(record.failure_kind.is_none());

    let fresh = Harness::new();
    let fresh_key = fresh.upload("talk.mp4");
    let first = fresh.handler.handle(fresh.request(&fresh_key, config)).await.unwrap();
    assert_eq!(
        h.stored(&resp.output_artifact_ref),
        fresh.stored(&first.output_artifact_ref)
    );
    assert_clean(&h);
}

#[tokio::test]
async fn test_reprocess_by_other_owner_is_unauthorized() {
    let h = Harness::new();
    let key = h.upload("talk.mp4");
    let resp = h
        .handler
        .handle(h.request(&key, StageConfig::default()))
        .await
        .unwrap();

    let mut request = h.request(&key, StageConfig::default());
    request.owner_id = "u2".into();
    request.existing_job_id = Some(resp.job_id.clone());
    let err = h.handler.handle(request).await.unwrap_err();

    assert_eq!(err.code, IngressCode::Unauthorized);
    let record = h.jobs.get(&resp.job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_upload_named_like_stage_output_is_not_overwritten() {
    let h = Harness::new();
    let key = h.upload("01-trim-silence.mp4");

    let report = run_direct(&h, &key, StageConfig::default()).await;

    assert_eq!(report.status, JobStatus::Completed);
    let output_ref = report.output_artifact.unwrap();
    assert!(output_ref.ends_with("/01-trim-silence.mp4"));
    assert_eq!(h.stored(&output_ref), "source\ntrim-silence duration=8.400\n");
    assert_eq!(h.stored(&key), "source\n");
    assert_clean(&h);
}

#[derive(Clone, Default)]
struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_early_transcription_logs_stage_completion() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let h = Harness::new();
    let key = h.upload("talk.mp4");
    let config = StageConfig {
        headline: HeadlineSource::Generated,
        ..Default::default()
    };
    let report = run_direct(&h, &key, config).await;
    assert_eq!(report.status, JobStatus::Completed);

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    let stage_field = format!("stage={}", Stage::EarlyTranscribe);
    assert!(
        output
            .lines()
            .any(|line| line.contains("Stage complete") && line.contains(&stage_field)),
        "no completion line for {stage_field}:\n{output}"
    );
}
