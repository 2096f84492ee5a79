use std::path::Path;

use reel_worker::{ArtifactBackend, JobStoreBackend, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_tools()?;

    let mut required = vec!["STT_BASE_URL"];
    if config.artifact_backend == ArtifactBackend::R2 {
        required.extend([
            "R2_ENDPOINT_URL",
            "R2_ACCESS_KEY_ID",
            "R2_SECRET_ACCESS_KEY",
            "R2_BUCKET_NAME",
        ]);
    }
    ensure_env_present(&required)?;
    if config.job_store_backend == JobStoreBackend::Firestore
        && std::env::var("GCP_PROJECT_ID").is_err()
        && std::env::var("FIREBASE_PROJECT_ID").is_err()
    {
        return Err(anyhow::anyhow!(
            "missing required env var GCP_PROJECT_ID (or FIREBASE_PROJECT_ID)"
        ));
    }

    if std::env::var("GEMINI_API_KEY").is_err() {
        println!("worker-selfcheck: GEMINI_API_KEY unset, generated headlines will degrade");
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    let marker = path.join(".selfcheck");
    tokio::fs::write(&marker, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("work dir {} is not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&marker).await?;
    Ok(())
}

fn ensure_tools() -> anyhow::Result<()> {
    reel_media::check_ffmpeg().map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    reel_media::check_ffprobe().map_err(|e| anyhow::anyhow!("ffprobe not available: {}", e))?;
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
