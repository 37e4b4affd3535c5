use std::path::Path;

use backdrop_media::{check_ffmpeg, check_ffprobe, CascadeDetector, DetectorConfig};
use backdrop_storage::CacheStore;
use backdrop_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();
    let detector_config = DetectorConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={} output_dir={}",
        config.work_dir, config.output_dir
    );
    ensure_dir(&config.work_dir).await?;

    let ffmpeg = check_ffmpeg().map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    let ffprobe = check_ffprobe().map_err(|e| anyhow::anyhow!("ffprobe not available: {}", e))?;
    println!("worker-selfcheck: ffmpeg={} ffprobe={}", ffmpeg.display(), ffprobe.display());

    CascadeDetector::from_config(&detector_config).map_err(|e| {
        anyhow::anyhow!(
            "cascades not usable in {}: {}",
            detector_config.cascade_dir.display(),
            e
        )
    })?;

    let cache = CacheStore::open(&config.output_dir).await?;
    let stats = cache.stats().await;
    println!(
        "worker-selfcheck: cache has {} entries ({} bytes)",
        stats.count, stats.total_bytes
    );

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_dir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok").await?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}
