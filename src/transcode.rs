// src/transcode.rs
//
// Re-encode the OpenCV mp4v output to H.264 with faststart so it plays in
// browsers straight from the public URL.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

use crate::types::TranscodeConfig;

pub fn ffmpeg_args(input: &Path, output: &Path, preset: &str) -> Vec<String> {
    vec![
        "-i".to_string(),
        input.display().to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        preset.to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-y".to_string(),
        output.display().to_string(),
    ]
}

/// Fails if ffmpeg cannot be spawned or exits non-zero; the caller must not
/// publish anything in that case.
pub async fn transcode_to_h264(config: &TranscodeConfig, input: &Path, output: &Path) -> Result<()> {
    let args = ffmpeg_args(input, output, &config.preset);
    debug!("{} {}", config.ffmpeg_path, args.join(" "));

    let result = Command::new(&config.ffmpeg_path)
        .args(&args)
        .output()
        .await
        .with_context(|| format!("Failed to run {}", config.ffmpeg_path))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        bail!(
            "ffmpeg exited with {} while transcoding {}: {}",
            result.status,
            input.display(),
            tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
        );
    }

    info!("🎞️  Transcoded {} -> {}", input.display(), output.display());
    Ok(())
}
