// Preview thumbnail generation
//
// Renders a short animated WebP from the head of the video: fixed width,
// bounded duration and frame rate. Written to a temp file and renamed into place.

use std::path::Path;
use std::process::Command;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::constants::{
    PREVIEW_DURATION_SECS, PREVIEW_FPS, PREVIEW_QUALITY, PREVIEW_WIDTH, THUMB_EXTENSION,
};
use crate::error::{VidshelfError, Result};

/// Options for preview generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewOptions {
    pub width: u32,
    pub duration_secs: f64,
    pub fps: u32,
    pub quality: u32, // 0-100, libwebp scale
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            width: PREVIEW_WIDTH,
            duration_secs: PREVIEW_DURATION_SECS,
            fps: PREVIEW_FPS,
            quality: PREVIEW_QUALITY,
        }
    }
}

impl PreviewOptions {
    /// Clip length to render: the configured duration, shortened for shorter sources.
    pub fn effective_duration(&self, source_duration: Option<f64>) -> f64 {
        let configured = self.duration_secs.max(0.1);
        match source_duration {
            Some(d) if d > 0.0 => configured.min(d),
            _ => configured,
        }
    }
}

/// Build the ffmpeg invocation that renders `source` into `output`.
pub fn preview_command(
    ffmpeg: &Path,
    source: &Path,
    output: &Path,
    options: &PreviewOptions,
    source_duration: Option<f64>,
) -> Command {
    let duration = format_duration(options.effective_duration(source_duration));
    let filter = format!("fps={},scale={}:-2", options.fps.max(1), options.width.max(16));
    let quality = options.quality.min(100).to_string();

    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-y", "-v", "error", "-ss", "0", "-t", &duration, "-i"])
        .arg(source)
        .args([
            "-vf", &filter,
            "-an",
            "-loop", "0",
            "-c:v", "libwebp",
            "-quality", &quality,
            "-f", "webp",
        ])
        .arg(output);
    cmd
}

/// Render a preview, bounded by `timeout`.
pub fn render_preview(
    ffmpeg: &Path,
    source: &Path,
    output: &Path,
    options: &PreviewOptions,
    source_duration: Option<f64>,
    timeout: Duration,
) -> Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use temp file for atomic write
    let tmp_path = output.with_extension(format!("tmp.{}", THUMB_EXTENSION));

    let cmd = preview_command(ffmpeg, source, &tmp_path, options, source_duration);
    let output_result = crate::tools::run_with_timeout(cmd, timeout);

    let process_output = match output_result {
        Ok(o) => o,
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
    };

    if !process_output.status.success() {
        let _ = std::fs::remove_file(&tmp_path);
        let stderr = String::from_utf8_lossy(&process_output.stderr);
        return Err(VidshelfError::FFmpeg(format!(
            "Preview generation failed for {}: {}",
            source.display(),
            stderr.trim()
        )));
    }

    std::fs::rename(&tmp_path, output)?;

    let size = std::fs::metadata(output)?.len();
    if size == 0 {
        let _ = std::fs::remove_file(output);
        return Err(VidshelfError::FFmpeg("Preview file is empty".to_string()));
    }

    Ok(())
}

/// Format seconds as HH:MM:SS.mmm for ffmpeg.
fn format_duration(seconds: f64) -> String {
    let hours = (seconds / 3600.0) as u32;
    let minutes = ((seconds % 3600.0) / 60.0) as u32;
    let secs = seconds % 60.0;
    format!("{:02}:{:02}:{:06.3}", hours, minutes, secs)
}
