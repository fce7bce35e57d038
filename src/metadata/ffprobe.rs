// FFprobe wrapper for metadata extraction

use std::path::Path;
use std::process::Command;
use std::time::Duration;
use serde::Deserialize;
use crate::error::{VidshelfError, Result};
use crate::metadata::MediaInfo;

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    streams: Option<Vec<FFprobeStream>>,
    format: Option<FFprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<i32>,
    height: Option<i32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FFprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

/// Run ffprobe on a file and extract metadata
pub fn probe(ffprobe: &Path, path: &Path, timeout: Duration) -> Result<MediaInfo> {
    let mut cmd = Command::new(ffprobe);
    cmd.args([
        "-v", "quiet",
        "-print_format", "json",
        "-show_format",
        "-show_streams",
    ])
    .arg(path);

    let output = crate::tools::run_with_timeout(cmd, timeout)
        .map_err(|e| match e {
            VidshelfError::TranscoderTimeout(_) => e,
            other => VidshelfError::FFprobe(format!("Failed to run ffprobe: {}", other)),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VidshelfError::FFprobe(format!("ffprobe failed: {}", stderr.trim())));
    }

    parse_probe_output(&output.stdout)
}

/// Parse ffprobe's JSON document. A file without a video stream is an error.
pub fn parse_probe_output(json: &[u8]) -> Result<MediaInfo> {
    let probe_output: FFprobeOutput = serde_json::from_slice(json)
        .map_err(|e| VidshelfError::FFprobe(format!("Failed to parse ffprobe output: {}", e)))?;

    let video = probe_output
        .streams
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| VidshelfError::FFprobe("No video stream found".to_string()))?;

    let mut info = MediaInfo {
        duration_secs: None,
        width: video.width,
        height: video.height,
        fps: parse_frame_rate(video.r_frame_rate.as_deref()),
        codec: video.codec_name.clone(),
        bitrate: None,
    };

    if let Some(ref format) = probe_output.format {
        info.duration_secs = parse_seconds(format.duration.as_deref());
        info.bitrate = format.bit_rate.as_ref().and_then(|s| s.parse().ok());
    }
    if info.duration_secs.is_none() {
        info.duration_secs = parse_seconds(video.duration.as_deref());
    }

    Ok(info)
}

/// Parse frame rate string like "30000/1001" to f64
fn parse_frame_rate(rate_str: Option<&str>) -> Option<f64> {
    let rate_str = rate_str?;
    if let Some((num, den)) = rate_str.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    rate_str.parse().ok()
}

fn parse_seconds(duration_str: Option<&str>) -> Option<f64> {
    duration_str?.parse::<f64>().ok().filter(|s| s.is_finite() && *s >= 0.0)
}
