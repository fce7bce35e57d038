// Metadata extraction module

pub mod ffprobe;

use serde::{Deserialize, Serialize};

/// Technical metadata for a media file. Every field is optional:
/// the catalog never depends on it for correctness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub duration_secs: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<f64>,
    pub codec: Option<String>,
    pub bitrate: Option<i64>,
}

impl MediaInfo {
    pub fn is_empty(&self) -> bool {
        self.duration_secs.is_none()
            && self.width.is_none()
            && self.height.is_none()
            && self.fps.is_none()
            && self.codec.is_none()
            && self.bitrate.is_none()
    }
}
