//! FFprobe-based media probing.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Metadata extracted from a media file.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub file_path: PathBuf,
    pub file_size: u64,
    pub container: String,
    pub duration: Option<Duration>,
    pub video_streams: Vec<VideoStream>,
    pub audio_streams: Vec<AudioStream>,
}

/// A single video stream.
#[derive(Debug, Clone)]
pub struct VideoStream {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<f64>,
}

/// A single audio stream.
#[derive(Debug, Clone)]
pub struct AudioStream {
    pub codec: String,
    pub channels: u32,
    pub sample_rate: Option<u32>,
}

impl MediaInfo {
    /// Whether the file contains at least one video stream.
    pub fn has_video(&self) -> bool {
        !self.video_streams.is_empty()
    }

    /// Whether the file contains at least one audio stream.
    pub fn has_audio(&self) -> bool {
        !self.audio_streams.is_empty()
    }

    /// Duration in seconds, if known.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration.map(|d| d.as_secs_f64())
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: String,
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<String>,
}

/// Probe a media file using ffprobe, killing the process if it exceeds `timeout`.
pub async fn probe(path: &Path, timeout: Duration) -> Result<MediaInfo> {
    if !path.exists() {
        return Err(Error::file_not_found(path));
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, output)
        .await
        .map_err(|_| Error::tool_timeout("ffprobe", timeout.as_secs()))?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found("ffprobe")
            } else {
                Error::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::tool_failed("ffprobe", stderr.to_string()));
    }

    let json_str = String::from_utf8(output.stdout)
        .map_err(|e| Error::parse_error("ffprobe", format!("Invalid UTF-8: {}", e)))?;

    let ff_output: FfprobeOutput = serde_json::from_str(&json_str)?;

    parse_ffprobe_output(path, ff_output)
}

/// Validate that `path` is a genuine playable video.
///
/// Rejects files below `min_bytes` and files without a video stream.
pub async fn validate_video(path: &Path, min_bytes: u64, timeout: Duration) -> Result<MediaInfo> {
    let size = tokio::fs::metadata(path).await?.len();
    if size < min_bytes {
        return Err(Error::not_a_video(format!(
            "file is {} bytes, below the {} byte minimum",
            size, min_bytes
        )));
    }

    let info = probe(path, timeout).await?;
    if !info.has_video() {
        return Err(Error::not_a_video("no video stream present".to_string()));
    }

    Ok(info)
}

fn parse_ffprobe_output(path: &Path, output: FfprobeOutput) -> Result<MediaInfo> {
    let duration = output
        .format
        .duration
        .and_then(|s| s.parse::<f64>().ok())
        .map(Duration::from_secs_f64);

    let mut info = MediaInfo {
        file_path: path.to_path_buf(),
        file_size: output.format.size.and_then(|s| s.parse().ok()).unwrap_or(0),
        container: output.format.format_name,
        duration,
        video_streams: Vec::new(),
        audio_streams: Vec::new(),
    };

    for stream in output.streams {
        match stream.codec_type.as_str() {
            "video" => {
                info.video_streams.push(VideoStream {
                    codec: stream.codec_name.unwrap_or_default(),
                    width: stream.width.unwrap_or(0),
                    height: stream.height.unwrap_or(0),
                    frame_rate: stream.r_frame_rate.and_then(|s| parse_frame_rate(&s)),
                });
            }
            "audio" => {
                info.audio_streams.push(AudioStream {
                    codec: stream.codec_name.unwrap_or_default(),
                    channels: stream.channels.unwrap_or(2),
                    sample_rate: stream.sample_rate.and_then(|s| s.parse().ok()),
                });
            }
            _ => {}
        }
    }

    Ok(info)
}

fn parse_frame_rate(rate_str: &str) -> Option<f64> {
    let parts: Vec<&str> = rate_str.split('/').collect();
    if parts.len() == 2 {
        let num: f64 = parts[0].parse().ok()?;
        let den: f64 = parts[1].parse().ok()?;
        if den != 0.0 {
            return Some(num / den);
        }
    }
    rate_str.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30000/1001"), Some(29.97002997002997));
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("invalid"), None);
    }

    #[test]
    fn test_parse_ffprobe_output_streams() {
        let raw = r#"{
            "format": {"format_name": "mov,mp4,m4a", "duration": "12.5", "size": "204800"},
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1080, "height": 1920,
                 "r_frame_rate": "30/1"},
                {"codec_type": "audio", "codec_name": "aac", "channels": 2,
                 "sample_rate": "44100"}
            ]
        }"#;
        let parsed: FfprobeOutput = serde_json::from_str(raw).unwrap();
        let info = parse_ffprobe_output(Path::new("/tmp/clip.mp4"), parsed).unwrap();

        assert!(info.has_video());
        assert!(info.has_audio());
        assert_eq!(info.file_size, 204800);
        assert_eq!(info.video_streams[0].width, 1080);
        assert_eq!(info.video_streams[0].height, 1920);
        assert_eq!(info.audio_streams[0].sample_rate, Some(44100));
        assert_eq!(info.duration_secs(), Some(12.5));
    }

    #[tokio::test]
    async fn test_validate_video_rejects_tiny_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stub.mp4");
        std::fs::write(&path, b"not a video").unwrap();

        let err = validate_video(&path, 1024, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAVideo { .. }));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let err = probe(Path::new("/nonexistent/clip.mp4"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }
}
