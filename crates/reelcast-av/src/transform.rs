//! Cosmetic media transforms backed by the ffmpeg CLI.
//!
//! Every transform follows the same contract: [`apply`] resolves to the output
//! path on success and to the unchanged input path on any failure (probe error,
//! transcode error, or wall-clock overrun), deleting partial output files. A
//! cosmetic stage is never allowed to abort an otherwise healthy pipeline, so
//! this module logs causes instead of propagating them.

use crate::probe::{self, MediaInfo};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Wall-clock budgets for probe and transcode subprocesses.
#[derive(Debug, Clone)]
pub struct TransformLimits {
    /// Budget for the ffprobe call that derives geometry/duration.
    pub probe_timeout: Duration,
    /// Hard ceiling for the ffmpeg transcode, after which it is killed.
    pub transcode_timeout: Duration,
}

impl Default for TransformLimits {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(30),
            transcode_timeout: Duration::from_secs(180),
        }
    }
}

/// One declarative transform stage.
#[derive(Debug, Clone)]
pub enum TransformSpec {
    /// Re-encode with a pace/brightness shift, metadata strip, and an
    /// optional low-volume background music bed.
    Pace(PaceSpec),
    /// Letterbox to a fixed portrait target and draw a branding bar with
    /// fading overlay text.
    Branding(BrandingSpec),
}

/// Parameters for the pace/brightness re-encode stage.
#[derive(Debug, Clone)]
pub struct PaceSpec {
    /// Playback speed factor applied to both video and audio.
    pub speed: f64,
    /// Additive brightness adjustment.
    pub brightness: f64,
    /// Drop all container/stream metadata from the output.
    pub strip_metadata: bool,
    /// Optional music bed mixed under the original audio.
    pub music: Option<MusicBed>,
}

impl Default for PaceSpec {
    fn default() -> Self {
        Self {
            speed: 1.1,
            brightness: 0.02,
            strip_metadata: true,
            music: None,
        }
    }
}

/// A background audio file mixed in at low volume.
#[derive(Debug, Clone)]
pub struct MusicBed {
    pub path: PathBuf,
    pub volume: f64,
}

/// Parameters for the branding overlay stage.
#[derive(Debug, Clone)]
pub struct BrandingSpec {
    /// Output width, the shorter portrait dimension.
    pub target_width: u32,
    /// Output height.
    pub target_height: u32,
    /// Letterbox padding color.
    pub pad_color: String,
    /// Text drawn on the branding bar.
    pub text: String,
    /// Bar height in pixels, drawn at the bottom of the frame.
    pub bar_height: u32,
    /// Font size for the overlay text.
    pub font_size: u32,
    /// Seconds over which the overlay fades in.
    pub fade_in_secs: f64,
}

impl Default for BrandingSpec {
    fn default() -> Self {
        Self {
            target_width: 1080,
            target_height: 1920,
            pad_color: "black".to_string(),
            text: String::new(),
            bar_height: 120,
            font_size: 42,
            fade_in_secs: 1.5,
        }
    }
}

/// Apply one transform stage.
///
/// Returns the output path on success and the input path on any failure.
pub async fn apply(
    input: &Path,
    output: &Path,
    spec: &TransformSpec,
    limits: &TransformLimits,
) -> PathBuf {
    let info = match probe::probe(input, limits.probe_timeout).await {
        Ok(info) => info,
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(input = %input.display(), error = %e, "probe failed, skipping transform");
            let _ = e;
            return input.to_path_buf();
        }
    };

    let args = build_args(input, output, spec, &info);

    match run_ffmpeg(&args, limits.transcode_timeout).await {
        Ok(()) => output.to_path_buf(),
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                input = %input.display(),
                error = %e,
                "transform failed, falling back to untransformed input"
            );
            let _ = e;
            remove_partial(output).await;
            input.to_path_buf()
        }
    }
}

/// Trim a clip to its first `seconds` at high compression.
///
/// Used to shrink oversized inputs before remote upload. Unlike [`apply`],
/// failures propagate so the caller can decide how to degrade.
pub async fn trim_clip(
    input: &Path,
    output: &Path,
    seconds: f64,
    crf: u32,
    timeout: Duration,
) -> Result<()> {
    let args = vec![
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-t".to_string(),
        format!("{}", seconds),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-crf".to_string(),
        crf.to_string(),
        "-preset".to_string(),
        "ultrafast".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-y".to_string(),
        output.to_string_lossy().to_string(),
    ];

    match run_ffmpeg(&args, timeout).await {
        Ok(()) => Ok(()),
        Err(e) => {
            remove_partial(output).await;
            Err(e)
        }
    }
}

/// Build the full ffmpeg argument vector for a transform stage.
pub fn build_args(
    input: &Path,
    output: &Path,
    spec: &TransformSpec,
    info: &MediaInfo,
) -> Vec<String> {
    match spec {
        TransformSpec::Pace(pace) => build_pace_args(input, output, pace, info),
        TransformSpec::Branding(branding) => build_branding_args(input, output, branding, info),
    }
}

fn build_pace_args(
    input: &Path,
    output: &Path,
    spec: &PaceSpec,
    info: &MediaInfo,
) -> Vec<String> {
    let mut args = vec!["-i".to_string(), input.to_string_lossy().to_string()];

    let video_chain = format!(
        "setpts=PTS/{speed},eq=brightness={brightness}",
        speed = spec.speed,
        brightness = spec.brightness
    );
    let audio_chain = format!("atempo={}", spec.speed);

    match (&spec.music, info.has_audio()) {
        (Some(bed), true) => {
            args.extend([
                "-i".to_string(),
                bed.path.to_string_lossy().to_string(),
                "-filter_complex".to_string(),
                format!(
                    "[0:v]{video_chain}[v];[0:a]{audio_chain}[fg];\
                     [1:a]volume={volume}[bg];[fg][bg]amix=inputs=2:duration=first[a]",
                    volume = bed.volume
                ),
                "-map".to_string(),
                "[v]".to_string(),
                "-map".to_string(),
                "[a]".to_string(),
            ]);
        }
        (_, true) => {
            args.extend([
                "-vf".to_string(),
                video_chain,
                "-af".to_string(),
                audio_chain,
            ]);
        }
        // Source has no audio track, so only the video chain applies.
        (_, false) => {
            args.extend(["-vf".to_string(), video_chain, "-an".to_string()]);
        }
    }

    if spec.strip_metadata {
        args.extend(["-map_metadata".to_string(), "-1".to_string()]);
    }

    args.extend([
        "-c:v".to_string(),
        "libx264".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-y".to_string(),
        output.to_string_lossy().to_string(),
    ]);

    args
}

fn build_branding_args(
    input: &Path,
    output: &Path,
    spec: &BrandingSpec,
    _info: &MediaInfo,
) -> Vec<String> {
    let mut filter = format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:{color}",
        w = spec.target_width,
        h = spec.target_height,
        color = spec.pad_color
    );

    if !spec.text.is_empty() {
        let bar_y = spec.target_height.saturating_sub(spec.bar_height);
        filter.push_str(&format!(
            ",drawbox=x=0:y={bar_y}:w={w}:h={bar}:color=black@0.6:t=fill,\
             drawtext=text='{text}':fontcolor=white:fontsize={size}:\
             x=(w-text_w)/2:y={bar_y}+({bar}-text_h)/2:\
             alpha='if(lt(t,{fade}),t/{fade},1)'",
            w = spec.target_width,
            bar = spec.bar_height,
            text = escape_drawtext(&spec.text),
            size = spec.font_size,
            fade = spec.fade_in_secs
        ));
    }

    vec![
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-vf".to_string(),
        filter,
        "-c:v".to_string(),
        "libx264".to_string(),
        "-c:a".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-y".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

/// Escape text for use inside a drawtext filter expression.
fn escape_drawtext(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\'' => escaped.push_str("\\'"),
            ':' => escaped.push_str("\\:"),
            '\\' => escaped.push_str("\\\\"),
            '%' => escaped.push_str("\\%"),
            _ => escaped.push(c),
        }
    }
    escaped
}

async fn run_ffmpeg(args: &[String], timeout: Duration) -> Result<()> {
    let output = Command::new("ffmpeg")
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, output)
        .await
        .map_err(|_| Error::tool_timeout("ffmpeg", timeout.as_secs()))?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found("ffmpeg")
            } else {
                Error::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(3)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("; ");
        return Err(Error::tool_failed("ffmpeg", tail));
    }

    Ok(())
}

async fn remove_partial(output: &Path) {
    if tokio::fs::remove_file(output).await.is_ok() {
        #[cfg(feature = "tracing")]
        tracing::debug!(output = %output.display(), "removed partial transform output");
    }
}
