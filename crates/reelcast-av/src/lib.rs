//! # reelcast-av
//!
//! Media probing and transform library for short-form video files.
//!
//! This crate provides functionality for:
//! - Probing media files to extract stream geometry and duration
//! - Validating that a downloaded file is a genuine playable video
//! - Applying cosmetic transforms (pace shift, branding overlay) via ffmpeg,
//!   with a hard wall-clock budget and a fallback-to-input contract
//!
//! ## Example
//!
//! ```no_run
//! use reelcast_av::probe;
//! use std::time::Duration;
//!
//! # async fn demo() -> reelcast_av::Result<()> {
//! let info = probe(std::path::Path::new("/path/to/clip.mp4"), Duration::from_secs(30)).await?;
//! println!("Container: {}", info.container);
//! println!("Has video: {}", info.has_video());
//! # Ok(())
//! # }
//! ```

mod error;
pub mod probe;
pub mod tools;
pub mod transform;

// Re-exports
pub use error::{Error, Result};
pub use probe::{probe, validate_video, AudioStream, MediaInfo, VideoStream};
pub use tools::{check_tool, check_tools, require_tool, ToolInfo};
pub use transform::{
    apply, trim_clip, BrandingSpec, MusicBed, PaceSpec, TransformLimits, TransformSpec,
};
