//! Caption resolution and truncation.
//!
//! The caption each account receives is computed once per session, in
//! priority order: the source's original caption verbatim in Repost mode,
//! then an operator override or AI-generated caption, then a templated
//! fallback built from the promotional base caption.

use crate::clients::captioner::{GeneratedCaptions, YtMeta};
use crate::clients::extract::CaptionInfo;
use crate::config::{InstagramConfig, YouTubeConfig};
use crate::session::SessionMode;

/// Final platform texts shared by every account in the fan-out.
#[derive(Debug, Clone)]
pub struct ResolvedCaptions {
    pub instagram: String,
    pub youtube: YtMeta,
}

/// Resolve both platforms' texts from everything the session gathered.
pub fn resolve(
    mode: SessionMode,
    manual_override: Option<&str>,
    derived: &CaptionInfo,
    generated: &GeneratedCaptions,
    ig: &InstagramConfig,
    yt: &YouTubeConfig,
) -> ResolvedCaptions {
    ResolvedCaptions {
        instagram: resolve_instagram(mode, manual_override, derived, generated, ig),
        youtube: resolve_youtube(derived, generated, yt),
    }
}

fn resolve_instagram(
    mode: SessionMode,
    manual_override: Option<&str>,
    derived: &CaptionInfo,
    generated: &GeneratedCaptions,
    config: &InstagramConfig,
) -> String {
    if mode == SessionMode::Repost && !derived.caption.is_empty() {
        return derived.caption.clone();
    }

    if mode == SessionMode::Standard {
        if let Some(manual) = manual_override {
            if !manual.is_empty() {
                return manual.to_string();
            }
        }
    }

    if let Some(ai) = &generated.instagram {
        if !ai.is_empty() {
            return ai.clone();
        }
    }

    templated_fallback(derived, config)
}

/// Fixed promotional template with author/caption substitution plus the
/// static hashtag set.
fn templated_fallback(derived: &CaptionInfo, config: &InstagramConfig) -> String {
    let author = derived.author.as_deref().unwrap_or("unknown");
    let mut caption = config
        .base_caption
        .replace("%author%", author)
        .replace("%originalCaption%", &derived.caption);

    let mut tags: Vec<&str> = derived.hashtags.iter().map(|s| s.as_str()).collect();
    if !config.default_hashtags.is_empty() {
        tags.push(config.default_hashtags.as_str());
    }
    if !tags.is_empty() {
        caption.push_str("\n\n");
        caption.push_str(&tags.join(" "));
    }
    caption.trim().to_string()
}

fn resolve_youtube(
    derived: &CaptionInfo,
    generated: &GeneratedCaptions,
    config: &YouTubeConfig,
) -> YtMeta {
    if let Some(meta) = &generated.youtube {
        return YtMeta {
            title: truncate_on_word(&meta.title, config.title_limit),
            description: truncate_with_ellipsis(&meta.description, config.description_limit),
        };
    }

    let author = derived.author.as_deref().unwrap_or("unknown");
    let title_source = if derived.caption.is_empty() {
        format!("New clip by {}", author)
    } else {
        derived.caption.clone()
    };
    let mut description = derived.caption.clone();
    if !derived.hashtags.is_empty() {
        if !description.is_empty() {
            description.push_str("\n\n");
        }
        description.push_str(&derived.hashtags.join(" "));
    }

    YtMeta {
        title: truncate_on_word(&title_source, config.title_limit),
        description: truncate_with_ellipsis(&description, config.description_limit),
    }
}

/// Hard-truncate to exactly `cap` characters, the last three being an
/// ellipsis marker. Counts characters, never splitting a multi-byte
/// boundary.
pub fn truncate_with_ellipsis(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }
    let keep = cap.saturating_sub(3);
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str("...");
    truncated
}

/// Truncate to at most `cap` characters, preferring a word boundary.
pub fn truncate_on_word(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }
    let keep = cap.saturating_sub(3);
    let head: String = text.chars().take(keep).collect();
    let cut = match head.rfind(char::is_whitespace) {
        // Only back up to a word boundary when it doesn't cost most of
        // the budget.
        Some(pos) if pos > keep / 2 => &head[..pos],
        _ => head.as_str(),
    };
    format!("{}...", cut.trim_end())
}

/// Enforce the per-tag and joined-length tag budgets, dropping tags from
/// the end until the whole list fits.
pub fn sanitize_tags(tags: &[String], per_tag_cap: usize, joined_cap: usize) -> Vec<String> {
    let mut kept: Vec<String> = tags
        .iter()
        .filter(|t| !t.is_empty() && t.chars().count() <= per_tag_cap)
        .cloned()
        .collect();

    while !kept.is_empty() && kept.join(",").chars().count() > joined_cap {
        kept.pop();
    }
    kept
}
