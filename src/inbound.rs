//! Inbound chat message parsing.
//!
//! A trigger message carries a recognized source URL, optional `author:` and
//! `caption:` line directives, and an optional standalone `repost` keyword
//! that switches the session into Repost mode.

use crate::session::SessionMode;
use once_cell::sync::Lazy;
use regex::Regex;

static SOURCE_URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(?:www\.)?instagram\.com/(?:reel|reels|p|tv)/[\w-]+\S*")
        .expect("source url regex")
});

static HASHTAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#[\w֐-׿]+").expect("hashtag regex"));

/// A parsed trigger message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    /// Source content URL, normalized.
    pub source_url: String,
    pub mode: SessionMode,
    /// Operator-supplied author handle from an `author:` directive.
    pub author_override: Option<String>,
    /// Operator-supplied caption from a `caption:` directive.
    pub caption_override: Option<String>,
}

/// Parse a chat message into a pipeline request.
///
/// Returns `None` when the message contains no recognized source URL.
pub fn parse_message(text: &str) -> Option<InboundRequest> {
    let url = SOURCE_URL_REGEX.find(text)?.as_str();
    let source_url = normalize_url(url);

    let mut author_override = None;
    let mut caption_override = None;
    let mut repost = false;

    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = strip_directive(line, "author:") {
            if !rest.is_empty() {
                author_override = Some(rest.to_string());
            }
        } else if let Some(rest) = strip_directive(line, "caption:") {
            if !rest.is_empty() {
                caption_override = Some(rest.to_string());
            }
        } else if line
            .split_whitespace()
            .any(|word| word.eq_ignore_ascii_case("repost"))
        {
            repost = true;
        }
    }

    Some(InboundRequest {
        source_url,
        mode: if repost {
            SessionMode::Repost
        } else {
            SessionMode::Standard
        },
        author_override,
        caption_override,
    })
}

/// Extract hashtags from a caption, returning (caption without tags, tags).
pub fn split_hashtags(caption: &str) -> (String, Vec<String>) {
    let tags: Vec<String> = HASHTAG_REGEX
        .find_iter(caption)
        .map(|m| m.as_str().to_string())
        .collect();
    let stripped = HASHTAG_REGEX.replace_all(caption, "");
    let cleaned = stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string();
    (cleaned, tags)
}

fn normalize_url(url: &str) -> String {
    // Both path forms resolve to the same content; the metadata endpoints
    // only accept the singular form.
    url.replacen("/reels/", "/reel/", 1)
}

fn strip_directive<'a>(line: &'a str, directive: &str) -> Option<&'a str> {
    let head = line.get(..directive.len())?;
    if head.eq_ignore_ascii_case(directive) {
        Some(line[directive.len()..].trim())
    } else {
        None
    }
}
