use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ScribeError, ScribeResult};
use crate::segment::RawSegment;

/// Parsed shape expected at the top of a well-formed model response.
#[derive(Deserialize)]
struct SegmentDocument {
    segments: Vec<RawSegment>,
}

/// Which recovery strategy produced the segments.
///
/// Callers and tests can assert that the lenient tiers are only reached when
/// the stricter ones fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryTier {
    /// The response parsed directly as a segment document.
    Direct,
    /// The response was truncated mid-object and repaired by closing it.
    Repaired,
    /// Segments were scraped out of structurally broken text.
    Scraped,
}

/// Result of a successful recovery attempt.
#[derive(Debug)]
pub struct Recovered {
    /// Segments in their order of appearance in the raw text.
    pub segments: Vec<RawSegment>,
    /// The tier that succeeded.
    pub tier: RecoveryTier,
}

/// Strip a leading/trailing triple-backtick code fence, if present.
///
/// Models wrap JSON output in ```` ```json ```` fences often enough that the
/// clients apply this before handing text to [`recover`].
pub fn strip_code_fence(text: &str) -> &str {
    let mut inner = text.trim();
    if let Some(rest) = inner.strip_prefix("```") {
        // Drop the opening fence and its optional language tag.
        inner = match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => rest,
        };
    }
    inner = inner.trim_end();
    if let Some(rest) = inner.strip_suffix("```") {
        inner = rest;
    }
    inner.trim()
}

/// Recover a segment list from raw model output.
///
/// Three strategies are attempted in order, first success wins:
///
/// 1. direct parse as `{"segments": [...]}`
/// 2. truncation repair: cut after the last `}` and close the document
/// 3. fragment scraping with a lenient scanner
///
/// Fails with [`ScribeError::UnrecoverableStructure`] only when no strategy
/// yields a segment.
pub fn recover(raw: &str) -> ScribeResult<Recovered> {
    if let Some(segments) = parse_document(raw) {
        debug!("Response parsed directly: {} segments", segments.len());
        return Ok(Recovered {
            segments,
            tier: RecoveryTier::Direct,
        });
    }

    if let Some(segments) = repair_truncation(raw) {
        warn!(
            "Response was truncated; repaired to {} complete segments",
            segments.len()
        );
        return Ok(Recovered {
            segments,
            tier: RecoveryTier::Repaired,
        });
    }

    let segments = scrape_segments(raw);
    if segments.is_empty() {
        return Err(ScribeError::UnrecoverableStructure {
            detail: "no segment pattern found after truncation repair".into(),
        });
    }
    warn!(
        "Response was structurally broken; scraped {} segments",
        segments.len()
    );
    Ok(Recovered {
        segments,
        tier: RecoveryTier::Scraped,
    })
}

fn parse_document(text: &str) -> Option<Vec<RawSegment>> {
    serde_json::from_str::<SegmentDocument>(text)
        .ok()
        .map(|doc| doc.segments)
}

/// Repair output cut off mid-segment by a length limit: keep everything up
/// to the last complete object and close the array-in-object shape.
fn repair_truncation(text: &str) -> Option<Vec<RawSegment>> {
    let last_brace = text.rfind('}')?;
    let mut repaired = String::with_capacity(last_brace + 3);
    repaired.push_str(&text[..=last_brace]);
    repaired.push_str("]}");
    parse_document(&repaired)
}

/// Last-resort scraper: walk the text for
/// `"startTime": "...", "endTime": "...", "text": <value>` fragments,
/// regardless of the validity of the surrounding JSON.
fn scrape_segments(text: &str) -> Vec<RawSegment> {
    const KEY: &str = "\"startTime\"";
    let mut segments = Vec::new();
    let mut cursor = 0;
    while let Some(found) = text[cursor..].find(KEY) {
        let start = cursor + found;
        let mut scanner = Scanner::new(&text[start..]);
        match scanner.fragment() {
            Some(segment) => {
                segments.push(segment);
                cursor = start + scanner.pos;
            }
            // Malformed fragment: skip this key and keep looking.
            None => cursor = start + KEY.len(),
        }
    }
    segments
}

/// Byte-cursor scanner for one segment-shaped fragment.
///
/// All structural characters are ASCII, so byte positions always fall on
/// character boundaries.
struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn skip_ws(&mut self) {
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    /// Consume a literal token, skipping leading whitespace.
    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.src[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    /// Consume a `delim`-quoted string, honoring backslash escapes.
    /// Returns the raw inner span without the delimiters.
    fn quoted(&mut self, delim: u8) -> Option<&'a str> {
        let bytes = self.src.as_bytes();
        if bytes.get(self.pos) != Some(&delim) {
            return None;
        }
        let content_start = self.pos + 1;
        let mut i = content_start;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b if b == delim => {
                    self.pos = i + 1;
                    return Some(&self.src[content_start..i]);
                }
                _ => i += 1,
            }
        }
        None
    }

    /// Scan one `{"startTime": ..., "endTime": ..., "text": ...}` fragment
    /// starting at the `"startTime"` key.
    fn fragment(&mut self) -> Option<RawSegment> {
        if !self.eat("\"startTime\"") || !self.eat(":") {
            return None;
        }
        self.skip_ws();
        let start_time = self.quoted(b'"')?;

        if !self.eat(",") || !self.eat("\"endTime\"") || !self.eat(":") {
            return None;
        }
        self.skip_ws();
        let end_time = self.quoted(b'"')?;

        if !self.eat(",") || !self.eat("\"text\"") || !self.eat(":") {
            return None;
        }
        self.skip_ws();
        let text = match self.peek() {
            Some(b'"') => unescape_json(self.quoted(b'"')?),
            // Tolerated deviation: some responses single-quote the text value.
            Some(b'\'') => unescape_backslashes(self.quoted(b'\'')?),
            _ => return None,
        };

        Some(RawSegment {
            start_time: Some(start_time.to_string()),
            end_time: Some(end_time.to_string()),
            text: Value::String(text),
        })
    }
}

/// Unescape a double-quoted payload by re-parsing it as a JSON string
/// literal, falling back to plain backslash substitution.
fn unescape_json(inner: &str) -> String {
    let literal = format!("\"{inner}\"");
    serde_json::from_str::<String>(&literal).unwrap_or_else(|_| unescape_backslashes(inner))
}

/// Best-effort unescape: resolve the common sequences, keep the rest.
fn unescape_backslashes(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
