//! # Lyric Normalizer
//!
//! The catalog returns lyrics as a mix of plain LRC lines and structured
//! credit lines such as:
//!
//! ```text
//! {"t":0,"c":[{"tx":"作词: "},{"tx":"Someone"}]}
//! [00:12.340]first sung line
//! ```
//!
//! [`normalize_lyrics`] rewrites every structured line into LRC form
//! (`[00:00.000]作词: Someone`) and passes every other line through
//! untouched, so running it on its own output changes nothing.

use crate::error::{MetadataError, Result};
use serde::Deserialize;

/// One structured line: a millisecond offset and its text chunks.
#[derive(Debug, Deserialize)]
struct StructuredLine {
    t: u64,
    #[serde(default)]
    c: Vec<Chunk>,
}

#[derive(Debug, Deserialize)]
struct Chunk {
    #[serde(default)]
    tx: String,
}

/// Format a millisecond offset as an LRC time tag, `[MM:SS.mmm]`.
///
/// Minutes are not wrapped into hours.
pub fn format_timestamp(millis: u64) -> String {
    let minutes = millis / 60_000;
    let seconds = (millis / 1_000) % 60;
    let fraction = millis % 1_000;
    format!("[{:02}:{:02}.{:03}]", minutes, seconds, fraction)
}

/// Normalize a raw lyric payload into line-oriented timed text.
///
/// Empty input yields empty output. A structured line that does not parse
/// fails the whole payload with [`MetadataError::MalformedLyrics`].
pub fn normalize_lyrics(raw: &str) -> Result<String> {
    let mut lines = Vec::new();

    for (index, line) in raw.lines().enumerate() {
        if !line.trim_start().starts_with('{') {
            lines.push(line.to_string());
            continue;
        }

        let parsed: StructuredLine =
            serde_json::from_str(line.trim()).map_err(|e| MetadataError::MalformedLyrics {
                line: index + 1,
                reason: e.to_string(),
            })?;

        let text: String = parsed.c.iter().map(|chunk| chunk.tx.as_str()).collect();
        lines.push(format!("{}{}", format_timestamp(parsed.t), text));
    }

    Ok(lines.join("\n"))
}
