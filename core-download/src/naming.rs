use bridge_traits::catalog::{ContainerFormat, SongMetadata};
use std::path::{Path, PathBuf};

const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Most filesystems cap a single component at 255 bytes.
pub const MAX_COMPONENT_BYTES: usize = 255;

/// Budget for each of album, title and artist inside a song file name:
/// three of them, two `" - "` separators and the longest extension stay
/// under [`MAX_COMPONENT_BYTES`].
const SONG_PART_BYTES: usize = 80;

/// Make `name` safe as a single path component.
///
/// Reserved characters and control characters become `_`; surrounding
/// whitespace is trimmed. A name made only of dots (`.`, `..`) would
/// navigate instead of naming, so its dots become `_` too.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if RESERVED.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let cleaned = cleaned.trim();

    if !cleaned.is_empty() && cleaned.chars().all(|c| c == '.') {
        return "_".repeat(cleaned.len());
    }
    cleaned.to_string()
}

/// Cut `name` to at most `max_bytes`, on a character boundary.
pub fn truncate_to_bytes(name: &str, max_bytes: usize) -> &str {
    if name.len() <= max_bytes {
        return name;
    }
    let mut end = max_bytes;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].trim_end()
}

fn song_part(raw: &str) -> String {
    let part = sanitize_filename(raw);
    truncate_to_bytes(&part, SONG_PART_BYTES).to_string()
}

/// `"<album> - <title> - <artist>.<ext>"`, each part cut to fit the
/// component length limit.
pub fn song_file_name(metadata: &SongMetadata, container: ContainerFormat) -> String {
    format!(
        "{} - {} - {}.{}",
        song_part(&metadata.album),
        song_part(&metadata.title),
        song_part(&metadata.artist),
        container.extension()
    )
}

/// Standalone lyric file next to `audio_path`.
pub fn lyric_file_path(audio_path: &Path) -> PathBuf {
    audio_path.with_extension("lrc")
}
