use std::path::Path;

use lofty::file::TaggedFileExt;
use lofty::prelude::*;

/// The tag fields the index keeps, trimmed and decoded as UTF-8.
/// `year == 0` and `track == 0` mean "unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagBundle {
    pub title: String,
    pub artist: String,
    pub albumartist: String,
    pub album: String,
    pub genre: String,
    pub year: u32,
    pub track: u32,
    pub disc: String,
    pub extension: String,
}

/// Extracts tags from a backing file. `None` means the file carries no
/// recognizable tag and is skipped by the groveler.
pub trait TagReader {
    fn read_tags(&self, path: &Path) -> Option<TagBundle>;
}

/// Production reader backed by lofty.
pub struct LoftyTags;

impl TagReader for LoftyTags {
    fn read_tags(&self, path: &Path) -> Option<TagBundle> {
        let tagged_file = match lofty::read_from_path(path) {
            Ok(f) => f,
            Err(e) => {
                log::debug!("Could not read tags from {}: {}", path.display(), e);
                return None;
            }
        };

        // Try primary tag, then fall back
        let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag())?;

        let artist = trimmed(tag.artist());
        let albumartist = {
            let aa = trimmed(tag.get_string(&ItemKey::AlbumArtist));
            if aa.is_empty() {
                log::debug!("No album artist for {}, using artist", path.display());
                artist.clone()
            } else {
                aa
            }
        };

        Some(TagBundle {
            title: trimmed(tag.title()),
            artist,
            albumartist,
            album: trimmed(tag.album()),
            genre: trimmed(tag.genre()),
            year: tag.year().unwrap_or(0),
            track: tag.track().unwrap_or(0),
            disc: normalize_disc(trimmed(tag.get_string(&ItemKey::DiscNumber))),
            extension: extension_of(path),
        })
    }
}

fn trimmed<S: AsRef<str>>(value: Option<S>) -> String {
    value.map(|s| s.as_ref().trim().to_string()).unwrap_or_default()
}

/// The literal DISCNUMBER value, except that `1/1` (sole disc of a
/// single-disc set) carries no information and becomes empty.
pub fn normalize_disc(disc: String) -> String {
    if disc == "1/1" {
        String::new()
    } else {
        disc
    }
}

/// Lowercased text after the final `.` of the basename; empty if none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
