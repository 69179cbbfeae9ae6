use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::ExtensionPriority;
use crate::db::models::TrackTuple;
use crate::db::{Database, DbError};
use crate::tags::TagReader;

#[derive(Error, Debug)]
pub enum GrovelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Db(#[from] DbError),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Outcome of one reconciliation pass. `pairs` carries a (track, file)
/// entry for every file still in the index, ingested or unchanged, and is
/// the path builder's work list.
#[derive(Debug, Default)]
pub struct GrovelSummary {
    pub pairs: Vec<(i64, i64)>,
    pub added: u64,
    pub removed: u64,
    pub unchanged: u64,
    pub skipped: u64,
}

/// Reconcile the index with the backing directories: remove rows whose
/// file vanished or changed, ingest what is new, then garbage-collect.
/// Runs in a single transaction; any store failure rolls the pass back.
pub fn grovel(
    db: &Database,
    reader: &dyn TagReader,
    roots: &[PathBuf],
    extensions: &ExtensionPriority,
) -> Result<GrovelSummary, GrovelError> {
    let mut pending = enumerate(roots, extensions);
    log::info!("found {} candidate files", pending.len());

    let tx = db.transaction()?;
    let mut summary = GrovelSummary::default();

    // Reconcile the stored inventory against what the walk found.
    for file in db.get_files()? {
        let path = PathBuf::from(&file.path);
        if !pending.contains(&path) {
            db.remove_file(file.id)?;
            summary.removed += 1;
            continue;
        }
        match std::fs::metadata(&path) {
            Ok(meta) if mtime_of(&meta) == file.mtime => {
                pending.remove(&path);
                summary.unchanged += 1;
                summary.pairs.push((file.track_id, file.id));
            }
            Ok(_) => {
                // mtime moved: drop the row, the ingest below re-reads it.
                db.remove_file(file.id)?;
                summary.removed += 1;
            }
            Err(e) => {
                log::warn!("cannot stat {}: {}", path.display(), e);
                db.remove_file(file.id)?;
                summary.removed += 1;
            }
        }
    }

    // Ingest everything new or changed.
    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message("Indexing...");

    for path in pending {
        pb.inc(1);
        let meta = match std::fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                log::warn!("cannot stat {}: {}", path.display(), e);
                summary.skipped += 1;
                continue;
            }
        };
        let tags = match reader.read_tags(&path) {
            Some(tags) => tags,
            None => {
                log::debug!("no tag: {}", path.display());
                summary.skipped += 1;
                continue;
            }
        };

        let artist_id = db.get_or_add_artist(&tags.artist)?;
        let albumartist_id = db.get_or_add_artist(&tags.albumartist)?;
        let album_id = db.get_or_add_album(&tags.album)?;
        let track_id = db.get_or_add_track(&TrackTuple {
            artist_id,
            albumartist_id,
            album_id,
            year: i64::from(tags.year),
            name: tags.title.clone(),
            track: i64::from(tags.track),
            disc: tags.disc.clone(),
        })?;
        let file_id = db.add_file(track_id, &path.to_string_lossy(), mtime_of(&meta))?;
        summary.pairs.push((track_id, file_id));
        summary.added += 1;
    }
    pb.finish_and_clear();

    // Garbage-collect what the removals orphaned; the virtual tree is
    // rebuilt from scratch afterwards.
    db.clean_tracks()?;
    db.clean_tables()?;
    db.clear_paths()?;

    tx.commit()?;
    log::info!(
        "grovel done: {} ingested, {} unchanged, {} removed, {} skipped",
        summary.added,
        summary.unchanged,
        summary.removed,
        summary.skipped
    );
    Ok(summary)
}

/// Walk the backing roots and collect the absolute paths of every file
/// that passes the extension allow-list. Symlinks count only when they
/// land on a regular file; directory symlinks are not followed. Files
/// reachable through overlapping roots appear once.
fn enumerate(roots: &[PathBuf], extensions: &ExtensionPriority) -> BTreeSet<PathBuf> {
    let mut found = BTreeSet::new();
    for root in roots {
        let root = match std::fs::canonicalize(root) {
            Ok(root) => root,
            Err(e) => {
                log::warn!("cannot open backing root {}: {}", root.display(), e);
                continue;
            }
        };
        for entry in WalkDir::new(&root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("walk error under {}: {}", root.display(), e);
                    continue;
                }
            };
            let file_type = entry.file_type();
            let is_file = if file_type.is_file() {
                true
            } else if file_type.is_symlink() {
                std::fs::metadata(entry.path())
                    .map(|m| m.is_file())
                    .unwrap_or(false)
            } else {
                false
            };
            if !is_file {
                continue;
            }
            if !extensions.allows(&entry.path().to_string_lossy()) {
                continue;
            }
            found.insert(entry.path().to_path_buf());
        }
    }
    found
}

fn mtime_of(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{TagBundle, TagReader};
    use std::collections::HashMap;
    use std::fs::File;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Deterministic tag source keyed by basename.
    struct StubTags(HashMap<String, TagBundle>);

    impl StubTags {
        fn new() -> Self {
            Self(HashMap::new())
        }

        fn tag(mut self, basename: &str, artist: &str, album: &str, title: &str, track: u32) -> Self {
            self.0.insert(
                basename.to_string(),
                TagBundle {
                    title: title.to_string(),
                    artist: artist.to_string(),
                    albumartist: artist.to_string(),
                    album: album.to_string(),
                    year: 1993,
                    track,
                    ..TagBundle::default()
                },
            );
            self
        }
    }

    impl TagReader for StubTags {
        fn read_tags(&self, path: &Path) -> Option<TagBundle> {
            let base = path.file_name()?.to_str()?;
            self.0.get(base).cloned()
        }
    }

    fn touch(path: &Path, secs: u64) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
    }

    fn write_file(dir: &Path, name: &str, secs: u64) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"audio bytes").unwrap();
        touch(&path, secs);
        path
    }

    fn priority() -> ExtensionPriority {
        ExtensionPriority::from_spec("flac;mp3;*")
    }

    #[test]
    fn test_ingest_new_files() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.flac", 1000);
        write_file(dir.path(), "b.mp3", 1000);
        let reader = StubTags::new()
            .tag("a.flac", "Björk", "Debut", "Venus as a Boy", 3)
            .tag("b.mp3", "Björk", "Debut", "Crying", 4);

        let db = Database::open_in_memory().unwrap();
        let summary = grovel(&db, &reader, &[dir.path().to_path_buf()], &priority()).unwrap();

        assert_eq!(summary.added, 2);
        assert_eq!(summary.removed, 0);
        assert_eq!(summary.pairs.len(), 2);
        assert_eq!(db.get_files().unwrap().len(), 2);
    }

    #[test]
    fn test_untagged_and_disallowed_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "tagged.flac", 1000);
        write_file(dir.path(), "untagged.flac", 1000);
        write_file(dir.path(), "cover.jpg", 1000);
        let reader = StubTags::new().tag("tagged.flac", "Björk", "Debut", "Venus as a Boy", 3);

        let db = Database::open_in_memory().unwrap();
        let strict = ExtensionPriority::from_spec("flac;mp3");
        let summary = grovel(&db, &reader, &[dir.path().to_path_buf()], &strict).unwrap();

        assert_eq!(summary.added, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(db.get_files().unwrap().len(), 1);
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.flac", 1000);
        let reader = StubTags::new().tag("a.flac", "Björk", "Debut", "Venus as a Boy", 3);
        let db = Database::open_in_memory().unwrap();
        let roots = [dir.path().to_path_buf()];

        let first = grovel(&db, &reader, &roots, &priority()).unwrap();
        assert_eq!(first.added, 1);

        let second = grovel(&db, &reader, &roots, &priority()).unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.removed, 0);
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.pairs, first.pairs);
    }

    #[test]
    fn test_touched_file_is_reingested() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "a.flac", 1000);
        let reader = StubTags::new().tag("a.flac", "Björk", "Debut", "Venus as a Boy", 3);
        let db = Database::open_in_memory().unwrap();
        let roots = [dir.path().to_path_buf()];

        grovel(&db, &reader, &roots, &priority()).unwrap();
        touch(&path, 2000);

        let summary = grovel(&db, &reader, &roots, &priority()).unwrap();
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.added, 1);
        assert_eq!(summary.unchanged, 0);

        let files = db.get_files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].mtime, 2000);
        // The logical track survived the file swap.
        assert_eq!(summary.pairs.len(), 1);
    }

    #[test]
    fn test_deleted_file_and_orphans_are_cleaned() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "keep.flac", 1000);
        let gone = write_file(dir.path(), "gone.flac", 1000);
        let reader = StubTags::new()
            .tag("keep.flac", "Björk", "Debut", "Venus as a Boy", 3)
            .tag("gone.flac", "Prince", "1999", "Delirious", 4);
        let db = Database::open_in_memory().unwrap();
        let roots = [dir.path().to_path_buf()];

        grovel(&db, &reader, &roots, &priority()).unwrap();
        std::fs::remove_file(&gone).unwrap();

        let summary = grovel(&db, &reader, &roots, &priority()).unwrap();
        assert_eq!(summary.removed, 1);
        assert_eq!(db.get_files().unwrap().len(), 1);

        // Track, artist and album that only the deleted file backed are gone.
        let tracks: i64 = db.conn.query_row("SELECT COUNT(*) FROM track", [], |r| r.get(0)).unwrap();
        let artists: i64 = db.conn.query_row("SELECT COUNT(*) FROM artist", [], |r| r.get(0)).unwrap();
        let albums: i64 = db.conn.query_row("SELECT COUNT(*) FROM album", [], |r| r.get(0)).unwrap();
        assert_eq!(tracks, 1);
        assert_eq!(artists, 1);
        assert_eq!(albums, 1);
    }

    #[test]
    fn test_same_metadata_files_share_a_track() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.flac", 1000);
        write_file(dir.path(), "a.mp3", 1000);
        let reader = StubTags::new()
            .tag("a.flac", "Björk", "Debut", "Venus as a Boy", 3)
            .tag("a.mp3", "Björk", "Debut", "Venus as a Boy", 3);
        let db = Database::open_in_memory().unwrap();

        let summary = grovel(&db, &reader, &[dir.path().to_path_buf()], &priority()).unwrap();
        assert_eq!(summary.added, 2);
        let track_ids: std::collections::HashSet<i64> =
            summary.pairs.iter().map(|(track_id, _)| *track_id).collect();
        assert_eq!(track_ids.len(), 1);
    }

    #[test]
    fn test_subdirectories_are_walked() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("artist/album")).unwrap();
        write_file(&dir.path().join("artist/album"), "a.flac", 1000);
        let reader = StubTags::new().tag("a.flac", "Björk", "Debut", "Venus as a Boy", 3);
        let db = Database::open_in_memory().unwrap();

        let summary = grovel(&db, &reader, &[dir.path().to_path_buf()], &priority()).unwrap();
        assert_eq!(summary.added, 1);
    }

    #[test]
    fn test_overlapping_roots_deduplicate() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        write_file(&dir.path().join("sub"), "a.flac", 1000);
        let reader = StubTags::new().tag("a.flac", "Björk", "Debut", "Venus as a Boy", 3);
        let db = Database::open_in_memory().unwrap();

        let roots = [dir.path().to_path_buf(), dir.path().join("sub")];
        let summary = grovel(&db, &reader, &roots, &priority()).unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(db.get_files().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_to_file_is_followed() {
        let dir = TempDir::new().unwrap();
        let target = write_file(dir.path(), "real.flac", 1000);
        let link = dir.path().join("link.flac");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let reader = StubTags::new()
            .tag("real.flac", "Björk", "Debut", "Venus as a Boy", 3)
            .tag("link.flac", "Björk", "Debut", "Venus as a Boy", 3);
        let db = Database::open_in_memory().unwrap();

        let summary = grovel(&db, &reader, &[dir.path().to_path_buf()], &priority()).unwrap();
        assert_eq!(summary.added, 2);
    }
}
