use std::collections::HashMap;

use rusqlite::{params, OptionalExtension};

use super::models::{ChildEntry, FileRow, LibraryStats, ResolvedPath, TrackAttributes, TrackTuple};
use super::{Database, Result};

impl Database {
    /// Case-insensitive lookup in a name table, inserting if absent.
    fn get_or_add_name(&self, table: &str, name: &str) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                &format!("SELECT id FROM {table} WHERE name = ?1"),
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        self.conn.execute(
            &format!("INSERT INTO {table} (name) VALUES (?1)"),
            params![name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_or_add_artist(&self, name: &str) -> Result<i64> {
        self.get_or_add_name("artist", name)
    }

    pub fn get_or_add_album(&self, name: &str) -> Result<i64> {
        self.get_or_add_name("album", name)
    }

    /// Dedup by the full metadata tuple: files that agree on every field
    /// share one logical track.
    pub fn get_or_add_track(&self, t: &TrackTuple) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM track
                 WHERE artist_id = ?1 AND albumartist_id = ?2 AND album_id = ?3
                   AND year = ?4 AND name = ?5 AND track = ?6 AND disc = ?7",
                params![
                    t.artist_id,
                    t.albumartist_id,
                    t.album_id,
                    t.year,
                    t.name,
                    t.track,
                    t.disc
                ],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO track (artist_id, albumartist_id, album_id, year, name, track, disc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                t.artist_id,
                t.albumartist_id,
                t.album_id,
                t.year,
                t.name,
                t.track,
                t.disc
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Always inserts; a track may be backed by any number of files.
    pub fn add_file(&self, track_id: i64, path: &str, mtime: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO file (track_id, path, mtime) VALUES (?1, ?2, ?3)",
            params![track_id, path, mtime],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn remove_file(&self, file_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM file WHERE id = ?1", params![file_id])?;
        Ok(())
    }

    /// Full file inventory, for reconciliation against the backing tree.
    pub fn get_files(&self) -> Result<Vec<FileRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, track_id, mtime, path FROM file ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(FileRow {
                    id: row.get(0)?,
                    track_id: row.get(1)?,
                    mtime: row.get(2)?,
                    path: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Join a file back to the humanized strings path rendering works on:
    /// unknown year/track come back empty, disc NULL folds to empty.
    pub fn get_attributes(&self, file_id: i64) -> Result<TrackAttributes> {
        let attrs = self.conn.query_row(
            "SELECT ar.name, aa.name, al.name, t.year, t.name, t.track, t.disc, f.path
             FROM file f
             JOIN track t  ON t.id  = f.track_id
             JOIN artist ar ON ar.id = t.artist_id
             JOIN artist aa ON aa.id = t.albumartist_id
             JOIN album al  ON al.id = t.album_id
             WHERE f.id = ?1",
            params![file_id],
            |row| {
                let year: i64 = row.get(3)?;
                let track: i64 = row.get(5)?;
                Ok(TrackAttributes {
                    artist: row.get(0)?,
                    albumartist: row.get(1)?,
                    album: row.get(2)?,
                    genre: String::new(),
                    year: if year == 0 { String::new() } else { year.to_string() },
                    title: row.get(4)?,
                    track: if track == 0 { String::new() } else { track.to_string() },
                    disc: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                    path: row.get(7)?,
                })
            },
        )?;
        Ok(attrs)
    }

    pub fn clear_paths(&self) -> Result<()> {
        self.conn.execute("DELETE FROM path", [])?;
        Ok(())
    }

    /// Insert-or-fetch by the unique virtual path. Directory rows pass
    /// `leaf = None`; file leaves carry their track and file id together.
    /// On a UNIQUE conflict the existing row's id comes back unchanged.
    pub fn add_path(&self, path: &str, parent_id: Option<i64>, leaf: Option<(i64, i64)>) -> Result<i64> {
        let (track_id, file_id) = match leaf {
            Some((track_id, file_id)) => (Some(track_id), Some(file_id)),
            None => (None, None),
        };
        let changed = self.conn.execute(
            "INSERT INTO path (path, parent_id, track_id, file_id) VALUES (?1, ?2, ?3, ?4)",
            params![path, parent_id, track_id, file_id],
        )?;
        if changed == 1 {
            return Ok(self.conn.last_insert_rowid());
        }
        let id: i64 = self.conn.query_row(
            "SELECT id FROM path WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )?;
        log::debug!("virtual path already present: {path} (id {id})");
        Ok(id)
    }

    pub fn get_path_id(&self, path: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row("SELECT id FROM path WHERE path = ?1", params![path], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(id)
    }

    /// Resolve a virtual path to its row and, for files, the backing path.
    pub fn get_real_path(&self, path: &str) -> Result<Option<ResolvedPath>> {
        let resolved = self
            .conn
            .query_row(
                "SELECT p.id, f.path
                 FROM path p LEFT JOIN file f ON f.id = p.file_id
                 WHERE p.path = ?1",
                params![path],
                |row| {
                    Ok(ResolvedPath {
                        id: row.get(0)?,
                        backing: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(resolved)
    }

    /// Direct children of a path row (0 = the mount root). Directories pass
    /// through; files partition by track, and within each track the first
    /// child under `prefer` wins. A winner that loses to the empty string
    /// is suppressed entirely.
    pub fn get_children_of_path(
        &self,
        parent_id: i64,
        prefer: &dyn Fn(&str, &str) -> bool,
    ) -> Result<Vec<ChildEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.path, p.track_id, f.path
             FROM path p LEFT JOIN file f ON f.id = p.file_id
             WHERE (?1 = 0 AND p.parent_id IS NULL) OR p.parent_id = ?1
             ORDER BY p.path",
        )?;
        let rows = stmt
            .query_map(params![parent_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut children: Vec<ChildEntry> = Vec::new();
        // track id → (position in `children`, backing path of current best)
        let mut best: HashMap<i64, (usize, String)> = HashMap::new();

        for (id, path, track_id, backing) in rows {
            match (track_id, backing) {
                (Some(track_id), Some(backing)) => {
                    let current = best
                        .get(&track_id)
                        .map(|(position, current)| (*position, prefer(&backing, current)));
                    match current {
                        None => {
                            children.push(ChildEntry { id, path, is_dir: false });
                            best.insert(track_id, (children.len() - 1, backing));
                        }
                        Some((position, better)) => {
                            if better {
                                children[position] = ChildEntry { id, path, is_dir: false };
                                best.insert(track_id, (position, backing));
                            }
                        }
                    }
                }
                _ => children.push(ChildEntry { id, path, is_dir: true }),
            }
        }

        // Drop tracks whose best candidate still loses to "reject".
        let mut suppressed: Vec<usize> = best
            .values()
            .filter(|(_, backing)| !prefer(backing, ""))
            .map(|(position, _)| *position)
            .collect();
        suppressed.sort_unstable_by(|a, b| b.cmp(a));
        for position in suppressed {
            children.remove(position);
        }

        Ok(children)
    }

    /// Drop artists and albums no track references any more. Artists count
    /// as referenced through either the artist or the album-artist column.
    pub fn clean_tables(&self) -> Result<usize> {
        let artists = self.conn.execute(
            "DELETE FROM artist
             WHERE id NOT IN (SELECT artist_id FROM track)
               AND id NOT IN (SELECT albumartist_id FROM track)",
            [],
        )?;
        let albums = self.conn.execute(
            "DELETE FROM album WHERE id NOT IN (SELECT album_id FROM track)",
            [],
        )?;
        Ok(artists + albums)
    }

    /// Drop tracks that no longer have any backing file.
    pub fn clean_tracks(&self) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM track WHERE id NOT IN (SELECT track_id FROM file)",
            [],
        )?;
        Ok(removed)
    }

    /// Library statistics.
    pub fn stats(&self) -> Result<LibraryStats> {
        let count = |table: &str| -> Result<i64> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
        };
        Ok(LibraryStats {
            artists: count("artist")?,
            albums: count("album")?,
            tracks: count("track")?,
            files: count("file")?,
            paths: count("path")?,
        })
    }

    /// Drop childless directory rows, repeating until a round removes
    /// nothing so emptied ancestors go too.
    pub fn clean_paths(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            let removed = self.conn.execute(
                "DELETE FROM path
                 WHERE track_id IS NULL
                   AND id NOT IN (SELECT parent_id FROM path WHERE parent_id IS NOT NULL)",
                [],
            )?;
            if removed == 0 {
                return Ok(total);
            }
            total += removed;
        }
    }
}
