/// Dedup key for a logical track: two files with byte-identical metadata
/// describe the same recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTuple {
    pub artist_id: i64,
    pub albumartist_id: i64,
    pub album_id: i64,
    pub year: i64,
    pub name: String,
    pub track: i64,
    pub disc: String,
}

/// A file row read back for reconciliation.
#[derive(Debug, Clone)]
pub struct FileRow {
    pub id: i64,
    pub track_id: i64,
    pub mtime: i64,
    pub path: String,
}

/// Humanized attribute set used to render virtual paths. Numeric fields
/// arrive as strings; empty means unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackAttributes {
    pub artist: String,
    pub albumartist: String,
    pub album: String,
    pub genre: String,
    pub year: String,
    pub title: String,
    pub track: String,
    pub disc: String,
    /// Backing file path, for the title fallback and `%ext%`.
    pub path: String,
}

/// Resolution of a virtual path. `backing == None` means the row is a
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub id: i64,
    pub backing: Option<String>,
}

impl ResolvedPath {
    pub fn is_dir(&self) -> bool {
        self.backing.is_none()
    }
}

/// A direct child of a virtual directory, after same-track files have been
/// collapsed by the caller's preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub id: i64,
    pub path: String,
    pub is_dir: bool,
}

/// Row counts for the `stats` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryStats {
    pub artists: i64,
    pub albums: i64,
    pub tracks: i64,
    pub files: i64,
    pub paths: i64,
}

/// The persisted configuration row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredConfig {
    pub backing_fs_paths: Vec<String>,
    pub extension_priority: Vec<String>,
    pub path_pattern: String,
    pub aliases_conf_path: String,
}
