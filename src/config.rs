use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from a TOML config file.
/// All fields have sensible defaults — the config file is optional, and
/// every field can be overridden on the command line.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// Roots of the backing music collection.
    pub backing_fs_paths: Vec<PathBuf>,
    /// Where the synthesized tree is mounted. Carried for the transport;
    /// the index itself never reads it.
    pub mount_point: Option<PathBuf>,
    /// Virtual path layout in the `%placeholder%` DSL.
    pub path_pattern: Option<String>,
    /// Path to the SQLite index (default `./music.db`).
    pub database: Option<PathBuf>,
    /// Semicolon-separated extension priority list, e.g. `"flac;mp3;*"`.
    pub extensions: Option<String>,
    /// Artist aliases file.
    pub aliases: Option<PathBuf>,
}

impl AppConfig {
    /// Load config from `~/.config/musicfs/config.toml`.
    /// Returns default config if the file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Split a `"flac;mp3;*"` style list into its entries, lowercased.
pub fn split_extension_list(spec: &str) -> Vec<String> {
    spec.split(';')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

// Ranks used when no list entry applies. An unmatched file without a
// wildcard entry is worse than every ranked file; the empty string is the
// reject sentinel and is worse than everything, unmatched files included.
const RANK_UNMATCHED: usize = usize::MAX - 1;
const RANK_REJECT: usize = usize::MAX;

/// User-ordered extension preference. Doubles as the groveler's allow-list
/// and as the strict weak ordering that collapses same-track files in
/// directory listings.
#[derive(Debug, Clone, Default)]
pub struct ExtensionPriority {
    // Extension → its position in the user's list; `*` keeps its position
    // as the fallback rank.
    ranked: Vec<(String, usize)>,
    wildcard: Option<usize>,
}

impl ExtensionPriority {
    pub fn new(entries: &[String]) -> Self {
        let mut ranked = Vec::new();
        let mut wildcard = None;
        for (i, entry) in entries.iter().enumerate() {
            if entry == "*" {
                if wildcard.is_none() {
                    wildcard = Some(i);
                }
            } else {
                ranked.push((entry.to_lowercase(), i));
            }
        }
        Self { ranked, wildcard }
    }

    pub fn from_spec(spec: &str) -> Self {
        Self::new(&split_extension_list(spec))
    }

    /// Rank of a backing path: position of the first matching extension in
    /// the user's list, the wildcard's position when nothing matches, or
    /// "worse than everything".
    pub fn rank(&self, path: &str) -> usize {
        if path.is_empty() {
            return RANK_REJECT;
        }
        let ext = extension_of(path).to_lowercase();
        for (entry, position) in &self.ranked {
            if *entry == ext {
                return *position;
            }
        }
        self.wildcard.unwrap_or(RANK_UNMATCHED)
    }

    /// Strict weak ordering: does `a` beat `b`?
    pub fn prefers(&self, a: &str, b: &str) -> bool {
        self.rank(a) < self.rank(b)
    }

    /// Allow-list check for the groveler: listed extension, or any
    /// extension when the list carries the `*` sentinel.
    pub fn allows(&self, path: &str) -> bool {
        self.rank(path) < RANK_UNMATCHED
    }
}

/// Lowercased text after the final `.` of the basename; empty if none.
fn extension_of(path: &str) -> &str {
    let base = path.rsplit('/').next().unwrap_or(path);
    match base.rfind('.') {
        Some(i) => &base[i + 1..],
        None => "",
    }
}
