pub mod aliases;
pub mod config;
pub mod db;
pub mod fileops;
pub mod groveler;
pub mod pathbuilder;
pub mod pattern;
pub mod tags;

/// Default layout of the virtual tree.
pub const DEFAULT_PATH_PATTERN: &str = "%albumartist%/[%year%] %album%/%track% - %title%.%ext%";

/// Default extension priority: flac beats mp3 beats anything else.
pub const DEFAULT_EXTENSIONS: &str = "flac;mp3;*";

/// Application name for XDG paths
pub const APP_NAME: &str = "musicfs";
