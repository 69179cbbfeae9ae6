use thiserror::Error;

use crate::db::models::TrackAttributes;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PatternError {
    #[error("invalid token %{0}% in path pattern")]
    UnknownPlaceholder(String),
    #[error("unterminated % placeholder in path pattern")]
    Unterminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Component {
    Literal(String),
    Artist,
    AlbumArtist,
    Album,
    Genre,
    Year,
    Track,
    Title,
    Extension,
}

/// A parsed path pattern: the DSL string split on `/` into levels, each a
/// run of literals and placeholders.
#[derive(Debug, Clone)]
pub struct PathPattern {
    levels: Vec<Vec<Component>>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let mut levels = Vec::new();
        let mut level: Vec<Component> = Vec::new();
        let mut buf = String::new();
        let mut in_placeholder = false;

        for c in pattern.chars() {
            if in_placeholder {
                if c == '%' {
                    let component = match buf.as_str() {
                        "artist" => Component::Artist,
                        "albumartist" => Component::AlbumArtist,
                        "album" => Component::Album,
                        "genre" => Component::Genre,
                        "year" => Component::Year,
                        "track" => Component::Track,
                        "title" => Component::Title,
                        "ext" => Component::Extension,
                        other => return Err(PatternError::UnknownPlaceholder(other.to_string())),
                    };
                    buf.clear();
                    in_placeholder = false;
                    level.push(component);
                } else {
                    buf.push(c);
                }
            } else {
                match c {
                    '%' => {
                        if !buf.is_empty() {
                            level.push(Component::Literal(std::mem::take(&mut buf)));
                        }
                        in_placeholder = true;
                    }
                    '/' => {
                        if !buf.is_empty() {
                            level.push(Component::Literal(std::mem::take(&mut buf)));
                        }
                        levels.push(std::mem::take(&mut level));
                    }
                    _ => buf.push(c),
                }
            }
        }

        if in_placeholder {
            return Err(PatternError::Unterminated);
        }
        if !buf.is_empty() {
            level.push(Component::Literal(buf));
        }
        levels.push(level);

        Ok(Self { levels })
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Pushes `/` followed by the rendered level onto `buf`.
    pub fn append_level(&self, buf: &mut String, attrs: &TrackAttributes, level: usize) {
        buf.push('/');
        for component in &self.levels[level] {
            match component {
                Component::Literal(s) => buf.push_str(s),
                Component::Artist => push_or_unknown(buf, &attrs.artist, "(unknown artist)"),
                Component::AlbumArtist => {
                    push_or_unknown(buf, &attrs.albumartist, "(unknown artist)")
                }
                Component::Album => push_or_unknown(buf, &attrs.album, "(unknown album)"),
                Component::Genre => push_or_unknown(buf, &attrs.genre, "(unknown genre)"),
                Component::Year => {
                    if attrs.year.is_empty() {
                        buf.push_str("____");
                    } else {
                        buf.push_str(&attrs.year);
                    }
                }
                Component::Track => push_track(buf, attrs),
                Component::Title => {
                    if attrs.title.is_empty() {
                        buf.push_str(basename_stem(&attrs.path));
                    } else {
                        buf.push_str(&sanitize_path(&attrs.title));
                    }
                }
                Component::Extension => buf.push_str(extension_of(&attrs.path)),
            }
        }
    }
}

fn push_or_unknown(buf: &mut String, value: &str, unknown: &str) {
    if value.is_empty() {
        buf.push_str(unknown);
    } else {
        buf.push_str(&sanitize_path(value));
    }
}

/// `__` when the track number is unknown; otherwise the number zero-padded
/// to at least two digits, prefixed with `<disc>.` for multi-disc sets.
fn push_track(buf: &mut String, attrs: &TrackAttributes) {
    if attrs.track.is_empty() {
        buf.push_str("__");
        return;
    }

    // DISCNUMBER is either "n" or "n/total"; the disc shows only when the
    // set has more than one.
    let show_disc = match attrs.disc.split_once('/') {
        Some((_, total)) => leading_u32(total) > 1,
        None => leading_u32(&attrs.disc) > 1,
    };
    if show_disc {
        let display = attrs
            .disc
            .split_once('/')
            .map_or(attrs.disc.as_str(), |(disc, _)| disc);
        buf.push_str(display);
        buf.push('.');
    }

    if attrs.track.len() == 1 {
        buf.push('0');
    }
    buf.push_str(&attrs.track);
}

/// atoi-style parse: value of the leading digit run, 0 if there is none.
fn leading_u32(s: &str) -> u32 {
    let digits: String = s
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// Basename of the backing path with the extension stripped; the title
/// fallback when the tag has none.
fn basename_stem(path: &str) -> &str {
    let base = path.rsplit('/').next().unwrap_or(path);
    match base.rfind('.') {
        Some(i) => &base[..i],
        None => base,
    }
}

/// Text after the final `.` of the backing path; empty if none.
fn extension_of(path: &str) -> &str {
    match path.rfind('.') {
        Some(i) => &path[i + 1..],
        None => "",
    }
}

/// Restrict a metadata fragment to characters legal in a path segment.
/// Windows' restricted set, so the virtual tree copies cleanly anywhere;
/// trailing dots and spaces are stripped for the same reason.
pub fn sanitize_path(s: &str) -> String {
    let mut result: String = s
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();
    while result.ends_with(['.', ' ']) {
        result.pop();
    }
    if result.is_empty() {
        result.push('_');
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs() -> TrackAttributes {
        TrackAttributes {
            artist: "Björk".into(),
            albumartist: "Björk".into(),
            album: "Debut".into(),
            genre: String::new(),
            year: "1993".into(),
            title: "Venus as a Boy".into(),
            track: "3".into(),
            disc: String::new(),
            path: "/music/a.flac".into(),
        }
    }

    fn render(pattern: &PathPattern, attrs: &TrackAttributes) -> String {
        let mut path = String::new();
        for level in 0..pattern.level_count() {
            pattern.append_level(&mut path, attrs, level);
        }
        path
    }

    #[test]
    fn test_parse_default_pattern() {
        let pattern = PathPattern::parse(crate::DEFAULT_PATH_PATTERN).unwrap();
        assert_eq!(pattern.level_count(), 3);
    }

    #[test]
    fn test_unknown_placeholder_is_error() {
        let err = PathPattern::parse("%albumartist%/%foo%").unwrap_err();
        assert_eq!(err, PatternError::UnknownPlaceholder("foo".to_string()));
    }

    #[test]
    fn test_unterminated_placeholder_is_error() {
        let err = PathPattern::parse("%albumartist%/%title").unwrap_err();
        assert_eq!(err, PatternError::Unterminated);
    }

    #[test]
    fn test_render_full_pattern() {
        let pattern = PathPattern::parse(crate::DEFAULT_PATH_PATTERN).unwrap();
        assert_eq!(render(&pattern, &attrs()), "/Björk/[1993] Debut/03 - Venus as a Boy.flac");
    }

    #[test]
    fn test_render_missing_metadata() {
        let pattern = PathPattern::parse(crate::DEFAULT_PATH_PATTERN).unwrap();
        let attrs = TrackAttributes {
            path: "/music/noise.mp3".into(),
            ..TrackAttributes::default()
        };
        assert_eq!(render(&pattern, &attrs), "/(unknown artist)/[____] (unknown album)/__ - noise.mp3");
    }

    #[test]
    fn test_render_multi_disc() {
        let pattern = PathPattern::parse(crate::DEFAULT_PATH_PATTERN).unwrap();
        let attrs = TrackAttributes {
            albumartist: "Z".into(),
            album: "Y".into(),
            year: "2000".into(),
            title: "X".into(),
            track: "5".into(),
            disc: "1/2".into(),
            path: "/music/x.flac".into(),
            ..TrackAttributes::default()
        };
        assert_eq!(render(&pattern, &attrs), "/Z/[2000] Y/1.05 - X.flac");
    }

    #[test]
    fn test_single_disc_total_hides_disc() {
        let mut a = attrs();
        a.track = "5".into();
        a.disc = "1/1".into();
        let pattern = PathPattern::parse("%track% - %title%").unwrap();
        assert_eq!(render(&pattern, &a), "/05 - Venus as a Boy");
    }

    #[test]
    fn test_bare_disc_number_shows_when_greater_than_one() {
        let mut a = attrs();
        a.track = "12".into();
        a.disc = "2".into();
        let pattern = PathPattern::parse("%track%").unwrap();
        assert_eq!(render(&pattern, &a), "/2.12");
    }

    #[test]
    fn test_genre_renders_unknown() {
        let pattern = PathPattern::parse("%genre%").unwrap();
        assert_eq!(render(&pattern, &attrs()), "/(unknown genre)");
    }

    #[test]
    fn test_title_falls_back_to_basename() {
        let mut a = attrs();
        a.title = String::new();
        a.path = "/music/albums/07 - Big Time Sensuality.flac".into();
        let pattern = PathPattern::parse("%title%").unwrap();
        assert_eq!(render(&pattern, &a), "/07 - Big Time Sensuality");
    }

    #[test]
    fn test_extension_from_backing_path() {
        let mut a = attrs();
        a.path = "/music/a.MP3".into();
        let pattern = PathPattern::parse("%title%.%ext%").unwrap();
        assert_eq!(render(&pattern, &a), "/Venus as a Boy.MP3");
    }

    #[test]
    fn test_render_is_deterministic() {
        let pattern = PathPattern::parse(crate::DEFAULT_PATH_PATTERN).unwrap();
        let a = attrs();
        assert_eq!(render(&pattern, &a), render(&pattern, &a));
    }

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("a/b:c ?d. ."), "a_b_c _d");
        assert_eq!(sanitize_path("AC/DC"), "AC_DC");
        assert_eq!(sanitize_path("<x>|\"y\"*\\z?"), "_x___y___z_");
        assert_eq!(sanitize_path("..."), "_");
        assert_eq!(sanitize_path(""), "_");
        assert_eq!(sanitize_path("ok"), "ok");
    }

    #[test]
    fn test_sanitized_fields_in_rendered_path() {
        let mut a = attrs();
        a.albumartist = "AC/DC".into();
        a.album = "Who Made Who?".into();
        let pattern = PathPattern::parse("%albumartist%/%album%").unwrap();
        assert_eq!(render(&pattern, &a), "/AC_DC/Who Made Who_");
    }
}
