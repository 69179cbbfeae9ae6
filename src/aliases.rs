use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AliasError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: indented name cannot come before a canonical name")]
    IndentedFirst { line: usize },
    #[error("line {line}: \"{alias}\" is already mapped to \"{existing}\"")]
    DuplicateAlias {
        line: usize,
        alias: String,
        existing: String,
    },
}

/// Maps case-folded artist aliases to a canonical spelling.
///
/// The file format is one canonical name per non-indented line, each
/// followed by any number of indented alias lines. `#` lines and blank
/// lines are ignored.
#[derive(Debug, Default)]
pub struct ArtistAliases {
    map: HashMap<String, String>,
}

impl ArtistAliases {
    pub fn load(path: &Path) -> Result<Self, AliasError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, AliasError> {
        let mut map: HashMap<String, String> = HashMap::new();
        let mut canonical: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            if raw.trim().is_empty() || raw.trim_start().starts_with('#') {
                continue;
            }

            if raw.starts_with(|c: char| c.is_whitespace()) {
                let canon = match &canonical {
                    Some(c) => c,
                    None => return Err(AliasError::IndentedFirst { line }),
                };
                let alias = raw.trim().to_lowercase();
                if let Some(existing) = map.get(&alias) {
                    if existing != canon {
                        return Err(AliasError::DuplicateAlias {
                            line,
                            alias,
                            existing: existing.clone(),
                        });
                    }
                    continue;
                }
                map.insert(alias, canon.clone());
            } else {
                // Canonicals keep their spelling; only aliases are folded.
                canonical = Some(raw.trim_end().to_string());
            }
        }

        Ok(Self { map })
    }

    /// Case-folds the query and returns the canonical spelling, if mapped.
    pub fn lookup(&self, query: &str) -> Option<&str> {
        self.map.get(&query.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_mapping() {
        let aliases = ArtistAliases::parse("The Beatles\n  the beatles\n  beatles\n").unwrap();
        assert_eq!(aliases.lookup("the beatles"), Some("The Beatles"));
        assert_eq!(aliases.lookup("beatles"), Some("The Beatles"));
        assert_eq!(aliases.lookup("wings"), None);
        assert_eq!(aliases.len(), 2);
    }

    #[test]
    fn test_lookup_case_folds_query() {
        let aliases = ArtistAliases::parse("The Beatles\n  the beatles\n").unwrap();
        assert_eq!(aliases.lookup("The BEATLES"), Some("The Beatles"));
    }

    #[test]
    fn test_canonical_keeps_spelling() {
        let aliases = ArtistAliases::parse("MGMT\n\tmgmt\n").unwrap();
        assert_eq!(aliases.lookup("MgMt"), Some("MGMT"));
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let text = "# artist aliases\n\nBjörk\n  bjork\n\n# done\n";
        let aliases = ArtistAliases::parse(text).unwrap();
        assert_eq!(aliases.lookup("bjork"), Some("Björk"));
    }

    #[test]
    fn test_multiple_blocks() {
        let text = "The Beatles\n  beatles\nThe Rolling Stones\n  stones\n";
        let aliases = ArtistAliases::parse(text).unwrap();
        assert_eq!(aliases.lookup("beatles"), Some("The Beatles"));
        assert_eq!(aliases.lookup("stones"), Some("The Rolling Stones"));
    }

    #[test]
    fn test_indented_first_is_error() {
        let err = ArtistAliases::parse("  beatles\nThe Beatles\n").unwrap_err();
        assert!(matches!(err, AliasError::IndentedFirst { line: 1 }));
    }

    #[test]
    fn test_duplicate_alias_to_other_canonical_is_error() {
        let text = "The Beatles\n  fab four\nThe Rolling Stones\n  fab four\n";
        let err = ArtistAliases::parse(text).unwrap_err();
        match err {
            AliasError::DuplicateAlias { line, alias, existing } => {
                assert_eq!(line, 4);
                assert_eq!(alias, "fab four");
                assert_eq!(existing, "The Beatles");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_alias_same_canonical_ok() {
        let text = "The Beatles\n  beatles\n  beatles\n";
        let aliases = ArtistAliases::parse(text).unwrap();
        assert_eq!(aliases.lookup("beatles"), Some("The Beatles"));
    }

    #[test]
    fn test_empty_input() {
        let aliases = ArtistAliases::parse("").unwrap();
        assert!(aliases.is_empty());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = ArtistAliases::load(Path::new("/nonexistent/aliases.conf")).unwrap_err();
        assert!(matches!(err, AliasError::Io(_)));
    }
}
