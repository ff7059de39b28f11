//! # Per-Data-Source Configuration
//!
//! A data source maps to one database directory. The host hands the
//! module a configuration file per data source; the only recognised key
//! is `DatabasePath`, the absolute or relative directory that holds the
//! table files.
//!
//! The format is a flat INI-style `Key = Value` list. Blank lines and
//! lines starting with `#` or `;` are ignored; a `[section]` header is
//! tolerated and skipped so that configurations shared with other modules
//! still parse. Parsing failures (missing file, missing key) surface as
//! `eyre` errors and make the `open` syscall fail with a general error —
//! a misconfigured data source never reaches the connection layer.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{eyre, Result, WrapErr};

/// Configuration key naming the database directory.
pub const DATABASE_PATH_KEY: &str = "DatabasePath";

/// Parsed configuration of one data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TdbConnectionConf {
    database_path: PathBuf,
}

impl TdbConnectionConf {
    /// Builds a configuration directly from a directory path.
    pub fn with_database_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: path.into(),
        }
    }

    /// Loads a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read configuration file '{}'", path.display()))?;
        Self::parse(&text)
            .wrap_err_with(|| format!("failed to parse configuration file '{}'", path.display()))
    }

    /// Parses configuration text.
    pub fn parse(text: &str) -> Result<Self> {
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| eyre!("line {}: expected 'Key = Value'", lineno + 1))?;
            if key.trim() == DATABASE_PATH_KEY {
                let value = value.trim();
                if value.is_empty() {
                    return Err(eyre!("line {}: empty {}", lineno + 1, DATABASE_PATH_KEY));
                }
                return Ok(Self::with_database_path(value));
            }
        }
        Err(eyre!("missing required key '{}'", DATABASE_PATH_KEY))
    }

    /// The configured database directory.
    pub fn database_path(&self) -> &Path {
        &self.database_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_key_value() {
        let conf = TdbConnectionConf::parse("DatabasePath = /var/lib/tdb\n").unwrap();
        assert_eq!(conf.database_path(), Path::new("/var/lib/tdb"));
    }

    #[test]
    fn tolerates_comments_sections_and_unknown_keys() {
        let text = "# comment\n; other comment\n[Database]\nRetries = 3\nDatabasePath=data/db1\n";
        let conf = TdbConnectionConf::parse(text).unwrap();
        assert_eq!(conf.database_path(), Path::new("data/db1"));
    }

    #[test]
    fn missing_key_is_an_error() {
        assert!(TdbConnectionConf::parse("SomethingElse = 1\n").is_err());
        assert!(TdbConnectionConf::parse("").is_err());
    }

    #[test]
    fn empty_value_is_an_error() {
        assert!(TdbConnectionConf::parse("DatabasePath =\n").is_err());
    }

    #[test]
    fn malformed_line_is_an_error() {
        assert!(TdbConnectionConf::parse("DatabasePath /x\n").is_err());
    }
}
