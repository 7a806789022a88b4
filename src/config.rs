//! Configuration management for Reader Server

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::convert::{ConverterOptions, DEFAULT_MAX_FILENAME_LEN};

const DEFAULT_CACHE_SIZE: usize = 10;
const DEFAULT_SIZE_WARNING_MB: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding `*_data` artifact directories
    pub books_dir: PathBuf,
    /// Artifacts kept in memory
    pub cache_size: usize,
    /// Sources above this size convert with a warning
    pub size_warning_mb: u64,
    /// Cap on persisted asset filename length
    pub max_filename_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            books_dir: PathBuf::from("."),
            cache_size: DEFAULT_CACHE_SIZE,
            size_warning_mb: DEFAULT_SIZE_WARNING_MB,
            max_filename_len: DEFAULT_MAX_FILENAME_LEN,
        }
    }
}

impl Config {
    /// Read `BOOKS_DIR`, `MAX_BOOK_CACHE_SIZE`, `READER_SIZE_WARNING_MB` and
    /// `READER_MAX_FILENAME_LEN`
    ///
    /// Unset or unparsable values keep their defaults. Only a variable that
    /// is not valid unicode is an error.
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = Config::default();

        Ok(Config {
            books_dir: read_var("BOOKS_DIR")?
                .map(PathBuf::from)
                .unwrap_or(defaults.books_dir),
            cache_size: parse_var("MAX_BOOK_CACHE_SIZE", defaults.cache_size)?,
            size_warning_mb: parse_var("READER_SIZE_WARNING_MB", defaults.size_warning_mb)?,
            max_filename_len: parse_var("READER_MAX_FILENAME_LEN", defaults.max_filename_len)?,
        })
    }

    /// Converter settings derived from this configuration
    pub fn converter_options(&self) -> ConverterOptions {
        ConverterOptions {
            size_warning_bytes: self.size_warning_mb.saturating_mul(1024 * 1024),
            max_filename_len: self.max_filename_len,
        }
    }
}

fn read_var(name: &str) -> Result<Option<String>, env::VarError> {
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e),
    }
}

fn parse_var<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> Result<T, env::VarError> {
    let Some(raw) = read_var(name)? else {
        return Ok(default);
    };
    Ok(parse_or(name, &raw, default))
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(name: &str, raw: &str, default: T) -> T {
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid value {:?} for {}, using default {}", raw, name, default);
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.books_dir, PathBuf::from("."));
        assert_eq!(config.cache_size, 10);
        assert_eq!(config.size_warning_mb, 500);
        assert_eq!(config.max_filename_len, 200);
    }

    #[test]
    fn test_parse_or_falls_back() {
        assert_eq!(parse_or("X", "25", 10usize), 25);
        assert_eq!(parse_or("X", " 25 ", 10usize), 25);
        assert_eq!(parse_or("X", "lots", 10usize), 10);
        assert_eq!(parse_or("X", "-1", 10usize), 10);
    }

    #[test]
    fn test_converter_options() {
        let config = Config {
            size_warning_mb: 2,
            max_filename_len: 64,
            ..Config::default()
        };
        let options = config.converter_options();
        assert_eq!(options.size_warning_bytes, 2 * 1024 * 1024);
        assert_eq!(options.max_filename_len, 64);
    }
}
