//! Directory-pair configuration file.
//!
//! ```text
//! # comment
//! /data/photos   /backup/photos
//! /data/docs     /backup/docs
//! ```
//!
//! Each non-blank, non-comment line holds a whitespace-separated
//! `source target` pair; extra tokens are ignored. Lines with fewer than two
//! tokens are returned as [`SkippedLine`]s rather than failing the load.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// A `source target` pair read from the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryPair {
    pub source: PathBuf,
    pub target: PathBuf,
    /// 1-based line number in the file.
    pub line: usize,
}

/// A line that could not be parsed into a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub line: usize,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncConfig {
    pub pairs: Vec<DirectoryPair>,
    pub skipped: Vec<SkippedLine>,
}

/// Parse configuration text. Never fails; unparsable lines are collected.
pub fn parse_config(text: &str) -> SyncConfig {
    let mut config = SyncConfig::default();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some(source), Some(target)) => config.pairs.push(DirectoryPair {
                source: PathBuf::from(source),
                target: PathBuf::from(target),
                line: idx + 1,
            }),
            _ => config.skipped.push(SkippedLine {
                line: idx + 1,
                content: raw.to_string(),
            }),
        }
    }
    config
}

/// Read and parse the configuration file at `path`.
///
/// A missing file is [`ConfigError::NotFound`]; the caller treats it as fatal.
pub fn load_config(path: &Path) -> Result<SyncConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    Ok(parse_config(&text))
}
