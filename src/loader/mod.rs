//! Readers for the line-oriented input files: url lists, user-agent lists,
//! POST data, cookies and header sets.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{Cookie, HeaderSet};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} has no entries")]
    Empty(PathBuf),
}

fn read(path: &Path) -> Result<String, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Read {} bytes from {}", content.len(), path.display());
    Ok(content)
}

fn non_empty<T>(path: &Path, entries: Vec<T>) -> Result<Vec<T>, LoadError> {
    if entries.is_empty() {
        return Err(LoadError::Empty(path.to_path_buf()));
    }
    Ok(entries)
}

/// One entry per line, trimmed, blank lines skipped.
pub fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// `key=value` lines; the first `=` splits key from value.
pub fn parse_post_data(content: &str) -> Vec<(String, String)> {
    parse_lines(content)
        .into_iter()
        .filter_map(|line| match line.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Some((key.trim().to_string(), value.trim().to_string()))
            }
            _ => {
                warn!("Ignoring post data line `{}`", line);
                None
            }
        })
        .collect()
}

/// `attribute=value~attribute=value` lines, one cookie per line.
pub fn parse_cookies(content: &str) -> Vec<Cookie> {
    let mut cookies = Vec::new();
    for line in parse_lines(content) {
        let mut cookie = Cookie::default();
        for part in line.split('~') {
            let (attribute, value) = part.split_once('=').unwrap_or((part, ""));
            if let Err(e) = cookie.set_attribute(attribute, value) {
                warn!("Cookie line `{}`: {}", line, e);
            }
        }
        if cookie.name.is_empty() {
            warn!("Ignoring cookie without a name: `{}`", line);
            continue;
        }
        cookies.push(cookie);
    }
    cookies
}

/// `Header:Value~Header:Value` lines, one header set per line.
pub fn parse_header_sets(content: &str) -> Vec<HeaderSet> {
    parse_lines(content)
        .into_iter()
        .filter_map(|line| {
            let set: HeaderSet = line
                .split('~')
                .filter_map(|pair| match pair.split_once(':') {
                    Some((name, value)) if !name.trim().is_empty() => {
                        Some((name.trim().to_string(), value.trim().to_string()))
                    }
                    _ => {
                        warn!("Ignoring header `{}` in `{}`", pair, line);
                        None
                    }
                })
                .collect();
            (!set.is_empty()).then_some(set)
        })
        .collect()
}

pub fn load_lines(path: &Path) -> Result<Vec<String>, LoadError> {
    non_empty(path, parse_lines(&read(path)?))
}

pub fn load_post_data(path: &Path) -> Result<Vec<(String, String)>, LoadError> {
    non_empty(path, parse_post_data(&read(path)?))
}

pub fn load_cookies(path: &Path) -> Result<Vec<Cookie>, LoadError> {
    non_empty(path, parse_cookies(&read(path)?))
}

pub fn load_header_sets(path: &Path) -> Result<Vec<HeaderSet>, LoadError> {
    non_empty(path, parse_header_sets(&read(path)?))
}
