//! Source path lists the hash database is built from.
//!
//! A list is plain text, one entry per line:
//!
//! ```text
//! # comment
//! common/font/font1.tex;4096;128;0
//! exd/root.exl
//! ```
//!
//! Fields after the path are `size`, `offset` and `segment`; missing fields
//! default to zero.

use crate::error::{Result, VfsError};
use crate::hashdb::types::SegmentId;
use crate::utils::normalize_path;
use ignore::WalkBuilder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

/// One listed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Path as listed, separators normalized but case preserved
    pub path: String,
    pub size: u64,
    pub offset: u64,
    pub segment: SegmentId,
}

/// Where a path list comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUri {
    Local(String),
    Remote(String),
}

impl SourceUri {
    pub fn parse(uri: &str) -> Self {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            SourceUri::Remote(uri.to_string())
        } else {
            let path = uri.strip_prefix("file://").unwrap_or(uri);
            SourceUri::Local(path.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SourceUri::Local(s) | SourceUri::Remote(s) => s,
        }
    }
}

/// A parsed path list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceList {
    pub entries: Vec<SourceEntry>,
}

impl SourceList {
    /// Fetch and parse a list from a local file or URL
    pub fn fetch(uri: &SourceUri) -> Result<Self> {
        match uri {
            SourceUri::Local(path) => {
                info!(path = %path, "reading path list");
                let file = File::open(path)?;
                Self::parse(BufReader::new(file))
            }
            SourceUri::Remote(url) => Self::parse(BufReader::new(fetch_remote(url)?)),
        }
    }

    /// Parse a list from any buffered reader
    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut entries = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    return Err(VfsError::Parse {
                        line: idx + 1,
                        reason: "line is not valid UTF-8".to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            };
            if let Some(entry) = parse_line(&line, idx + 1)? {
                entries.push(entry);
            }
        }

        debug!(entries = entries.len(), "parsed path list");
        Ok(Self { entries })
    }

    /// List every regular file below `root`, with its real size
    pub fn from_directory(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(VfsError::not_found(root.display().to_string()));
        }

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .sort_by_file_path(|a, b| a.cmp(b))
            .build();

        let mut entries = Vec::new();
        for dent in walker {
            let dent = match dent {
                Ok(d) => d,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !dent.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let Ok(rel) = dent.path().strip_prefix(root) else {
                continue;
            };
            let size = dent.metadata().map(|m| m.len()).unwrap_or(0);
            entries.push(SourceEntry {
                path: rel.to_string_lossy().replace('\\', "/"),
                size,
                offset: 0,
                segment: 0,
            });
        }

        info!(root = %root.display(), files = entries.len(), "listed directory");
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<Option<SourceEntry>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut fields = line.split(';');
    let raw_path = fields.next().unwrap_or("").trim();
    if normalize_path(raw_path).is_empty() {
        return Err(VfsError::Parse {
            line: line_no,
            reason: "empty path".to_string(),
        });
    }

    let size = parse_field(fields.next(), line_no, "size")?;
    let offset = parse_field(fields.next(), line_no, "offset")?;
    let segment = parse_field(fields.next(), line_no, "segment")?;
    let segment = SegmentId::try_from(segment).map_err(|_| VfsError::Parse {
        line: line_no,
        reason: format!("segment {segment} out of range"),
    })?;

    let path = crate::utils::split_path(raw_path).collect::<Vec<_>>().join("/");
    Ok(Some(SourceEntry {
        path,
        size,
        offset,
        segment,
    }))
}

fn parse_field(field: Option<&str>, line: usize, name: &str) -> Result<u64> {
    match field.map(str::trim) {
        None | Some("") => Ok(0),
        Some(value) => value.parse().map_err(|_| VfsError::Parse {
            line,
            reason: format!("invalid {name} {value:?}"),
        }),
    }
}

#[cfg(feature = "remote")]
fn fetch_remote(url: &str) -> Result<impl std::io::Read> {
    info!(url = %url, "fetching path list");
    let network = |reason: String| VfsError::Network {
        uri: url.to_string(),
        reason,
    };

    let response = reqwest::blocking::get(url).map_err(|e| network(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(network(format!("HTTP {status}")));
    }
    let body = response.bytes().map_err(|e| network(e.to_string()))?;
    Ok(std::io::Cursor::new(body))
}

#[cfg(not(feature = "remote"))]
fn fetch_remote(url: &str) -> Result<std::io::Empty> {
    Err(VfsError::Network {
        uri: url.to_string(),
        reason: "built without the `remote` feature".to_string(),
    })
}
