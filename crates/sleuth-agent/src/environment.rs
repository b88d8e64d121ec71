//! Line-oriented document access for the agent.
//!
//! An [`Environment`] holds a document as a fixed sequence of lines, each
//! keeping its original terminator, and answers the three questions the
//! model may ask about it: show me a window, where does this word occur,
//! and what am I looking at.

use std::path::{Path, PathBuf};

use crate::error::EnvironmentError;

/// Maximum number of line indices returned by [`Environment::keyword_search`].
pub const KEYWORD_SEARCH_LIMIT: usize = 50;

/// Where a document came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOrigin {
    /// Loaded once from disk.
    File(PathBuf),
    /// Handed down in memory by a delegating agent.
    Chunk,
}

/// A read-only, line-indexed document.
#[derive(Debug, Clone)]
pub struct Environment {
    origin: DocumentOrigin,
    lines: Vec<String>,
}

impl Environment {
    /// Load a document from disk.
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than rejected.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EnvironmentError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                EnvironmentError::NotFound(path.to_path_buf())
            } else {
                EnvironmentError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let text = String::from_utf8_lossy(&bytes);
        let lines = split_lines(&text, is_newline);

        tracing::debug!(path = %path.display(), total_lines = lines.len(), "Document loaded");

        Ok(Self {
            origin: DocumentOrigin::File(path.to_path_buf()),
            lines,
        })
    }

    /// Wrap an in-memory text chunk. An empty chunk has zero lines.
    pub fn from_chunk(text: impl AsRef<str>) -> Self {
        Self {
            origin: DocumentOrigin::Chunk,
            lines: split_lines(text.as_ref(), is_line_boundary),
        }
    }

    pub fn origin(&self) -> &DocumentOrigin {
        &self.origin
    }

    pub fn total_lines(&self) -> usize {
        self.lines.len()
    }

    /// Render lines `[start_line, start_line + num_lines)` clipped to the
    /// document, each prefixed with `[Line <n>] `.
    ///
    /// A negative start counts as 0. A non-positive count, or a start at or
    /// past the end, yields an empty string.
    pub fn read_window(&self, start_line: i64, num_lines: i64) -> String {
        let total = self.lines.len();
        let start = usize::try_from(start_line.max(0)).unwrap_or(usize::MAX).min(total);
        let count = usize::try_from(num_lines.max(0)).unwrap_or(usize::MAX);
        let end = start.saturating_add(count).min(total);

        self.lines[start..end]
            .iter()
            .enumerate()
            .map(|(offset, line)| format!("[Line {}] {}", start + offset, line))
            .collect()
    }

    /// Indices of lines containing `keyword`, ignoring case.
    ///
    /// Ascending, at most [`KEYWORD_SEARCH_LIMIT`] entries. The empty keyword
    /// matches every line.
    pub fn keyword_search(&self, keyword: &str) -> Vec<usize> {
        let needle = keyword.to_lowercase();

        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.to_lowercase().contains(&needle))
            .map(|(index, _)| index)
            .take(KEYWORD_SEARCH_LIMIT)
            .collect()
    }

    /// Short orientation text for the model.
    pub fn metadata(&self) -> String {
        match &self.origin {
            DocumentOrigin::File(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                format!("Filename: {}, Total Lines: {}", name, self.lines.len())
            }
            DocumentOrigin::Chunk => format!("String chunk, Total Lines: {}", self.lines.len()),
        }
    }
}

/// Split after every char matching `boundary`, keeping the terminator.
/// `\r\n` is one boundary.
fn split_lines(text: &str, boundary: fn(char) -> bool) -> Vec<String> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let end = match c {
            '\r' if matches!(chars.peek(), Some((_, '\n'))) => {
                chars.next();
                i + 2
            }
            c if boundary(c) => i + c.len_utf8(),
            _ => continue,
        };
        lines.push(text[start..end].to_string());
        start = end;
    }

    if start < text.len() {
        lines.push(text[start..].to_string());
    }

    lines
}

/// Files break only on line feed and carriage return.
fn is_newline(c: char) -> bool {
    matches!(c, '\n' | '\r')
}

/// Chunks also break on vertical tab, form feed, the file, group and
/// record separators, NEL, and the Unicode line and paragraph separators.
fn is_line_boundary(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}
