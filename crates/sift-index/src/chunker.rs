//! Line-window chunking with a fixed characters-per-token estimate.

use std::path::{Path, PathBuf};

use crate::languages::is_indexable;

/// One window of consecutive source lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// First line of the window (0-based).
    pub start_line: usize,
    /// One past the last line of the window.
    pub end_line: usize,
    /// Lines `[start_line, end_line)` joined with `\n`.
    pub text: String,
    /// Path relative to the codebase root, `/`-separated.
    pub file_path: String,
}

/// Chunker configuration.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Estimated tokens per window before it is closed (default: 256).
    pub window_tokens: usize,
    /// Files with fewer characters produce no chunks (default: 128).
    pub min_file_chars: usize,
    /// Files with any longer line produce no chunks (default: 1024).
    pub max_line_chars: usize,
    /// Files of this many bytes or more are skipped unread (default: `1_000_000`).
    pub max_file_bytes: u64,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            window_tokens: 256,
            min_file_chars: 128,
            max_line_chars: 1024,
            max_file_bytes: 1_000_000,
        }
    }
}

/// Four characters per token, counting the line terminator.
#[must_use]
pub fn estimate_tokens(line: &str) -> usize {
    (line.chars().count() + 1).div_ceil(4)
}

/// Split one file's content into windows.
///
/// Returns nothing for files that are too short in total or that contain an
/// overlong line (minified bundles, generated data); such files are never
/// partially chunked.
#[must_use]
pub fn chunk_text(content: &str, file_path: &str, config: &ChunkerConfig) -> Vec<Chunk> {
    if content.chars().count() < config.min_file_chars {
        return Vec::new();
    }

    let lines: Vec<&str> = content.split('\n').collect();
    if lines
        .iter()
        .any(|l| l.chars().count() > config.max_line_chars)
    {
        return Vec::new();
    }

    line_windows(&lines, config.window_tokens)
        .into_iter()
        .map(|(start, end)| Chunk {
            start_line: start,
            end_line: end,
            text: lines[start..end].join("\n"),
            file_path: file_path.to_owned(),
        })
        .collect()
}

/// Greedy `[start, end)` ranges: a window closes just before the line that pushes
/// its estimate past `window_tokens`, and that line opens the next window.
fn line_windows(lines: &[&str], window_tokens: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut tokens = 0;

    for (i, line) in lines.iter().enumerate() {
        let cost = estimate_tokens(line);
        tokens += cost;
        if tokens > window_tokens {
            if i > start {
                ranges.push((start, i));
            }
            start = i;
            tokens = cost;
        }
    }

    if start < lines.len() {
        ranges.push((start, lines.len()));
    }
    ranges
}

/// Lazily chunks every eligible file under a codebase root.
#[derive(Debug, Clone)]
pub struct Chunker {
    root: PathBuf,
    config: ChunkerConfig,
}

impl Chunker {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, config: ChunkerConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Eligible regular files, in a stable order.
    #[must_use]
    pub fn files(&self) -> Vec<PathBuf> {
        ignore::WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(err) => {
                    tracing::warn!("walk error under {}: {err}", self.root.display());
                    None
                }
            })
            .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()))
            .filter(|e| is_indexable(&relative_path(&self.root, e.path())))
            .map(ignore::DirEntry::into_path)
            .collect()
    }

    /// Chunk stream over the whole codebase.
    ///
    /// The directory walk happens up front; files are read one at a time as the
    /// iterator advances. Each call starts a fresh walk.
    pub fn chunks(&self) -> impl Iterator<Item = Chunk> + Send + 'static {
        let root = self.root.clone();
        let config = self.config.clone();
        self.files()
            .into_iter()
            .flat_map(move |path| chunk_file(&root, &path, &config))
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Read and chunk a single file, skipping it on size, IO, or decoding problems.
fn chunk_file(root: &Path, path: &Path, config: &ChunkerConfig) -> Vec<Chunk> {
    let rel_path = relative_path(root, path);

    match std::fs::metadata(path) {
        Ok(meta) if meta.len() >= config.max_file_bytes => {
            tracing::debug!(file = %rel_path, bytes = meta.len(), "skipping oversized file");
            return Vec::new();
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(file = %rel_path, "cannot stat file: {e}");
            return Vec::new();
        }
    }

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(file = %rel_path, "cannot read file: {e}");
            return Vec::new();
        }
    };
    let Ok(content) = String::from_utf8(bytes) else {
        tracing::warn!(file = %rel_path, "skipping file that is not valid UTF-8");
        return Vec::new();
    };

    chunk_text(&content, &rel_path, config)
}
