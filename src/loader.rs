//! Filesystem document loader.
//!
//! Walks a root directory, classifies each file by extension into
//! [`Category::Documentation`] or [`Category::Code`], and reads its text.
//! Files with unrecognized extensions are skipped silently; files that are
//! recognized but cannot be read (bad PDF, invalid UTF-8, too large) become
//! [`LoadFailure`] values in the stream so one bad file never aborts a load.
//!
//! [`Loader::load`] is lazy: nothing is read until the returned
//! [`DocumentStream`] is advanced, and calling it again re-walks the tree
//! from scratch. [`Loader::load_all`] drains the stream into a
//! [`LoadReport`] of successes and failures.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::LoaderConfig;
use crate::error::{RagError, Result};
use crate::extract;
use crate::models::{Category, Document};

/// Directories that never contain source worth indexing.
const DEFAULT_EXCLUDES: &[&str] = &[
    "**/.git/**",
    "**/node_modules/**",
    "**/target/**",
    "**/dist/**",
];

/// A recognized file that could not be turned into a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub path: String,
    pub reason: String,
}

impl std::fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// Everything a full walk produced.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub failures: Vec<LoadFailure>,
}

pub struct Loader {
    documentation: HashSet<String>,
    code: HashSet<String>,
    excludes: GlobSet,
    follow_symlinks: bool,
    max_file_bytes: u64,
}

impl Loader {
    pub fn new(config: &LoaderConfig) -> Result<Self> {
        let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        patterns.extend(config.exclude_globs.iter().cloned());

        Ok(Self {
            documentation: normalize_extensions(&config.documentation_extensions),
            code: normalize_extensions(&config.code_extensions),
            excludes: build_globset(&patterns)?,
            follow_symlinks: config.follow_symlinks,
            max_file_bytes: config.max_file_bytes,
        })
    }

    /// Category and lower-cased extension of `path`, or `None` when the
    /// extension is on neither allow-list.
    pub fn classify(&self, path: &Path) -> Option<(Category, String)> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if self.documentation.contains(&ext) {
            Some((Category::Documentation, ext))
        } else if self.code.contains(&ext) {
            Some((Category::Code, ext))
        } else {
            None
        }
    }

    /// Start a lazy walk of `root`.
    ///
    /// Fails with [`RagError::PathNotFound`] when `root` is not an existing,
    /// readable directory.
    pub fn load(&self, root: &Path) -> Result<DocumentStream<'_>> {
        if !root.is_dir() {
            return Err(RagError::PathNotFound(format!(
                "not a directory: {}",
                root.display()
            )));
        }
        std::fs::read_dir(root).map_err(|e| {
            RagError::PathNotFound(format!("cannot read {}: {}", root.display(), e))
        })?;

        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter();

        Ok(DocumentStream {
            loader: self,
            root: root.to_path_buf(),
            walker,
        })
    }

    /// Walk `root` to completion, separating documents from failures.
    pub fn load_all(&self, root: &Path) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        for item in self.load(root)? {
            match item {
                Ok(doc) => report.documents.push(doc),
                Err(failure) => report.failures.push(failure),
            }
        }
        Ok(report)
    }

    fn read_document(
        &self,
        path: &Path,
        relative: String,
        category: Category,
        file_type: String,
    ) -> std::result::Result<Document, LoadFailure> {
        let fail = |reason: String| LoadFailure {
            path: relative.clone(),
            reason,
        };

        let size = std::fs::metadata(path)
            .map_err(|e| fail(e.to_string()))?
            .len();
        if size > self.max_file_bytes {
            return Err(fail(format!(
                "file is {} bytes, above the {} byte limit",
                size, self.max_file_bytes
            )));
        }

        let bytes = std::fs::read(path).map_err(|e| fail(e.to_string()))?;
        let content = if extract::is_binary_format(&file_type) {
            extract::extract_text(&bytes, &file_type).map_err(|e| fail(e.to_string()))?
        } else {
            String::from_utf8(bytes).map_err(|_| fail("not valid UTF-8".to_string()))?
        };

        Ok(Document {
            content,
            source_path: relative,
            category,
            file_type,
        })
    }
}

/// Lazy, finite sequence of loaded documents in sorted walk order.
pub struct DocumentStream<'a> {
    loader: &'a Loader,
    root: PathBuf,
    walker: walkdir::IntoIter,
}

impl Iterator for DocumentStream<'_> {
    type Item = std::result::Result<Document, LoadFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| relative_path(&self.root, p))
                        .unwrap_or_default();
                    let failure = LoadFailure {
                        path,
                        reason: e.to_string(),
                    };
                    warn!(path = %failure.path, reason = %failure.reason, "skipping unreadable entry");
                    return Some(Err(failure));
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = relative_path(&self.root, path);
            if self.loader.excludes.is_match(&relative) {
                continue;
            }

            let Some((category, file_type)) = self.loader.classify(path) else {
                debug!(path = %relative, "skipping unrecognized file type");
                continue;
            };

            let item = self
                .loader
                .read_document(path, relative, category, file_type);
            if let Err(failure) = &item {
                warn!(path = %failure.path, reason = %failure.reason, "skipping file");
            }
            return Some(item);
        }
    }
}

/// `path` relative to `root`, always `/`-separated.
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn normalize_extensions(exts: &[String]) -> HashSet<String> {
    exts.iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RagError::Config(format!("invalid exclude glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::Config(format!("invalid exclude globs: {}", e)))
}
