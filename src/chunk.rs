//! Category-aware recursive text splitter.
//!
//! Turns a [`Document`] into retrieval-sized [`Chunk`]s. Both categories use
//! the same recursive algorithm and differ only in the separator table:
//!
//! - **code** tries declaration boundaries for the file's language first
//!   (`\nfunction `, `\nclass `, `\ndef `, ...), then blank lines, lines,
//!   words and finally single characters;
//! - **documentation** tries headings (markdown only), paragraphs, lines,
//!   sentences, words and characters.
//!
//! The algorithm picks the first separator that occurs in the text, splits
//! on it (keeping the separator at the start of the following piece),
//! greedily merges pieces up to `chunk_size` characters with up to
//! `chunk_overlap` characters carried into the next chunk, and recurses
//! into any piece that is still too large using the remaining separators.
//! The final separator is always `""`, so every input terminates in
//! fixed-width character slicing at worst.
//!
//! All lengths are counted in `char`s, never bytes.

use sha2::{Digest, Sha256};
use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::models::{Category, Chunk, ChunkMetadata, Document};

const TYPESCRIPT: &[&str] = &[
    "\nexport ",
    "\nenum ",
    "\ninterface ",
    "\nnamespace ",
    "\ntype ",
    "\nclass ",
    "\nfunction ",
    "\nconst ",
    "\nlet ",
    "\nvar ",
    "\nif ",
    "\nfor ",
    "\nwhile ",
    "\nswitch ",
    "\ncase ",
    "\ndefault ",
    "\n\n",
    "\n",
    " ",
    "",
];

const HTML: &[&str] = &[
    "<body", "<div", "<p", "<br", "<li", "<h1", "<h2", "<h3", "<h4", "<h5", "<h6", "<span",
    "<table", "<tr", "<td", "<th", "<ul", "<ol", "<header", "<footer", "<nav", "<head",
    "<style", "<script", "<meta", "<title", "",
];

const CSS: &[&str] = &["\n\n", "\n.", "\n#", "\n@", "\n", " ", ""];

const PYTHON: &[&str] = &[
    "\nclass ", "\ndef ", "\n\tdef ", "\n    def ", "\n\n", "\n", " ", "",
];

const RUST: &[&str] = &[
    "\npub fn ",
    "\nfn ",
    "\nimpl ",
    "\npub struct ",
    "\nstruct ",
    "\npub enum ",
    "\nenum ",
    "\ntrait ",
    "\nmod ",
    "\nconst ",
    "\nlet ",
    "\nif ",
    "\nwhile ",
    "\nfor ",
    "\nloop ",
    "\nmatch ",
    "\n\n",
    "\n",
    " ",
    "",
];

const GO: &[&str] = &[
    "\nfunc ", "\nvar ", "\nconst ", "\ntype ", "\nif ", "\nfor ", "\nswitch ", "\ncase ",
    "\n\n", "\n", " ", "",
];

const JAVA: &[&str] = &[
    "\nclass ",
    "\npublic ",
    "\nprotected ",
    "\nprivate ",
    "\nstatic ",
    "\nif ",
    "\nfor ",
    "\nwhile ",
    "\nswitch ",
    "\ncase ",
    "\n\n",
    "\n",
    " ",
    "",
];

const GENERIC_CODE: &[&str] = &["\n\n", "\n", " ", ""];

const MARKDOWN: &[&str] = &[
    "\n# ", "\n## ", "\n### ", "\n#### ", "\n\n", "\n", ". ", " ", "",
];

const PROSE: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Separator table for a document, most structural first, always ending in `""`.
pub fn separators_for(category: Category, file_type: &str) -> &'static [&'static str] {
    match category {
        Category::Code => match file_type {
            "ts" | "tsx" | "js" | "jsx" | "mjs" => TYPESCRIPT,
            "html" | "htm" => HTML,
            "css" | "scss" => CSS,
            "py" => PYTHON,
            "rs" => RUST,
            "go" => GO,
            "java" => JAVA,
            _ => GENERIC_CODE,
        },
        Category::Documentation => match file_type {
            "md" | "markdown" => MARKDOWN,
            _ => PROSE,
        },
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Splitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Splitter {
    /// `chunk_size` is clamped to at least 1 and `chunk_overlap` to below it.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split one document. Empty or whitespace-only content yields no chunks;
    /// content that fits in one chunk is returned verbatim as a single chunk.
    pub fn split(&self, doc: &Document) -> Vec<Chunk> {
        if doc.content.trim().is_empty() {
            return Vec::new();
        }

        let texts = if char_len(&doc.content) <= self.chunk_size {
            vec![doc.content.clone()]
        } else {
            let separators = separators_for(doc.category, &doc.file_type);
            let mut texts = self.split_text(&doc.content, separators);
            if texts.is_empty() {
                texts = self.slice_fixed(doc.content.trim());
            }
            texts
        };

        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| make_chunk(doc, i as i64, text))
            .collect()
    }

    /// Recursive split of `text` with the given separator table.
    pub fn split_text(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, rest) = match separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s))
        {
            Some(i) => (separators[i], &separators[i + 1..]),
            None => ("", &[][..]),
        };

        let mut out = Vec::new();
        let mut fitting: Vec<String> = Vec::new();
        for piece in split_keep_start(text, separator) {
            if char_len(&piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                out.extend(self.merge(&fitting));
                fitting.clear();
            }
            if rest.is_empty() {
                out.extend(self.slice_fixed(&piece));
            } else {
                out.extend(self.split_text(&piece, rest));
            }
        }
        if !fitting.is_empty() {
            out.extend(self.merge(&fitting));
        }
        out
    }

    /// Greedily concatenate pieces into chunks of at most `chunk_size`
    /// characters, carrying a tail of at most `chunk_overlap` characters
    /// into the next chunk.
    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut out, &window);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front);
                }
            }
            window.push_back(piece);
            total += len;
        }
        push_trimmed(&mut out, &window);
        out
    }

    /// Naive fixed-width slicing, the last resort for unsplittable text.
    fn slice_fixed(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = (self.chunk_size - self.chunk_overlap).max(1);
        let mut out = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let slice: String = chars[start..end].iter().collect();
            let trimmed = slice.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
            if end == chars.len() {
                break;
            }
            start += step;
        }
        out
    }
}

fn push_trimmed(out: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Split on `separator`, keeping each occurrence at the start of the piece
/// that follows it. An empty separator splits into characters.
fn split_keep_start(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut pieces = Vec::new();
    let mut last = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > last {
            pieces.push(text[last..idx].to_string());
        }
        last = idx;
    }
    if last < text.len() {
        pieces.push(text[last..].to_string());
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(doc: &Document, index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        text,
        metadata: ChunkMetadata {
            source_path: doc.source_path.clone(),
            category: doc.category,
            file_type: doc.file_type.clone(),
            chunk_index: index,
        },
        hash,
    }
}
