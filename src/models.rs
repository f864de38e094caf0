//! Core data types flowing through ingestion and retrieval.
//!
//! A [`Document`] is produced by the loader and consumed once by the
//! splitter; each [`Chunk`] it yields is embedded and persisted as a
//! [`VectorRecord`]. At query time the store returns [`ScoredChunk`]s which
//! the chain projects into API-facing [`Source`]s.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad classification of a file, selecting the splitting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Documentation,
    Code,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Documentation => "documentation",
            Category::Code => "code",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "documentation" => Some(Category::Documentation),
            "code" => Some(Category::Code),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw text of one loaded file.
#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    /// Path relative to the ingestion root, `/`-separated.
    pub source_path: String,
    pub category: Category,
    /// Lower-cased file extension (`"md"`, `"ts"`, ...).
    pub file_type: String,
}

/// Provenance carried by every chunk and persisted alongside its vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_path: String,
    pub category: Category,
    pub file_type: String,
    pub chunk_index: i64,
}

/// A retrieval-sized slice of a document. `text` is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk as persisted: id, embedding and the model that produced it.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    pub model: String,
}

/// A chunk paired with its similarity to a query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Ordered (descending score) result of one similarity search.
pub type RetrievalResult = Vec<ScoredChunk>;

/// API-facing projection of a retrieved chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub file: String,
    pub content: String,
    pub score: f32,
}

impl From<&ScoredChunk> for Source {
    fn from(scored: &ScoredChunk) -> Self {
        Source {
            file: scored.chunk.metadata.source_path.clone(),
            content: scored.chunk.text.clone(),
            score: scored.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip_str() {
        for c in [Category::Documentation, Category::Code] {
            assert_eq!(Category::parse(c.as_str()), Some(c));
        }
        assert_eq!(Category::parse("binary"), None);
    }

    #[test]
    fn test_source_projection() {
        let scored = ScoredChunk {
            chunk: Chunk {
                text: "export function validateEmail() {}".to_string(),
                metadata: ChunkMetadata {
                    source_path: "src/auth.ts".to_string(),
                    category: Category::Code,
                    file_type: "ts".to_string(),
                    chunk_index: 0,
                },
                hash: String::new(),
            },
            score: 0.75,
        };
        let source = Source::from(&scored);
        assert_eq!(source.file, "src/auth.ts");
        assert_eq!(source.content, "export function validateEmail() {}");
        assert_eq!(source.score, 0.75);
    }
}
