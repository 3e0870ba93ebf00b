/// File chunker (P1). Wraps the tree-sitter-aware span splitter in
/// `languages` to produce stable-identity `FileChunk`s for a single file.
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::languages::TSLanguageParsing;

#[derive(Debug, Clone, Serialize)]
pub struct FileChunkMetadata {
    pub extension: Option<String>,
    pub file_size_bytes: u64,
    pub content_hash: String,
    pub file_modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileChunk {
    pub id: String,
    pub content: String,
    pub file_path: String,
    pub repository: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub metadata: FileChunkMetadata,
}

/// `id = "{repository}:{filePath}:{chunkIndex}"` — reproducible from inputs
/// alone; deletion-by-prefix depends on this formula staying stable.
pub fn chunk_id(repository: &str, file_path: &str, chunk_index: usize) -> String {
    format!("{repository}:{file_path}:{chunk_index}")
}

pub fn chunk_file(
    parser: &TSLanguageParsing,
    repository: &str,
    file_path: &str,
    content: &str,
    file_modified_at: Option<DateTime<Utc>>,
) -> Vec<FileChunk> {
    let extension = std::path::Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase());

    let spans = parser.chunk_file(file_path, content, extension.as_deref());
    let total_chunks = spans.len();
    let content_hash = blake3::hash(content.as_bytes()).to_hex().to_string();
    let file_size_bytes = content.len() as u64;

    spans
        .into_iter()
        .enumerate()
        .map(|(chunk_index, span)| FileChunk {
            id: chunk_id(repository, file_path, chunk_index),
            content: span.data.unwrap_or_default(),
            file_path: file_path.to_owned(),
            repository: repository.to_owned(),
            chunk_index,
            total_chunks,
            start_line: span.start,
            end_line: span.end,
            metadata: FileChunkMetadata {
                extension: extension.clone(),
                file_size_bytes,
                content_hash: content_hash.clone(),
                file_modified_at,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_reproducible_from_inputs_alone() {
        assert_eq!(chunk_id("repo", "src/a.ts", 0), "repo:src/a.ts:0");
        assert_eq!(chunk_id("repo", "src/a.ts", 0), chunk_id("repo", "src/a.ts", 0));
    }

    #[test]
    fn chunking_a_small_rust_file_yields_one_chunk_with_full_content() {
        let parser = TSLanguageParsing::init();
        let source = "fn main() {\n    println!(\"hi\");\n}\n";
        let chunks = chunk_file(&parser, "repo", "src/main.rs", source, None);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "repo:src/main.rs:0");
        assert_eq!(chunks[0].total_chunks, 1);
        assert_eq!(chunks[0].metadata.extension.as_deref(), Some("rs"));
    }

    #[test]
    fn unknown_extension_falls_back_to_naive_line_chunking() {
        let parser = TSLanguageParsing::init();
        let source = (0..200)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = chunk_file(&parser, "repo", "NOTES.txt", &source, None);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
        }
    }
}
