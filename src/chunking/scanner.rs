/// File scanner (P1). Walks a repository checkout respecting `.gitignore`
/// semantics, same `ignore::WalkBuilder` idiom the repository filesystem
/// walker already uses, generalised with an explicit include-extension and
/// exclude-pattern policy for the indexing pipeline.
use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;

pub const MAX_FILE_BYTES: u64 = 30 * 20_000;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub include_extensions: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

impl ScanOptions {
    fn matcher(&self, root: &Path) -> Gitignore {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in &self.exclude_patterns {
            // GitignoreBuilder reports malformed globs; skip them rather
            // than aborting the whole scan over one bad pattern.
            let _ = builder.add_line(None, pattern);
        }
        builder.build().unwrap_or_else(|_| Gitignore::empty())
    }

    fn extension_allowed(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()));
        match ext {
            Some(ext) => self.include_extensions.iter().any(|allowed| allowed == &ext),
            None => false,
        }
    }
}

pub struct Scanner;

impl Scanner {
    /// Returns repo-relative, POSIX-separated paths of files that pass both
    /// the extension allow-list and the exclude-pattern matcher.
    pub fn scan(root: &Path, opts: &ScanOptions) -> Vec<String> {
        let matcher = opts.matcher(root);

        let walker = WalkBuilder::new(root).standard_filters(true).hidden(false).build();

        walker
            .filter_map(|entry| entry.ok())
            .filter(|entry| matches!(entry.file_type(), Some(ft) if ft.is_file()))
            .filter(|entry| matches!(entry.metadata(), Ok(meta) if meta.len() < MAX_FILE_BYTES))
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(root).ok()?.to_owned();
                Some(relative)
            })
            .filter(|relative| opts.extension_allowed(relative))
            .filter(|relative| !matcher.matched(relative, false).is_ignore())
            .map(|relative| to_posix(&relative))
            .collect()
    }
}

fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn read_file(root: &Path, relative_path: &str) -> std::io::Result<String> {
    std::fs::read_to_string(root.join(relative_path))
}

pub fn file_len(root: &Path, relative_path: &str) -> std::io::Result<u64> {
    std::fs::metadata(root.join(relative_path)).map(|m| m.len())
}

#[allow(dead_code)]
fn to_pathbuf(s: &str) -> PathBuf {
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, relative: &str, contents: &str) {
        let full = dir.join(relative);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut f = std::fs::File::create(full).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn excludes_node_modules_and_non_matching_extensions() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/a.ts", "export const a = 1;");
        write_file(dir.path(), "README.md", "hello");
        write_file(dir.path(), "node_modules/pkg/index.ts", "module.exports = {}");

        let opts = ScanOptions {
            include_extensions: vec![".ts".to_owned()],
            exclude_patterns: vec!["node_modules/**".to_owned()],
        };
        let mut found = Scanner::scan(dir.path(), &opts);
        found.sort();
        assert_eq!(found, vec!["src/a.ts".to_owned()]);
    }

    #[test]
    fn negated_exclude_patterns_are_supported() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "dist/keep.js", "console.log(1)");
        write_file(dir.path(), "dist/drop.min.js", "x");

        let opts = ScanOptions {
            include_extensions: vec![".js".to_owned()],
            exclude_patterns: vec!["**/*.min.js".to_owned(), "!dist/keep.js".to_owned()],
        };
        let mut found = Scanner::scan(dir.path(), &opts);
        found.sort();
        assert_eq!(found, vec!["dist/keep.js".to_owned()]);
    }
}
