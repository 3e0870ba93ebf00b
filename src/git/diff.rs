/// Computes `FileChange` sets between two commits of a local checkout using
/// `gix`'s tree-diff walker, classifying changes into the pipeline's change
/// model instead of accumulating diff text.
use gix::bstr::ByteSlice;
use gix::objs::tree::EntryMode;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to open repository at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("failed to resolve ref {reference}: {source}")]
    ResolveRef {
        reference: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("failed to walk tree diff: {0}")]
    Diff(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileChange {
    pub path: String,
    pub status: FileChangeStatus,
    pub previous_path: Option<String>,
}

/// Diffs `old` (may be `None` for "no previous commit indexed", in which
/// case every blob reachable from `new`'s tree is reported as `added`)
/// against `new`. Both are commit-ish revspecs resolved against the
/// repository at `repo_path`.
pub fn diff_commits(
    repo_path: &std::path::Path,
    old: Option<&str>,
    new: &str,
) -> Result<Vec<FileChange>, GitError> {
    let repo = gix::open(repo_path).map_err(|e| GitError::Open {
        path: repo_path.display().to_string(),
        source: Box::new(e),
    })?;

    let new_commit = resolve_commit(&repo, new)?;
    let new_tree = new_commit.tree().map_err(|e| GitError::Diff(e.to_string()))?;

    let mut changes = Vec::new();

    match old {
        None => {
            let entries = new_tree
                .traverse()
                .breadthfirst
                .files()
                .map_err(|e| GitError::Diff(e.to_string()))?;
            for entry in entries {
                if matches!(entry.mode, EntryMode::Blob | EntryMode::BlobExecutable) {
                    changes.push(FileChange {
                        path: entry.filepath.to_string(),
                        status: FileChangeStatus::Added,
                        previous_path: None,
                    });
                }
            }
        }
        Some(old_rev) => {
            let old_commit = resolve_commit(&repo, old_rev)?;
            let old_tree = old_commit.tree().map_err(|e| GitError::Diff(e.to_string()))?;

            old_tree
                .changes()
                .map_err(|e| GitError::Diff(e.to_string()))?
                .track_path()
                .for_each_to_obtain_tree(&new_tree, |change| {
                    let location = change.location.to_str_lossy().to_string();
                    use gix::object::tree::diff::change::Event;
                    match &change.event {
                        Event::Addition { entry_mode, .. }
                            if matches!(entry_mode, EntryMode::Blob | EntryMode::BlobExecutable) =>
                        {
                            changes.push(FileChange {
                                path: location,
                                status: FileChangeStatus::Added,
                                previous_path: None,
                            });
                        }
                        Event::Deletion { entry_mode, .. }
                            if matches!(entry_mode, EntryMode::Blob | EntryMode::BlobExecutable) =>
                        {
                            changes.push(FileChange {
                                path: location,
                                status: FileChangeStatus::Deleted,
                                previous_path: None,
                            });
                        }
                        Event::Modification { entry_mode, previous_entry_mode, .. }
                            if matches!(entry_mode, EntryMode::Blob | EntryMode::BlobExecutable)
                                && matches!(previous_entry_mode, EntryMode::Blob | EntryMode::BlobExecutable) =>
                        {
                            changes.push(FileChange {
                                path: location,
                                status: FileChangeStatus::Modified,
                                previous_path: None,
                            });
                        }
                        Event::Rewrite { entry_mode, source_location, .. }
                            if matches!(entry_mode, EntryMode::Blob | EntryMode::BlobExecutable) =>
                        {
                            changes.push(FileChange {
                                path: location,
                                status: FileChangeStatus::Renamed,
                                previous_path: Some(source_location.to_str_lossy().to_string()),
                            });
                        }
                        _ => {}
                    }
                    Ok::<_, std::convert::Infallible>(gix::object::tree::diff::Action::Continue)
                })
                .map_err(|e| GitError::Diff(e.to_string()))?;
        }
    }

    Ok(changes)
}

fn resolve_commit<'repo>(
    repo: &'repo gix::Repository,
    revspec: &str,
) -> Result<gix::Commit<'repo>, GitError> {
    repo.rev_parse_single(revspec)
        .map_err(|e| GitError::ResolveRef {
            reference: revspec.to_owned(),
            source: Box::new(e),
        })?
        .object()
        .map_err(|e| GitError::ResolveRef {
            reference: revspec.to_owned(),
            source: Box::new(e),
        })?
        .try_into_commit()
        .map_err(|e| GitError::ResolveRef {
            reference: revspec.to_owned(),
            source: Box::new(e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_change_status_serializes_lowercase() {
        let change = FileChange {
            path: "src/a.ts".to_owned(),
            status: FileChangeStatus::Renamed,
            previous_path: Some("src/old.ts".to_owned()),
        };
        let json = serde_json::to_string(&change).unwrap();
        assert!(json.contains("\"status\":\"renamed\""));
        assert!(json.contains("\"previous_path\":\"src/old.ts\""));
    }
}
