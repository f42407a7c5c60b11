//! Version-control seam for change detection

use mend_core::{ChangeKind, MendError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Operations change detection needs from a version-control system.
pub trait VcsBackend: Send + Sync + std::fmt::Debug {
    /// Current revision marker (HEAD commit id).
    fn current_commit(&self) -> Result<String>;

    /// Paths changed between `since` and the current revision.
    fn changed_since(&self, since: &str) -> Result<Vec<(PathBuf, ChangeKind)>>;

    /// Every file tracked at the current revision.
    fn tracked_files(&self) -> Result<Vec<PathBuf>>;

    /// Repository working-directory root.
    fn root_path(&self) -> &Path;
}

/// Git backend implemented on the gix crate.
///
/// Wrapped in `Arc<Mutex<>>` because `gix::Repository` is not `Sync`.
#[derive(Debug)]
pub struct GitBackend {
    repo: Arc<Mutex<gix::Repository>>,
    root_path: PathBuf,
}

impl GitBackend {
    /// Discover and open the repository containing `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let repo = gix::discover(path)
            .map_err(|e| MendError::Vcs(format!("Failed to open git repository: {}", e)))?;

        let root_path = repo
            .work_dir()
            .ok_or_else(|| MendError::Vcs("Repository has no working directory".to_string()))?
            .to_path_buf();

        debug!("Opened git repository at: {}", root_path.display());

        Ok(Self {
            repo: Arc::new(Mutex::new(repo)),
            root_path,
        })
    }

    fn head_commit_id(&self) -> Result<gix::ObjectId> {
        let repo = self.repo.lock().unwrap();
        let mut head = repo
            .head()
            .map_err(|e| MendError::Vcs(format!("Failed to get HEAD: {}", e)))?;

        let commit = head
            .peel_to_commit_in_place()
            .map_err(|e| MendError::Vcs(format!("Failed to peel HEAD to commit: {}", e)))?;

        Ok(commit.id)
    }

    fn resolve_commit(&self, rev: &str) -> Result<gix::ObjectId> {
        let repo = self.repo.lock().unwrap();
        let object = repo
            .rev_parse_single(rev.as_bytes())
            .map_err(|e| MendError::Vcs(format!("Failed to parse '{}': {}", rev, e)))?;

        Ok(object.detach())
    }
}

impl VcsBackend for GitBackend {
    fn current_commit(&self) -> Result<String> {
        let commit_id = self.head_commit_id()?;
        debug!("Current commit: {}", commit_id);
        Ok(commit_id.to_string())
    }

    fn changed_since(&self, since: &str) -> Result<Vec<(PathBuf, ChangeKind)>> {
        debug!("Diffing files since: {}", since);

        let since_id = self.resolve_commit(since)?;
        let head_id = self.head_commit_id()?;

        let repo = self.repo.lock().unwrap();

        let since_tree = repo
            .find_object(since_id)
            .map_err(|e| MendError::Vcs(format!("Failed to find commit: {}", e)))?
            .peel_to_tree()
            .map_err(|e| MendError::Vcs(format!("Failed to peel to tree: {}", e)))?;

        let head_tree = repo
            .find_object(head_id)
            .map_err(|e| MendError::Vcs(format!("Failed to find HEAD commit: {}", e)))?
            .peel_to_tree()
            .map_err(|e| MendError::Vcs(format!("Failed to peel HEAD to tree: {}", e)))?;

        let mut changed = Vec::new();

        // Diff old -> new so additions are files new at HEAD
        since_tree
            .changes()
            .map_err(|e| MendError::Vcs(format!("Failed to create tree diff: {}", e)))?
            .for_each_to_obtain_tree(&head_tree, |change| {
                use gix::object::tree::diff::change::Event;

                let path_str = std::str::from_utf8(change.location).unwrap_or("");
                if !path_str.is_empty() {
                    let kind = match change.event {
                        Event::Addition { .. } => ChangeKind::Added,
                        Event::Deletion { .. } => ChangeKind::Deleted,
                        _ => ChangeKind::Modified,
                    };
                    changed.push((PathBuf::from(path_str), kind));
                }
                Ok::<_, std::io::Error>(Default::default())
            })
            .map_err(|e| MendError::Vcs(format!("Failed to diff trees: {}", e)))?;

        debug!("Found {} changed files", changed.len());
        Ok(changed)
    }

    fn tracked_files(&self) -> Result<Vec<PathBuf>> {
        let head_id = self.head_commit_id()?;

        let repo = self.repo.lock().unwrap();
        let tree = repo
            .find_object(head_id)
            .map_err(|e| MendError::Vcs(format!("Failed to find HEAD: {}", e)))?
            .peel_to_tree()
            .map_err(|e| MendError::Vcs(format!("Failed to peel to tree: {}", e)))?;

        let mut recorder = gix::traverse::tree::Recorder::default();
        tree.traverse()
            .breadthfirst(&mut recorder)
            .map_err(|e| MendError::Vcs(format!("Failed to traverse tree: {}", e)))?;

        let mut files = Vec::new();
        for entry in recorder.records {
            if entry.mode.is_blob() {
                if let Ok(path_str) = std::str::from_utf8(entry.filepath.as_slice()) {
                    files.push(PathBuf::from(path_str));
                }
            }
        }

        debug!("Found {} tracked files", files.len());
        Ok(files)
    }

    fn root_path(&self) -> &Path {
        &self.root_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_outside_repository_fails() {
        let dir = tempdir().unwrap();
        let result = GitBackend::open(dir.path());
        assert!(matches!(result, Err(MendError::Vcs(_))));
    }
}
