//! Change detection with VCS-diff and modification-time fallbacks

use crate::vcs::{GitBackend, VcsBackend};
use mend_core::{ChangeKind, ChangeRecord, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tracing::{debug, info, warn};

/// Domain nouns used for feature tagging, canonical forms only
const FEATURE_VOCABULARY: &[&str] = &[
    "orders",
    "picking",
    "packing",
    "inventory",
    "shipping",
    "receiving",
    "returns",
    "auth",
    "reporting",
    "billing",
    "customers",
    "products",
];

/// Directories never scanned by the mtime fallback
const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "dist", "build", "vendor"];

/// Paths that churn without affecting test behavior
const DEFAULT_IGNORE_GLOBS: &[&str] = &["*.lock", "*.log", "*.tmp", "*.min.js"];

/// Persisted `{ lastRevisionMarker }` cache
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ChangeCache {
    last_revision_marker: Option<String>,
}

/// Detects changed source paths since the previous run.
///
/// Prefers a version-control diff between the last-seen revision marker
/// and the current one; without a repository it compares a persisted
/// path -> modification-time map against the filesystem.
pub struct ChangeDetector {
    root: PathBuf,
    cache_path: PathBuf,
    mtime_path: PathBuf,
    vcs: Option<Box<dyn VcsBackend>>,
    ignore: Vec<glob::Pattern>,
}

impl ChangeDetector {
    /// Create a detector rooted at `root`, auto-discovering a git
    /// repository when one is present.
    pub fn new(
        root: impl Into<PathBuf>,
        cache_path: impl Into<PathBuf>,
        mtime_path: impl Into<PathBuf>,
    ) -> Self {
        let root = root.into();
        let vcs: Option<Box<dyn VcsBackend>> = match GitBackend::open(&root) {
            Ok(backend) => Some(Box::new(backend)),
            Err(e) => {
                debug!("No VCS backend ({}); using mtime fallback", e);
                None
            }
        };

        Self {
            root,
            cache_path: cache_path.into(),
            mtime_path: mtime_path.into(),
            vcs,
            ignore: DEFAULT_IGNORE_GLOBS
                .iter()
                .filter_map(|g| glob::Pattern::new(g).ok())
                .collect(),
        }
    }

    /// Replace the VCS backend (or force the mtime fallback with `None`).
    pub fn with_backend(mut self, backend: Option<Box<dyn VcsBackend>>) -> Self {
        self.vcs = backend;
        self
    }

    /// Detect and classify every path changed since the last run.
    ///
    /// Empty iff the current revision marker equals the stored one. The
    /// stored marker (or the mtime map) is refreshed afterward, so a
    /// repeated call without intervening changes is a no-op.
    pub async fn detect_changes(&self) -> Result<Vec<ChangeRecord>> {
        let raw = match self.vcs {
            Some(ref vcs) => match self.detect_via_vcs(vcs.as_ref()).await? {
                Some(changes) => changes,
                None => return Ok(Vec::new()),
            },
            None => self.detect_via_mtimes().await?,
        };

        let mut records = Vec::with_capacity(raw.len());
        for (path, kind) in raw {
            if self.is_ignored(&path) {
                continue;
            }
            records.push(self.classify(path, kind).await);
        }

        info!("Detected {} changed files", records.len());
        Ok(records)
    }

    /// `None` means the revision marker is unchanged.
    async fn detect_via_vcs(
        &self,
        vcs: &dyn VcsBackend,
    ) -> Result<Option<Vec<(PathBuf, ChangeKind)>>> {
        let current = vcs.current_commit()?;
        let cache = self.read_change_cache().await;

        if cache.last_revision_marker.as_deref() == Some(current.as_str()) {
            debug!("Revision marker {} unchanged; no changes", current);
            return Ok(None);
        }

        let changes = match cache.last_revision_marker {
            Some(ref marker) => match vcs.changed_since(marker) {
                Ok(changes) => changes,
                Err(e) => {
                    // The stored marker may have been garbage-collected
                    warn!(
                        "Diff against stored marker {} failed ({}); treating all tracked files as changed",
                        marker, e
                    );
                    all_tracked_as_added(vcs)?
                }
            },
            None => {
                debug!("No stored revision marker; treating all tracked files as changed");
                all_tracked_as_added(vcs)?
            }
        };

        self.write_change_cache(&ChangeCache {
            last_revision_marker: Some(current),
        })
        .await?;

        Ok(Some(changes))
    }

    async fn detect_via_mtimes(&self) -> Result<Vec<(PathBuf, ChangeKind)>> {
        let stored: HashMap<String, u64> = match fs::read_to_string(&self.mtime_path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => HashMap::new(),
        };

        let mut current: HashMap<String, u64> = HashMap::new();
        let mut changes = Vec::new();

        for path in walk_files(&self.root) {
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let key = relative.to_string_lossy().replace('\\', "/");

            let mtime = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);

            match stored.get(&key) {
                None => changes.push((relative.to_path_buf(), ChangeKind::Added)),
                Some(&old) if mtime > old => {
                    changes.push((relative.to_path_buf(), ChangeKind::Modified));
                }
                Some(_) => {}
            }

            current.insert(key, mtime);
        }

        for key in stored.keys() {
            if !current.contains_key(key) {
                changes.push((PathBuf::from(key), ChangeKind::Deleted));
            }
        }

        if let Some(parent) = self.mtime_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.mtime_path, serde_json::to_string_pretty(&current)?).await?;

        Ok(changes)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.ignore.iter().any(|p| p.matches(&name))
    }

    async fn classify(&self, path: PathBuf, kind: ChangeKind) -> ChangeRecord {
        let language = language_for(&path);

        let content = if kind == ChangeKind::Deleted {
            None
        } else {
            fs::read_to_string(self.root.join(&path)).await.ok()
        };
        let feature_tags = feature_tags(&path, content.as_deref());

        let mut record = ChangeRecord::new(path, kind);
        record.language = language;
        record.feature_tags = feature_tags;
        record
    }

    async fn read_change_cache(&self) -> ChangeCache {
        match fs::read_to_string(&self.cache_path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => ChangeCache::default(),
        }
    }

    async fn write_change_cache(&self, cache: &ChangeCache) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.cache_path, serde_json::to_string_pretty(cache)?).await?;
        Ok(())
    }
}

fn all_tracked_as_added(vcs: &dyn VcsBackend) -> Result<Vec<(PathBuf, ChangeKind)>> {
    Ok(vcs
        .tracked_files()?
        .into_iter()
        .map(|path| (path, ChangeKind::Added))
        .collect())
}

/// Recursively collect files under `root`, skipping hidden and build
/// directories.
fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if path.is_dir() {
                if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref()) {
                    continue;
                }
                pending.push(path);
            } else if !name.starts_with('.') {
                files.push(path);
            }
        }
    }

    files
}

/// Language tag from the file extension (fixed lookup)
fn language_for(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_lowercase();

    let language = match extension.as_str() {
        "rs" => "rust",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" => "javascript",
        "py" => "python",
        "go" => "go",
        "java" => "java",
        "rb" => "ruby",
        "sql" => "sql",
        "html" => "html",
        "css" | "scss" => "css",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "md" => "markdown",
        _ => return None,
    };

    Some(language.to_string())
}

/// Feature tags from path segments and a content keyword scan.
///
/// Heuristic, not guaranteed complete: a vocabulary term matches a path
/// segment exactly, by containment, or as a prefix of the term for stems
/// of at least four characters (`pick` -> `picking`).
fn feature_tags(path: &Path, content: Option<&str>) -> Vec<String> {
    let segments: Vec<String> = path
        .iter()
        .flat_map(|part| {
            part.to_string_lossy()
                .to_lowercase()
                .split(['.', '_', '-'])
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|s| !s.is_empty())
        .collect();

    let content_lower = content.map(str::to_lowercase);

    let mut tags = Vec::new();
    for term in FEATURE_VOCABULARY {
        let path_hit = segments.iter().any(|segment| {
            segment.contains(term) || (segment.len() >= 4 && term.starts_with(segment.as_str()))
        });
        let content_hit = content_lower
            .as_deref()
            .is_some_and(|content| content.contains(term));

        if path_hit || content_hit {
            tags.push(term.to_string());
        }
    }

    tags
}
