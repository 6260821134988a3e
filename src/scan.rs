// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Directory scanning.
//!
//! Walk a directory tree and report every entry beneath it relative to the
//! root of the walk. The root itself is never reported. Entries are produced
//! lazily through [`walk`], so callers that only need to stream over a large
//! tree do not have to hold the whole path set in memory. [`scan`] collects
//! the walk into a sorted set for manifests.
//!
//! # Symbolic Links
//!
//! Symbolic links are not followed by default. When following is enabled
//! a link that points back at one of its own ancestors would make the walk
//! endless, so it is reported as [`ScanError::CyclicPath`] instead.

use crate::path::normalize_relative;

use ignore::{Walk, WalkBuilder};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Options that steer a directory walk.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Follow symbolic links into the directories they point to.
    pub follow_links: bool,
}

/// Kind of entry found during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// Single entry found beneath the root of a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// Path relative to walk root in forward-slash form.
    pub relative: String,

    /// Absolute path of entry.
    pub path: PathBuf,

    /// What the entry is.
    pub kind: EntryKind,
}

/// Lazy walk over a directory tree.
pub struct ScanIter {
    root: PathBuf,
    inner: Walk,
}

impl Iterator for ScanIter {
    type Item = Result<ScanEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(error) => return Some(Err(classify(self.root.clone(), error))),
            };

            // INVARIANT: Never report the root of the walk itself.
            if entry.depth() == 0 {
                continue;
            }

            let relative = match entry.path().strip_prefix(&self.root) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            let Some(relative) = normalize_relative(relative) else {
                continue;
            };

            let kind = match entry.file_type() {
                Some(file_type) if file_type.is_dir() => EntryKind::Directory,
                Some(file_type) if file_type.is_symlink() => EntryKind::Symlink,
                _ => EntryKind::File,
            };

            return Some(Ok(ScanEntry {
                relative,
                path: entry.path().to_path_buf(),
                kind,
            }));
        }
    }
}

/// Start a lazy walk over every entry beneath `root`.
///
/// # Errors
///
/// - Return [`ScanError::MissingRoot`] if `root` does not exist.
/// - Return [`ScanError::NotADirectory`] if `root` is not a directory.
pub fn walk(root: impl AsRef<Path>, options: ScanOptions) -> Result<ScanIter> {
    let root = root.as_ref();
    match root.metadata() {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(ScanError::NotADirectory { root: root.into() }),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(ScanError::MissingRoot { root: root.into() })
        }
        Err(error) => {
            return Err(ScanError::Read {
                path: root.into(),
                source: error,
            })
        }
    }

    // INVARIANT: Report everything, hidden files and ignored files included.
    let inner = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(options.follow_links)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    Ok(ScanIter {
        root: root.to_path_buf(),
        inner,
    })
}

/// Collect every path beneath `root` relative to `root`.
///
/// # Errors
///
/// - Return [`ScanError`] if `root` cannot be walked in full.
#[instrument(skip(root), level = "debug")]
pub fn scan(root: impl AsRef<Path>, options: ScanOptions) -> Result<BTreeSet<String>> {
    let paths = walk(root.as_ref(), options)?
        .map(|entry| entry.map(|entry| entry.relative))
        .collect::<Result<BTreeSet<_>>>()?;
    debug!("scanned {} paths under {:?}", paths.len(), root.as_ref().display());

    Ok(paths)
}

/// Snapshot of the directory structure beneath a root.
///
/// Records, for every directory (the root included under the empty key),
/// whether it directly holds anything that is not a directory, and which
/// subdirectories it holds. Symbolic links are never followed, so a link to a
/// directory counts as a non-directory entry.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirTree {
    nodes: BTreeMap<String, DirNode>,
}

/// Single directory in a [`DirTree`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirNode {
    /// Directory directly holds files, symbolic links, or other non-directories.
    pub has_files: bool,

    /// Relative paths of direct subdirectories.
    pub children: Vec<String>,
}

impl DirTree {
    /// Take snapshot of directory structure beneath `root`.
    ///
    /// # Errors
    ///
    /// - Return [`ScanError`] if `root` cannot be walked in full.
    pub fn snapshot(root: impl AsRef<Path>) -> Result<Self> {
        let mut nodes = BTreeMap::new();
        nodes.insert(String::new(), DirNode::default());

        for entry in walk(root, ScanOptions::default())? {
            let entry = entry?;
            let parent = match entry.relative.rsplit_once('/') {
                Some((parent, _)) => parent.to_owned(),
                None => String::new(),
            };

            if entry.kind == EntryKind::Directory {
                nodes.entry(entry.relative.clone()).or_default();
                nodes
                    .entry(parent)
                    .or_default()
                    .children
                    .push(entry.relative);
            } else {
                nodes.entry(parent).or_default().has_files = true;
            }
        }

        Ok(Self { nodes })
    }

    /// Look up directory node by relative path. The root is the empty string.
    pub fn get(&self, relative: &str) -> Option<&DirNode> {
        self.nodes.get(relative)
    }

    /// Number of directories beneath the root.
    pub fn len(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    /// No directories beneath the root.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Relative paths of directories in post-order, children before parents.
    ///
    /// The root itself is not included.
    pub fn post_order(&self) -> Vec<&str> {
        let mut order = Vec::with_capacity(self.len());
        let mut stack: Vec<(&str, bool)> = vec![("", false)];

        while let Some((relative, expanded)) = stack.pop() {
            if expanded {
                if !relative.is_empty() {
                    order.push(relative);
                }
                continue;
            }

            stack.push((relative, true));
            if let Some(node) = self.nodes.get(relative) {
                for child in node.children.iter().rev() {
                    stack.push((child.as_str(), false));
                }
            }
        }

        order
    }
}

fn classify(path: PathBuf, error: ignore::Error) -> ScanError {
    match error {
        ignore::Error::Loop { ancestor, child } => ScanError::CyclicPath { ancestor, child },
        ignore::Error::WithPath { path, err } => classify(path, *err),
        ignore::Error::WithDepth { err, .. } => classify(path, *err),
        ignore::Error::WithLineNumber { err, .. } => classify(path, *err),
        ignore::Error::Io(source) => ScanError::Read { path, source },
        ignore::Error::Partial(mut errors) if !errors.is_empty() => {
            classify(path, errors.remove(0))
        }
        other => ScanError::Walk {
            path,
            message: other.to_string(),
        },
    }
}

/// Directory scanning error types.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Root of walk does not exist.
    #[error("scan root {:?} does not exist", root.display())]
    MissingRoot { root: PathBuf },

    /// Root of walk exists, but is not a directory.
    #[error("scan root {:?} is not a directory", root.display())]
    NotADirectory { root: PathBuf },

    /// Entry could not be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Symbolic link points back at one of its own ancestors.
    #[error("symbolic link {:?} loops back to {:?}", child.display(), ancestor.display())]
    CyclicPath { ancestor: PathBuf, child: PathBuf },

    /// Walk failed for some other reason.
    #[error("failed to walk {:?}: {message}", path.display())]
    Walk { path: PathBuf, message: String },
}

/// Friendly result alias :3
pub type Result<T, E = ScanError> = std::result::Result<T, E>;
