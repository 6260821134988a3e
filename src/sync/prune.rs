// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Empty directory pruning.
//!
//! Pruning works on a [`DirTree`] snapshot of the target taken before anything
//! is removed. Directories are visited in post-order, so every child has been
//! decided before its parent is looked at. A directory is removed if and only
//! if it directly holds no files, and every one of its subdirectories was
//! removed before it. The decision for a parent is derived from the decisions
//! made for its children during this same pass, never from a fresh look at
//! the file system.
//!
//! The target directory itself is never removed.

use crate::{
    path::resolve,
    scan::DirTree,
    sync::{
        report::{FileOpKind, FileOpResult},
        SyncError,
    },
};

use indicatif::ProgressBar;
use std::{collections::HashSet, fs, path::Path};
use tracing::{debug, error, warn};

/// Prune empty directories beneath target.
///
/// Returns the report, plus the error that stopped pruning early if
/// `ignore_errors` is off. A missing target has nothing to prune.
pub(crate) fn prune_empty_dirs(
    target: &Path,
    ignore_errors: bool,
    progress: &ProgressBar,
) -> (FileOpResult, Option<SyncError>) {
    let mut result = FileOpResult::new(FileOpKind::PruneEmptyDirectories, target, target);
    if !target.exists() {
        debug!("target {:?} does not exist, nothing to prune", target.display());
        return (result.finish(), None);
    }

    let tree = match DirTree::snapshot(target) {
        Ok(tree) => tree,
        Err(error) => return (result.finish(), Some(error.into())),
    };
    progress.set_length(tree.len() as u64);

    let mut removed: HashSet<&str> = HashSet::new();
    let mut failure = None;
    for relative in tree.post_order() {
        progress.inc(1);
        result.process(relative);

        let Some(node) = tree.get(relative) else {
            continue;
        };
        let has_surviving_children = node
            .children
            .iter()
            .any(|child| !removed.contains(child.as_str()));
        if node.has_files || has_surviving_children {
            debug!("keep non-empty directory {relative:?}");
            result.skip(relative);
            continue;
        }

        let path = resolve(target, relative);
        match fs::remove_dir(&path) {
            Ok(()) => {
                debug!("remove empty directory {:?}", path.display());
                removed.insert(relative);
                result.succeed(relative);
            }
            Err(source) => {
                let error = SyncError::Prune { source, path };
                result.fail(relative, error.to_string());
                if !ignore_errors {
                    error!("{error}");
                    failure = Some(error);
                    break;
                }
                warn!("{error}");
            }
        }
    }

    (result.finish(), failure)
}
