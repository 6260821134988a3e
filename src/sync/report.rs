// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Synchronization reports.
//!
//! Every synchronizer call produces one [`FileOpResult`]: which operation ran,
//! where, when it finished, and what happened to each path it touched. A path
//! that was processed lands in exactly one of the outcome sets: succeeded,
//! folders created, failed, or skipped. Results are built up by the
//! synchronizer while it works, and are read-only once handed out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// Kind of synchronization operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOpKind {
    /// Copy source paths into target.
    Copy,

    /// Delete tracked files from target.
    Delete,

    /// Remove directories left empty in target.
    PruneEmptyDirectories,
}

impl Display for FileOpKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Copy => fmt.write_str("copy"),
            Self::Delete => fmt.write_str("delete"),
            Self::PruneEmptyDirectories => fmt.write_str("prune"),
        }
    }
}

/// Report of one synchronization operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOpResult {
    kind: FileOpKind,
    root: PathBuf,
    target: PathBuf,
    completed_at: DateTime<Utc>,

    #[serde(default)]
    processed: BTreeSet<String>,

    #[serde(default)]
    succeeded: BTreeSet<String>,

    #[serde(default)]
    folders_created: BTreeSet<String>,

    #[serde(default)]
    failed: BTreeMap<String, String>,

    #[serde(default)]
    skipped: BTreeSet<String>,
}

impl FileOpResult {
    pub(crate) fn new(
        kind: FileOpKind,
        root: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kind,
            root: root.into(),
            target: target.into(),
            completed_at: Utc::now(),
            processed: BTreeSet::new(),
            succeeded: BTreeSet::new(),
            folders_created: BTreeSet::new(),
            failed: BTreeMap::new(),
            skipped: BTreeSet::new(),
        }
    }

    pub(crate) fn process(&mut self, relative: &str) {
        self.processed.insert(relative.to_owned());
    }

    pub(crate) fn succeed(&mut self, relative: &str) {
        self.succeeded.insert(relative.to_owned());
    }

    pub(crate) fn create_folder(&mut self, relative: &str) {
        self.folders_created.insert(relative.to_owned());
    }

    pub(crate) fn fail(&mut self, relative: &str, reason: impl Into<String>) {
        self.failed.insert(relative.to_owned(), reason.into());
    }

    pub(crate) fn skip(&mut self, relative: &str) {
        self.skipped.insert(relative.to_owned());
    }

    /// Stamp completion time.
    pub(crate) fn finish(mut self) -> Self {
        self.completed_at = Utc::now();
        self
    }

    pub fn kind(&self) -> FileOpKind {
        self.kind
    }

    /// Source root for copies, target for everything else.
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub fn target(&self) -> &Path {
        self.target.as_path()
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    pub fn processed(&self) -> &BTreeSet<String> {
        &self.processed
    }

    /// Files copied or deleted, or directories pruned.
    pub fn succeeded(&self) -> &BTreeSet<String> {
        &self.succeeded
    }

    /// Directories that copying had to create.
    pub fn folders_created(&self) -> &BTreeSet<String> {
        &self.folders_created
    }

    /// Failed paths mapped to the reason they failed.
    pub fn failed(&self) -> &BTreeMap<String, String> {
        &self.failed
    }

    /// Paths left alone: already absent, already present, or not empty.
    pub fn skipped(&self) -> &BTreeSet<String> {
        &self.skipped
    }

    /// Operation finished without any failed path.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Display for FileOpResult {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "{} {} -> {}: processed {}, succeeded {}, created {} folders, failed {}, skipped {}",
            self.kind,
            self.root.display(),
            self.target.display(),
            self.processed.len(),
            self.succeeded.len(),
            self.folders_created.len(),
            self.failed.len(),
            self.skipped.len(),
        )
    }
}
