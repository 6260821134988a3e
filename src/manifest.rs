// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Source directory manifests.
//!
//! A __manifest__ is a snapshot of one source directory: the directory itself,
//! called the __root__, and the set of file and directory paths found beneath
//! it, recorded relative to that root.
//!
//! # Identity
//!
//! Two manifests are equal if and only if their relative path sets are equal.
//! The root and the timestamps take no part in equality. So two manifests that
//! scanned different roots, but happened to find the same relative paths, are
//! the same manifest as far as [`PartialEq`] is concerned. Keep this in mind
//! when deduplicating manifests across sources: provenance is lost. The
//! [`MatchRule`] type lets an itinerary opt into root-based identity instead.
//!
//! # Set Algebra
//!
//! Manifests are additive. Re-scanning a source and folding the result into
//! an existing manifest through [`Manifest::combine`] never forgets paths that
//! were seen before, even if they vanished from disk. Paths only ever leave a
//! manifest through [`Manifest::subtract`].

use crate::{
    path::{absolute, normalize_relative, resolve},
    scan::{scan, ScanOptions},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
    ops::{Add, Sub},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Snapshot of a source directory and the paths beneath it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    root: PathBuf,

    #[serde(deserialize_with = "deserialize_paths")]
    paths_relative: BTreeSet<String>,

    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,

    #[serde(default = "Utc::now", alias = "timestamp")]
    last_edit: DateTime<Utc>,
}

impl Manifest {
    /// Construct new manifest from a known set of relative paths.
    ///
    /// Each path is normalized into forward-slash form. Empty paths and paths
    /// that are not plainly relative are dropped.
    pub fn new(
        root: impl Into<PathBuf>,
        paths: impl IntoIterator<Item = impl AsRef<Path>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            root: root.into(),
            paths_relative: paths.into_iter().filter_map(normalize_relative).collect(),
            created_at: now,
            last_edit: now,
        }
    }

    /// Construct new manifest by scanning a source directory.
    ///
    /// Symbolic links are not followed.
    ///
    /// # Errors
    ///
    /// - Return [`ScanError`](crate::scan::ScanError) if `root` cannot be scanned.
    pub fn from_scan(root: impl AsRef<Path>) -> Result<Self> {
        Self::from_scan_with(root, ScanOptions::default())
    }

    /// Construct new manifest by scanning a source directory with options.
    ///
    /// # Errors
    ///
    /// - Return [`ScanError`](crate::scan::ScanError) if `root` cannot be scanned.
    #[instrument(skip(root), level = "debug")]
    pub fn from_scan_with(root: impl AsRef<Path>, options: ScanOptions) -> Result<Self> {
        let root = absolute(root);
        let paths_relative = scan(&root, options)?;
        debug!("manifest of {:?} holds {} paths", root.display(), paths_relative.len());
        let now = Utc::now();

        Ok(Self {
            root,
            paths_relative,
            created_at: now,
            last_edit: now,
        })
    }

    /// Everything in `target` that is not in `source`.
    ///
    /// Scans both directories, and subtracts the source manifest from the
    /// target manifest. The result is rooted at `target`.
    ///
    /// # Errors
    ///
    /// - Return [`ScanError`](crate::scan::ScanError) if either directory
    ///   cannot be scanned.
    pub fn target_minus_source(
        source: impl AsRef<Path>,
        target: impl AsRef<Path>,
        options: ScanOptions,
    ) -> Result<Self> {
        let source = Self::from_scan_with(source, options)?;
        let target = Self::from_scan_with(target, options)?;

        Ok(target.subtract(&source))
    }

    /// Union of two manifests.
    ///
    /// The result is rooted at the root of `self`, and is stamped with the
    /// current time.
    pub fn combine(&self, other: &Manifest) -> Self {
        Self {
            root: self.root.clone(),
            paths_relative: self
                .paths_relative
                .union(&other.paths_relative)
                .cloned()
                .collect(),
            created_at: self.created_at,
            last_edit: Utc::now(),
        }
    }

    /// Difference of two manifests.
    ///
    /// The result is rooted at the root of `self`, and is stamped with the
    /// current time.
    pub fn subtract(&self, other: &Manifest) -> Self {
        Self {
            root: self.root.clone(),
            paths_relative: self
                .paths_relative
                .difference(&other.paths_relative)
                .cloned()
                .collect(),
            created_at: self.created_at,
            last_edit: Utc::now(),
        }
    }

    /// Every recorded path joined onto the root.
    pub fn paths_resolved(&self) -> BTreeSet<PathBuf> {
        self.paths_relative
            .iter()
            .map(|relative| resolve(&self.root, relative))
            .collect()
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub fn paths_relative(&self) -> &BTreeSet<String> {
        &self.paths_relative
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_edit(&self) -> DateTime<Utc> {
        self.last_edit
    }

    /// Number of recorded paths.
    pub fn len(&self) -> usize {
        self.paths_relative.len()
    }

    /// Manifest records no paths.
    pub fn is_empty(&self) -> bool {
        self.paths_relative.is_empty()
    }

    /// Check if relative path is recorded.
    pub fn contains(&self, relative: &str) -> bool {
        self.paths_relative.contains(relative)
    }

    /// Compare by path set content alone. Same as `==`.
    pub fn same_content(&self, other: &Manifest) -> bool {
        self.paths_relative == other.paths_relative
    }

    /// Compare by root alone.
    pub fn same_root(&self, other: &Manifest) -> bool {
        self.root == other.root
    }
}

impl PartialEq for Manifest {
    fn eq(&self, other: &Self) -> bool {
        self.same_content(other)
    }
}

impl Eq for Manifest {}

impl Add for &Manifest {
    type Output = Manifest;

    fn add(self, other: &Manifest) -> Manifest {
        self.combine(other)
    }
}

impl Sub for &Manifest {
    type Output = Manifest;

    fn sub(self, other: &Manifest) -> Manifest {
        self.subtract(other)
    }
}

impl Display for Manifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "Manifest({})", self.root.display())
    }
}

/// Rule deciding when two manifests count as the same source.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// Same relative path set, regardless of root.
    #[default]
    Content,

    /// Same root, regardless of relative path set.
    Root,
}

impl MatchRule {
    /// Check if two manifests count as the same source under this rule.
    pub fn matches(&self, lhs: &Manifest, rhs: &Manifest) -> bool {
        match self {
            Self::Content => lhs.same_content(rhs),
            Self::Root => lhs.same_root(rhs),
        }
    }
}

fn deserialize_paths<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let paths = Vec::<String>::deserialize(deserializer)?;
    Ok(paths.into_iter().filter_map(normalize_relative).collect())
}

/// Friendly result alias :3
pub type Result<T, E = crate::scan::ScanError> = std::result::Result<T, E>;
