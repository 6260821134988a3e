// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External archive extraction.
//!
//! Itinerant does not unpack archives itself. It hands each archive to an
//! external program, e.g., 7-Zip, and then treats the directory the program
//! filled up as just another source to scan. Whatever the program puts into
//! the output directory is taken as is.

use crate::{
    config::ArchiverSettings,
    scan::{walk, EntryKind, ScanError, ScanOptions},
};

use mkdirp::mkdirp;
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Command,
};
use tempfile::TempDir;
use tracing::{debug, info, instrument};

/// Driver of an external archive extraction program.
#[derive(Debug, Clone)]
pub struct Archiver {
    program: String,
    args: Vec<String>,
    patterns: Vec<glob::Pattern>,
}

impl Archiver {
    /// Construct new archiver.
    ///
    /// Arguments may hold `{archive}` and `{output}` placeholders. Patterns
    /// are matched against file names.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiveError::Pattern`] if any pattern is not a valid glob.
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
        patterns: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self> {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                glob::Pattern::new(pattern.as_ref()).map_err(|source| ArchiveError::Pattern {
                    source,
                    pattern: pattern.as_ref().into(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            patterns,
        })
    }

    /// Construct new archiver from settings file section.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiveError::Pattern`] if any pattern is not a valid glob.
    pub fn from_settings(settings: &ArchiverSettings) -> Result<Self> {
        Self::new(&settings.program, &settings.args, &settings.patterns)
    }

    /// Check if file name of path looks like an archive.
    pub fn is_archive(&self, path: impl AsRef<Path>) -> bool {
        let Some(name) = path.as_ref().file_name().and_then(OsStr::to_str) else {
            return false;
        };

        self.patterns.iter().any(|pattern| pattern.matches(name))
    }

    /// Find every archive beneath a directory, in path order.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiveError::Scan`] if directory cannot be walked.
    pub fn find_archives(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let mut archives = Vec::new();
        for entry in walk(dir, ScanOptions::default())? {
            let entry = entry?;
            if entry.kind == EntryKind::File && self.is_archive(&entry.path) {
                archives.push(entry.path);
            }
        }

        Ok(archives)
    }

    /// Unpack one archive into output directory.
    ///
    /// Output directory is created if it does not exist yet. Returns whatever
    /// the program printed.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiveError::CreateOutput`] if output cannot be created.
    /// - Return [`ArchiveError::Syscall`] if program cannot be run, or exits
    ///   with failure.
    #[instrument(skip(self, archive, output), level = "debug")]
    pub fn unpack(&self, archive: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<String> {
        let archive = archive.as_ref();
        let output = output.as_ref();
        mkdirp(output).map_err(|source| ArchiveError::CreateOutput {
            source,
            path: output.into(),
        })?;

        let archive_arg = archive.to_string_lossy();
        let output_arg = output.to_string_lossy();
        let args = self.args.iter().map(|arg| {
            arg.replace("{archive}", archive_arg.as_ref())
                .replace("{output}", output_arg.as_ref())
        });

        info!("unpack {:?} to {:?}", archive.display(), output.display());
        let message = syscall_non_interactive(&self.program, args)?;
        debug!("{message}");

        Ok(message)
    }

    /// Unpack every archive beneath a directory into one output directory.
    ///
    /// Later archives overwrite what earlier archives unpacked. Returns the
    /// archives that were unpacked.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiveError`] on first archive that fails to unpack.
    pub fn unpack_all(
        &self,
        dir: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<Vec<PathBuf>> {
        let archives = self.find_archives(dir)?;
        for archive in &archives {
            self.unpack(archive, output.as_ref())?;
        }

        Ok(archives)
    }

    /// Unpack every archive beneath a directory into a fresh temporary
    /// directory.
    ///
    /// The temporary directory is removed once the returned handle drops.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiveError`] if temporary directory cannot be created, or
    ///   any archive fails to unpack.
    pub fn unpack_to_temp(&self, dir: impl AsRef<Path>) -> Result<TempDir> {
        let temp = TempDir::new().map_err(|source| ArchiveError::CreateOutput {
            source,
            path: std::env::temp_dir(),
        })?;
        self.unpack_all(dir, temp.path())?;

        Ok(temp)
    }
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let output = Command::new(cmd.as_ref())
        .args(args)
        .output()
        .map_err(ArchiveError::Syscall)?;
    let mut message = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    message.push_str(String::from_utf8_lossy(output.stderr.as_slice()).as_ref());

    // INVARIANT: Chomp trailing newlines.
    let message = message.trim_end_matches(['\r', '\n']).to_owned();

    if !output.status.success() {
        return Err(ArchiveError::Syscall(std::io::Error::other(format!(
            "command {:?} failed ({}):\n{message}",
            cmd.as_ref(),
            output.status
        ))));
    }

    Ok(message)
}

/// Archive extraction error types.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Directory holding archives could not be walked.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Archive file name pattern is not a valid glob.
    #[error("invalid archive pattern {pattern:?}")]
    Pattern {
        #[source]
        source: glob::PatternError,
        pattern: String,
    },

    /// Extraction program could not be run, or failed.
    #[error(transparent)]
    Syscall(std::io::Error),

    /// Output directory could not be created.
    #[error("failed to create output directory {:?}", path.display())]
    CreateOutput {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;
