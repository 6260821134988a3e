// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine default locations for the itinerary store and settings file, and
//! normalize the relative paths that manifests record so that they compare
//! and serialize the same way on every platform.

use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Determine default absolute path to the itinerary store file.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/itinerant/itineraries.json`.
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if data directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_store_path() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join("itinerant").join("itineraries.json"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to the settings file.
///
/// Uses `$XDG_CONFIG_HOME/itinerant/config.toml`. Does not check if the path
/// returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
pub fn default_settings_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("itinerant").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Normalize a relative path into forward-slash form.
///
/// Current directory components are dropped. Returns [`None`] for the empty
/// path, and for anything that is not a plain relative path, i.e., paths with
/// a root, a prefix, or a parent directory component.
pub fn normalize_relative(path: impl AsRef<Path>) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => continue,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                warn!("reject non-relative path {:?}", path.as_ref().display());
                return None;
            }
        }
    }

    if parts.is_empty() {
        return None;
    }

    Some(parts.join("/"))
}

/// Join a normalized relative path onto a root directory.
///
/// Splits on forward slashes so the result uses the native separator.
pub fn resolve(root: impl AsRef<Path>, relative: &str) -> PathBuf {
    let mut path = root.as_ref().to_path_buf();
    path.extend(relative.split('/').filter(|part| !part.is_empty()));
    path
}

/// Make path absolute and lexically normal without touching the file system.
///
/// Trailing separators and current directory components are dropped, and
/// parent directory components cancel the component before them. So every
/// spelling of the same directory maps to the same path. Symbolic links are
/// not resolved, so `link/..` is taken literally. Falls back to the path as
/// given if the current directory cannot be determined.
pub fn absolute(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    let mut normal = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => continue,
            Component::ParentDir => match normal.components().next_back() {
                Some(Component::Normal(_)) => {
                    normal.pop();
                }
                // INVARIANT: Nothing climbs above the root.
                Some(Component::RootDir) | Some(Component::Prefix(_)) => continue,
                _ => normal.push(component.as_os_str()),
            },
            other => normal.push(other.as_os_str()),
        }
    }

    normal
}

/// Key identifying the itinerary of a target directory in the store.
///
/// Any spelling of the same directory yields the same key.
pub fn store_key(target: impl AsRef<Path>) -> String {
    absolute(target).to_string_lossy().into_owned()
}

/// No way to determine user's data or configuration directory.
///
/// # See Also
///
/// - [`dirs::data_dir`](https://docs.rs/dirs/latest/dirs/fn.data_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's data directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case("a.txt", Some("a.txt"); "plain file")]
    #[test_case("sub/c.txt", Some("sub/c.txt"); "nested file")]
    #[test_case("./sub//c.txt", Some("sub/c.txt"); "redundant components")]
    #[test_case("", None; "empty path")]
    #[test_case(".", None; "current directory")]
    #[test_case("../escape", None; "parent component")]
    #[test_case("/etc/passwd", None; "absolute path")]
    #[test]
    fn normalize_relative_paths(input: &str, expect: Option<&str>) {
        pretty_assertions::assert_eq!(normalize_relative(input), expect.map(str::to_owned));
    }

    #[cfg(unix)]
    #[test_case("/mnt/t", "/mnt/t"; "already normal")]
    #[test_case("/mnt/t/", "/mnt/t"; "trailing separator")]
    #[test_case("/mnt/./t", "/mnt/t"; "current directory component")]
    #[test_case("/mnt/x/../t", "/mnt/t"; "parent directory component")]
    #[test_case("/mnt/x/y/../../t/", "/mnt/t"; "stacked parent components")]
    #[test_case("/..", "/"; "parent of root")]
    #[test]
    fn absolute_is_lexically_normal(input: &str, expect: &str) {
        pretty_assertions::assert_eq!(absolute(input), PathBuf::from(expect));
        pretty_assertions::assert_eq!(store_key(input), expect);
    }

    #[test]
    fn absolute_makes_relative_paths_absolute() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        assert_eq!(absolute("sub/./dir/"), cwd.join("sub").join("dir"));
        assert_eq!(store_key("sub/"), store_key("sub"));

        Ok(())
    }

    #[test]
    fn resolve_relative_onto_root() {
        let result = resolve("/tmp/root", "sub/c.txt");
        let expect = Path::new("/tmp/root").join("sub").join("c.txt");
        assert_eq!(result, expect);
    }
}
