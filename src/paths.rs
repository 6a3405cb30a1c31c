//! Local-over-global directory lookup.
//!
//! Every configuration artifact (descriptions, queries, trees, policies) is
//! addressed by a path relative to a configuration root. Two roots are
//! consulted: the project-local one (default `./.devprivops/`) shadows the
//! global one (default `/etc/devprivops/`).

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

/// Default project-local root.
pub const LOCAL_DIR: &str = "./.devprivops";
/// Default system-wide root.
pub const GLOBAL_DIR: &str = "/etc/devprivops";

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("\"{relative}\" not found in {local} or {global}")]
    #[diagnostic(
        code(devprivops::paths::not_found),
        help("Create the file under the local directory, or pass --local-dir / --global-dir.")
    )]
    NotFound {
        relative: String,
        local: String,
        global: String,
    },

    #[error("failed to read directory: {path}")]
    #[diagnostic(
        code(devprivops::paths::read_dir),
        help("Check that the directory is readable.")
    )]
    ReadDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// The pair of configuration roots.
#[derive(Debug, Clone)]
pub struct ConfigRoots {
    /// Project-local root, consulted first.
    pub local: PathBuf,
    /// System-wide root, consulted when the local one lacks a file.
    pub global: PathBuf,
}

impl Default for ConfigRoots {
    fn default() -> Self {
        Self::new(LOCAL_DIR, GLOBAL_DIR)
    }
}

impl ConfigRoots {
    pub fn new(local: impl Into<PathBuf>, global: impl Into<PathBuf>) -> Self {
        Self {
            local: local.into(),
            global: global.into(),
        }
    }

    /// Locate `relative` in the local root, falling back to the global root.
    pub fn file(&self, relative: &str) -> PathResult<PathBuf> {
        let local = self.local.join(relative);
        if local.exists() {
            return Ok(local);
        }
        let global = self.global.join(relative);
        if global.exists() {
            return Ok(global);
        }
        Err(PathError::NotFound {
            relative: relative.to_string(),
            local: local.display().to_string(),
            global: global.display().to_string(),
        })
    }

    /// Like [`file`](Self::file) but `None` when neither root has it.
    pub fn optional_file(&self, relative: &str) -> Option<PathBuf> {
        self.file(relative).ok()
    }

    /// Files under `dir` in either root, as sorted `dir/name` paths.
    ///
    /// A name present in both roots is listed once. A missing directory
    /// contributes nothing.
    pub fn entries(&self, dir: &str) -> PathResult<Vec<String>> {
        self.collect(dir, |ft| !ft.is_dir())
            .map(|names| names.into_iter().map(|n| format!("{dir}/{n}")).collect())
    }

    /// Sub-directory names under `dir` in either root, sorted.
    pub fn subdirs(&self, dir: &str) -> PathResult<Vec<String>> {
        self.collect(dir, |ft| ft.is_dir())
    }

    fn collect(
        &self,
        dir: &str,
        keep: impl Fn(&std::fs::FileType) -> bool,
    ) -> PathResult<Vec<String>> {
        let mut names = BTreeSet::new();
        for root in [&self.local, &self.global] {
            list_dir(&root.join(dir), &keep, &mut names)?;
        }
        Ok(names.into_iter().collect())
    }
}

fn list_dir(
    path: &Path,
    keep: &impl Fn(&std::fs::FileType) -> bool,
    names: &mut BTreeSet<String>,
) -> PathResult<()> {
    let read_err = |source| PathError::ReadDir {
        path: path.display().to_string(),
        source,
    };
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(read_err(e)),
    };
    for entry in entries {
        let entry = entry.map_err(read_err)?;
        let file_type = entry.file_type().map_err(read_err)?;
        if !keep(&file_type) {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            names.insert(name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots() -> (tempfile::TempDir, ConfigRoots) {
        let tmp = tempfile::TempDir::new().unwrap();
        let roots = ConfigRoots::new(tmp.path().join("local"), tmp.path().join("global"));
        std::fs::create_dir_all(roots.local.join("descriptions")).unwrap();
        std::fs::create_dir_all(roots.global.join("descriptions")).unwrap();
        (tmp, roots)
    }

    #[test]
    fn local_file_shadows_global() {
        let (_tmp, roots) = roots();
        std::fs::write(roots.local.join("uris.yml"), "[]").unwrap();
        std::fs::write(roots.global.join("uris.yml"), "[]").unwrap();
        assert_eq!(roots.file("uris.yml").unwrap(), roots.local.join("uris.yml"));
    }

    #[test]
    fn falls_back_to_global() {
        let (_tmp, roots) = roots();
        std::fs::write(roots.global.join("uris.yml"), "[]").unwrap();
        assert_eq!(roots.file("uris.yml").unwrap(), roots.global.join("uris.yml"));
    }

    #[test]
    fn missing_file_names_both_candidates() {
        let (_tmp, roots) = roots();
        let err = roots.file("nope.rq").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nope.rq"));
        assert!(msg.contains("local"));
        assert!(msg.contains("global"));
        assert!(roots.optional_file("nope.rq").is_none());
    }

    #[test]
    fn entries_are_merged_sorted_and_deduplicated() {
        let (_tmp, roots) = roots();
        std::fs::write(roots.local.join("descriptions/b.yml"), "").unwrap();
        std::fs::write(roots.local.join("descriptions/a.yml"), "").unwrap();
        std::fs::write(roots.global.join("descriptions/a.yml"), "").unwrap();
        std::fs::write(roots.global.join("descriptions/c.yml"), "").unwrap();
        std::fs::create_dir(roots.global.join("descriptions/nested")).unwrap();

        assert_eq!(
            roots.entries("descriptions").unwrap(),
            vec!["descriptions/a.yml", "descriptions/b.yml", "descriptions/c.yml"]
        );
    }

    #[test]
    fn missing_directory_yields_nothing() {
        let (_tmp, roots) = roots();
        assert!(roots.entries("reasoner").unwrap().is_empty());
        assert!(roots.subdirs("regulations").unwrap().is_empty());
    }

    #[test]
    fn subdirs_lists_only_directories() {
        let (_tmp, roots) = roots();
        std::fs::create_dir_all(roots.local.join("regulations/gdpr")).unwrap();
        std::fs::create_dir_all(roots.global.join("regulations/ccpa")).unwrap();
        std::fs::write(roots.global.join("regulations/README"), "").unwrap();
        assert_eq!(roots.subdirs("regulations").unwrap(), vec!["ccpa", "gdpr"]);
    }
}
