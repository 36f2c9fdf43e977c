//! Destructive directory preparation.
//!
//! `reset_directory` deletes a directory tree and recreates it empty. It
//! refuses filesystem roots, paths with `..`, anything that is or contains a
//! protected directory, and anything matching a protected glob. The literal
//! leading directories of a glob count as protected directories. Protected
//! directories are compared both as written and with symlinks resolved.

use crate::domain::{JobIdentity, SimbatchError, SimbatchResult};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ProtectedPaths {
    dirs: Vec<PathBuf>,
    glob_prefixes: Vec<PathBuf>,
    globs: GlobSet,
}

fn is_glob_pattern(entry: &str) -> bool {
    entry.contains(['*', '?', '[', '{'])
}

fn has_normal_component(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, Component::Normal(_)))
}

/// `/lustre/cbm/prod/**` -> `/lustre/cbm/prod`. `None` when the pattern
/// starts with a wildcard.
fn glob_literal_prefix(pattern: &str) -> Option<PathBuf> {
    let prefix: PathBuf = Path::new(pattern)
        .components()
        .take_while(|component| !is_glob_pattern(&component.as_os_str().to_string_lossy()))
        .collect();
    has_normal_component(&prefix).then_some(prefix)
}

impl ProtectedPaths {
    pub fn new<I, S>(entries: I) -> SimbatchResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut dirs = Vec::new();
        let mut glob_prefixes = Vec::new();
        let mut builder = GlobSetBuilder::new();
        for entry in entries {
            let entry = entry.as_ref();
            if is_glob_pattern(entry) {
                let glob = Glob::new(entry).map_err(|source| {
                    SimbatchError::input_validation(
                        "INPUT.PROTECTED_PATH",
                        format!("invalid protected path pattern '{}': {}", entry, source),
                    )
                })?;
                builder.add(glob);
                glob_prefixes.extend(glob_literal_prefix(entry));
            } else {
                dirs.push(PathBuf::from(entry));
            }
        }
        let globs = builder.build().map_err(|source| {
            SimbatchError::input_validation(
                "INPUT.PROTECTED_PATH",
                format!("failed to compile protected path patterns: {}", source),
            )
        })?;
        Ok(Self {
            dirs,
            glob_prefixes,
            globs,
        })
    }

    pub fn none() -> Self {
        Self {
            dirs: Vec::new(),
            glob_prefixes: Vec::new(),
            globs: GlobSet::empty(),
        }
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dirs.push(dir.into());
        self
    }

    /// Fails with `IO.PATH_COLLISION` if `path` must not be deleted.
    pub fn check(&self, path: &Path) -> SimbatchResult<()> {
        if path
            .components()
            .any(|component| matches!(component, Component::ParentDir))
        {
            return Err(SimbatchError::path_collision(path, "path contains '..'"));
        }
        if !has_normal_component(path) {
            return Err(SimbatchError::path_collision(path, "path is a filesystem root"));
        }

        let canonical = fs::canonicalize(path).ok();
        let candidates: Vec<&Path> = std::iter::once(path).chain(canonical.as_deref()).collect();

        for dir in self.dirs.iter().chain(&self.glob_prefixes) {
            let resolved = fs::canonicalize(dir).ok();
            let covered = std::iter::once(dir.as_path())
                .chain(resolved.as_deref())
                .any(|form| candidates.iter().any(|candidate| form.starts_with(candidate)));
            if covered {
                return Err(SimbatchError::path_collision(
                    path,
                    format!("it is or contains protected directory '{}'", dir.display()),
                ));
            }
        }
        if candidates
            .iter()
            .any(|candidate| self.globs.is_match(candidate))
        {
            return Err(SimbatchError::path_collision(
                path,
                "it matches a protected path pattern",
            ));
        }
        Ok(())
    }
}

/// Deletes `path` if present and recreates it empty.
pub fn reset_directory(path: &Path, protected: &ProtectedPaths) -> SimbatchResult<()> {
    protected.check(path)?;

    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => {
            warn!(path = %path.display(), "removing existing directory");
            fs::remove_dir_all(path).map_err(|source| {
                SimbatchError::io_system(
                    "IO.WORKSPACE_REMOVE",
                    format!("failed to remove '{}': {}", path.display(), source),
                )
            })?;
        }
        Ok(_) => {
            return Err(SimbatchError::path_collision(
                path,
                "it exists and is not a directory",
            ));
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(SimbatchError::io_system(
                "IO.WORKSPACE_STAT",
                format!("failed to inspect '{}': {}", path.display(), source),
            ));
        }
    }

    ensure_directory(path)
}

/// Creates `path` (and parents) without touching existing contents.
pub fn ensure_directory(path: &Path) -> SimbatchResult<()> {
    fs::create_dir_all(path).map_err(|source| {
        SimbatchError::io_system(
            "IO.WORKSPACE_CREATE",
            format!("failed to create '{}': {}", path.display(), source),
        )
    })?;
    debug!(path = %path.display(), "directory ready");
    Ok(())
}

/// The job-exclusive working directory every stage process runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    path: PathBuf,
    identity: JobIdentity,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identity(&self) -> &JobIdentity {
        &self.identity
    }
}

/// Resets `<root>/<job_id>_<task_id>` and returns it as the job's workspace.
pub fn prepare_job_workspace(
    root: &Path,
    identity: &JobIdentity,
    protected: &ProtectedPaths,
) -> SimbatchResult<Workspace> {
    let path = root.join(identity.workspace_name());
    if path.file_name().and_then(|name| name.to_str()) != Some(identity.workspace_name().as_str()) {
        return Err(SimbatchError::path_collision(
            &path,
            "workspace name must be <job id>_<task id>",
        ));
    }
    reset_directory(&path, protected)?;
    Ok(Workspace {
        path,
        identity: identity.clone(),
    })
}
