//! Workspace confinement for built-in file tools.

use std::path::{Component, Path, PathBuf};

use crate::{AppError, Result};

/// Resolve `candidate` against `workspace_root`, refusing anything outside it.
///
/// Relative candidates are joined onto the root; absolute candidates must
/// already lie beneath it. `..` is applied lexically, then the deepest
/// existing ancestor is canonicalized so a symlink anywhere on the path
/// cannot lead out of the workspace, even when the final file does not
/// exist yet.
///
/// # Errors
///
/// Returns `AppError::PathViolation` when the root cannot be canonicalized
/// or the candidate (lexically or through a symlink) leaves the root.
pub fn resolve_in_workspace(workspace_root: &Path, candidate: impl AsRef<Path>) -> Result<PathBuf> {
    let root = workspace_root
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("workspace root invalid: {err}")))?;
    let candidate = candidate.as_ref();

    let lexical = normalize(&root.join(candidate)).ok_or_else(|| {
        AppError::PathViolation(format!(
            "{} climbs above the filesystem root",
            candidate.display()
        ))
    })?;
    if !lexical.starts_with(&root) {
        return Err(AppError::PathViolation(format!(
            "{} is outside the workspace",
            candidate.display()
        )));
    }

    let (existing, rest) = split_existing(&lexical);
    let mut resolved = existing.canonicalize().map_err(|err| {
        AppError::PathViolation(format!("cannot resolve {}: {err}", existing.display()))
    })?;
    if !rest.as_os_str().is_empty() {
        resolved.push(rest);
    }

    if !resolved.starts_with(&root) {
        return Err(AppError::PathViolation(format!(
            "symlink in {} escapes the workspace",
            candidate.display()
        )));
    }
    Ok(resolved)
}

/// Apply `.` and `..` lexically. `None` if `..` pops past the root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

/// Split `path` into its deepest existing ancestor and the remainder.
fn split_existing(path: &Path) -> (&Path, PathBuf) {
    let mut existing = path;
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => break,
        }
    }
    (existing, missing.iter().rev().collect())
}
