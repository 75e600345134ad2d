//! Path confinement for editor tool calls.
//!
//! Every path the model supplies is resolved against a fixed set of root
//! directories before any filesystem access. Resolution is lexical first
//! (no symlink following, `..` handled by component popping), then backed
//! by a real-path check against the canonicalized roots for operations
//! that create files.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub struct PathSandbox {
    roots: Vec<PathBuf>,
    canonical_roots: Vec<PathBuf>,
    /// Bare filename → known full path, for models that reply with just a
    /// file name after seeing it in context.
    hints: HashMap<String, PathBuf>,
}

impl PathSandbox {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        let roots: Vec<PathBuf> = roots
            .into_iter()
            .filter_map(|root| normalize_lexical(&root))
            .collect();
        // Roots usually exist; fall back to the lexical form when they don't.
        let canonical_roots = roots
            .iter()
            .map(|root| fs::canonicalize(root).unwrap_or_else(|_| root.clone()))
            .collect();
        Self {
            roots,
            canonical_roots,
            hints: HashMap::new(),
        }
    }

    pub fn with_hints(mut self, hints: HashMap<String, PathBuf>) -> Self {
        self.hints = hints;
        self
    }

    pub fn add_hint(&mut self, name: impl Into<String>, path: PathBuf) {
        self.hints.insert(name.into(), path);
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Resolve a model-supplied path to an absolute path inside one of the
    /// roots, or reject it. Relative paths are tried against each root in
    /// order; a bare filename is first looked up in the hint table.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::PathRejected {
                path: raw.to_string(),
                reason: "empty path".to_string(),
            });
        }

        let path = Path::new(trimmed);

        if let Some(hinted) = self.hint_for(path) {
            return self.contain(trimmed, hinted);
        }

        if path.is_absolute() {
            let normalized = normalize_lexical(path).ok_or_else(|| Error::PathRejected {
                path: trimmed.to_string(),
                reason: "path escapes via '..'".to_string(),
            })?;
            return self.contain(trimmed, normalized);
        }

        for root in &self.roots {
            let joined = root.join(path);
            if let Some(normalized) = normalize_lexical(&joined) {
                if self.is_contained(&normalized) {
                    return Ok(normalized);
                }
            }
        }

        Err(Error::PathRejected {
            path: trimmed.to_string(),
            reason: "outside allowed roots".to_string(),
        })
    }

    /// Re-check a resolved path against the real filesystem. The nearest
    /// existing ancestor is canonicalized so a symlink planted inside a root
    /// cannot redirect a create outside it.
    pub fn verify_real_path(&self, path: &Path) -> Result<()> {
        let mut probe = path;
        let real = loop {
            match fs::canonicalize(probe) {
                Ok(real) => break real,
                Err(_) => match probe.parent() {
                    Some(parent) => probe = parent,
                    None => {
                        return Err(Error::PathRejected {
                            path: path.display().to_string(),
                            reason: "no existing ancestor".to_string(),
                        })
                    }
                },
            }
        };

        if self
            .canonical_roots
            .iter()
            .any(|root| real.starts_with(root))
        {
            Ok(())
        } else {
            Err(Error::PathRejected {
                path: path.display().to_string(),
                reason: "resolves outside allowed roots".to_string(),
            })
        }
    }

    fn hint_for(&self, path: &Path) -> Option<PathBuf> {
        let mut components = path.components();
        let only = match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => name.to_str()?,
            _ => return None,
        };
        self.hints.get(only).cloned()
    }

    fn contain(&self, raw: &str, candidate: PathBuf) -> Result<PathBuf> {
        if self.is_contained(&candidate) {
            Ok(candidate)
        } else {
            Err(Error::PathRejected {
                path: raw.to_string(),
                reason: "outside allowed roots".to_string(),
            })
        }
    }

    fn is_contained(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| path.starts_with(root))
    }
}

/// Component-wise normalization: `.` is dropped, `..` pops the previous
/// normal component and fails when there is nothing left to pop. Symlinks
/// are not consulted.
fn normalize_lexical(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::Normal(name) => out.push(name),
            Component::ParentDir => {
                if !matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    return None;
                }
                out.pop();
            }
        }
    }
    Some(out)
}
