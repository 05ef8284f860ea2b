//! Per-invocation environment overlay
//!
//! Toolchain setup and phase assignments write into an [`Environment`]
//! instead of the process environment. Executors hand the overlay to every
//! spawned command, on top of whatever the kiln process itself inherited.

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Placeholder in phase assignments that expands to the package directory
pub const PKGDIR_PLACEHOLDER: &str = "{PKGDIR}";

/// Environment variables layered over the process environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Create a new empty overlay
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a variable from the overlay only
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set a variable, replacing any earlier value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Check if the overlay defines a variable
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Put `dir` at the front of PATH.
    ///
    /// The first call seeds from the process PATH so that system binaries
    /// stay reachable; later calls build on the overlay's own value.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory contains the path separator.
    pub fn prepend_path(&mut self, dir: &Path) -> Result<()> {
        let current: OsString = match self.vars.get("PATH") {
            Some(existing) => existing.into(),
            None => env::var_os("PATH").unwrap_or_default(),
        };

        let mut entries: Vec<PathBuf> = vec![dir.to_path_buf()];
        entries.extend(env::split_paths(&current).filter(|p| p != dir));

        let joined = env::join_paths(entries).map_err(|e| {
            Error::configuration(format!("Cannot add {} to PATH: {e}", dir.display()))
        })?;
        self.set("PATH", joined.to_string_lossy().into_owned());
        Ok(())
    }

    /// Apply `KEY=VALUE` assignments, expanding `{PKGDIR}` to `package_dir`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an assignment without `=` or with an
    /// empty key. Assignments before the bad one are kept.
    pub fn apply_assignments<S: AsRef<str>>(
        &mut self,
        assignments: &[S],
        package_dir: &Path,
    ) -> Result<()> {
        let pkgdir = package_dir.to_string_lossy();
        for raw in assignments {
            let (key, value) = parse_assignment(raw.as_ref())?;
            let value = value.replace(PKGDIR_PLACEHOLDER, &pkgdir);
            tracing::debug!(key = %key, "Applying phase environment assignment");
            self.set(key, value);
        }
        Ok(())
    }

    /// Number of variables in the overlay
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the overlay is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate over variables in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }
}

/// Split a `KEY=VALUE` assignment on its first `=`.
///
/// Values may themselves contain `=`.
///
/// # Errors
///
/// Returns a configuration error if there is no `=` or the key is empty.
pub fn parse_assignment(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw.split_once('=').ok_or_else(|| {
        Error::configuration_with_help(
            format!("Invalid environment assignment '{raw}'"),
            "Environment entries must have the form KEY=VALUE",
        )
    })?;

    let key = key.trim();
    if key.is_empty() {
        return Err(Error::configuration(format!(
            "Environment assignment '{raw}' has an empty name"
        )));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkgdir_substitution() {
        let mut env = Environment::new();
        env.apply_assignments(&["FOO={PKGDIR}/bin"], Path::new("/work/pkg"))
            .unwrap();
        assert_eq!(env.get("FOO"), Some("/work/pkg/bin"));
    }

    #[test]
    fn test_value_keeps_later_equals_signs() {
        let (key, value) = parse_assignment("JAVA_OPTS=-Dx=1 -Dy=2").unwrap();
        assert_eq!(key, "JAVA_OPTS");
        assert_eq!(value, "-Dx=1 -Dy=2");
    }

    #[test]
    fn test_empty_value_allowed() {
        let (key, value) = parse_assignment("EMPTY=").unwrap();
        assert_eq!(key, "EMPTY");
        assert_eq!(value, "");
    }

    #[test]
    fn test_invalid_assignments_rejected() {
        assert!(parse_assignment("NOEQUALS").is_err());
        assert!(parse_assignment("=value").is_err());
    }

    #[test]
    fn test_later_assignment_wins() {
        let mut env = Environment::new();
        env.set("GRADLE_USER_HOME", "/cache/gradle");
        env.apply_assignments(&["GRADLE_USER_HOME={PKGDIR}/.gradle"], Path::new("/src/app"))
            .unwrap();
        assert_eq!(env.get("GRADLE_USER_HOME"), Some("/src/app/.gradle"));
    }

    #[test]
    fn test_prepend_path_seeds_from_process() {
        temp_env::with_var("PATH", Some("/usr/bin:/bin"), || {
            let mut env = Environment::new();
            env.prepend_path(Path::new("/opt/gradle/bin")).unwrap();
            env.prepend_path(Path::new("/opt/maven/bin")).unwrap();
            assert_eq!(
                env.get("PATH"),
                Some("/opt/maven/bin:/opt/gradle/bin:/usr/bin:/bin")
            );
        });
    }

    #[test]
    fn test_prepend_path_does_not_duplicate() {
        temp_env::with_var("PATH", Some("/usr/bin"), || {
            let mut env = Environment::new();
            env.prepend_path(Path::new("/usr/bin")).unwrap();
            assert_eq!(env.get("PATH"), Some("/usr/bin"));
        });
    }
}
