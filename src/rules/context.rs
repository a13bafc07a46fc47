//! Runtime context that rule conditions and actions are evaluated against.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Directories never included in a snapshot.
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules", ".reqflow"];

/// Files larger than this are left out of a snapshot.
const MAX_SNAPSHOT_FILE_BYTES: u64 = 256 * 1024;

/// The bag a rule is evaluated against: a file-system snapshot, a package
/// config view, template variables, and optionally an error message.
///
/// Conditions read only from this value, which keeps evaluation
/// deterministic for a given context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleContext {
    /// Directory that `run-validation` commands execute in
    pub working_dir: PathBuf,

    /// Relative path (with `/` separators) to file content
    #[serde(default)]
    pub files: BTreeMap<String, String>,

    /// Parsed `package.json` or `Cargo.toml`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_config: Option<Value>,

    /// Values substituted into templates and commands
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Error message under triage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RuleContext {
    /// Create an empty context for a working directory.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self { working_dir: working_dir.into(), ..Self::default() }
    }

    /// Add a file to the snapshot.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(normalize_path(&path.into()), content.into());
        self
    }

    /// Set a template variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Set the package config view.
    #[must_use]
    pub fn with_package_config(mut self, config: Value) -> Self {
        self.package_config = Some(config);
        self
    }

    /// Set the error message.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Build a context from the files under `dir`.
    ///
    /// Skips VCS/build directories, non-UTF-8 files and files over 256 KiB.
    pub fn snapshot_dir(dir: &Path) -> anyhow::Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("Not a directory: {}", dir.display());
        }
        let mut ctx = Self::new(dir);

        let walker = WalkDir::new(dir).follow_links(false).into_iter().filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry.depth() > 0
                && entry.file_name().to_str().is_some_and(|name| SKIPPED_DIRS.contains(&name)))
        });

        for entry in walker.flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.metadata().map(|m| m.len() > MAX_SNAPSHOT_FILE_BYTES).unwrap_or(true) {
                tracing::debug!(path = ?entry.path(), "Skipping large file");
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(dir) else { continue };
            if let Ok(content) = std::fs::read_to_string(entry.path()) {
                let key = relative.to_string_lossy().replace('\\', "/");
                ctx.files.insert(key, content);
            }
        }

        ctx.refresh_package_config();
        tracing::debug!(dir = ?dir, files = ctx.files.len(), "Snapshot taken");
        Ok(ctx)
    }

    /// Derive `package_config` from `package.json` or `Cargo.toml` in the snapshot.
    pub fn refresh_package_config(&mut self) {
        if let Some(content) = self.files.get("package.json") {
            match serde_json::from_str::<Value>(content) {
                Ok(value) => {
                    self.package_config = Some(value);
                    return;
                }
                Err(e) => tracing::warn!(error = %e, "Ignoring unparsable package.json"),
            }
        }

        if let Some(content) = self.files.get("Cargo.toml") {
            match toml::from_str::<toml::Value>(content) {
                Ok(value) => self.package_config = serde_json::to_value(value).ok(),
                Err(e) => tracing::warn!(error = %e, "Ignoring unparsable Cargo.toml"),
            }
        }
    }

    /// Files whose path matches `pattern` (`*` matches everything, `*.ext` by suffix).
    pub fn matching_files<'a>(
        &'a self,
        pattern: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a String)> + 'a {
        self.files.iter().filter(move |(path, _)| path_matches(pattern, path))
    }

    /// Look up a dotted key (`scripts.test`) in the package config.
    pub fn package_value(&self, key: &str) -> Option<&Value> {
        key.split('.').try_fold(self.package_config.as_ref()?, |value, part| value.get(part))
    }

    /// Stable serialized view used for `context-match` conditions.
    pub fn serialized(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Write the snapshot into a fresh temporary directory and make it the
    /// working directory, so check commands see the files rules evaluated.
    ///
    /// The directory is removed when the returned guard drops. Paths that are
    /// absolute or climb out with `..` are skipped.
    pub fn materialize(&mut self) -> Result<TempDir> {
        let workspace = TempDir::new().map_err(|e| Error::io(std::env::temp_dir(), e))?;

        for (relative, content) in &self.files {
            let relative = Path::new(relative);
            if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
                tracing::warn!(path = ?relative, "Skipping snapshot file outside the workspace");
                continue;
            }
            let target = workspace.path().join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            std::fs::write(&target, content).map_err(|e| Error::io(&target, e))?;
        }

        tracing::debug!(dir = ?workspace.path(), files = self.files.len(), "Materialized snapshot");
        self.working_dir = workspace.path().to_path_buf();
        Ok(workspace)
    }
}

/// Match a snapshot path against a rule path pattern.
pub fn path_matches(pattern: &str, path: &str) -> bool {
    let pattern = normalize_path(pattern);
    match pattern.strip_prefix('*') {
        Some(suffix) => path.ends_with(suffix),
        None => path == pattern,
    }
}

fn normalize_path(path: &str) -> String {
    path.trim().trim_start_matches("./").replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_path_matches() {
        assert!(path_matches("src/main.rs", "src/main.rs"));
        assert!(path_matches("./src/main.rs", "src/main.rs"));
        assert!(path_matches("*.rs", "src/main.rs"));
        assert!(path_matches("*", "anything/at/all"));
        assert!(!path_matches("*.js", "src/main.rs"));
    }

    #[test]
    fn test_package_value_lookup() {
        let ctx = RuleContext::new(".")
            .with_package_config(json!({ "type": "module", "scripts": { "test": "vitest" } }));
        assert_eq!(ctx.package_value("type"), Some(&json!("module")));
        assert_eq!(ctx.package_value("scripts.test"), Some(&json!("vitest")));
        assert_eq!(ctx.package_value("scripts.build"), None);
    }

    #[test]
    fn test_serialized_is_stable() {
        let a = RuleContext::new("/w").with_variable("b", "2").with_variable("a", "1");
        let b = RuleContext::new("/w").with_variable("a", "1").with_variable("b", "2");
        assert_eq!(a.serialized(), b.serialized());
    }

    #[test]
    fn test_snapshot_dir_skips_build_dirs() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/x")).unwrap();
        std::fs::write(dir.path().join("src/index.js"), "export {}").unwrap();
        std::fs::write(dir.path().join("node_modules/x/index.js"), "module.exports = 1").unwrap();
        std::fs::write(dir.path().join("package.json"), r#"{"type":"module"}"#).unwrap();

        let ctx = RuleContext::snapshot_dir(dir.path()).unwrap();
        assert!(ctx.files.contains_key("src/index.js"));
        assert!(!ctx.files.keys().any(|k| k.starts_with("node_modules")));
        assert_eq!(ctx.package_value("type"), Some(&json!("module")));
    }

    #[test]
    fn test_cargo_toml_package_config() {
        let mut ctx = RuleContext::new(".")
            .with_file("Cargo.toml", "[package]\nname = \"demo\"\nedition = \"2021\"\n");
        ctx.refresh_package_config();
        assert_eq!(ctx.package_value("package.name"), Some(&json!("demo")));
    }

    #[test]
    fn test_materialize_writes_snapshot() {
        let mut ctx = RuleContext::new("/nonexistent")
            .with_file("Cargo.toml", "[package]\nname = \"demo\"\n")
            .with_file("src/lib.rs", "pub fn demo() {}\n")
            .with_file("../escape.txt", "nope");

        let workspace = ctx.materialize().unwrap();
        assert_eq!(ctx.working_dir, workspace.path());
        assert!(workspace.path().join("Cargo.toml").is_file());
        assert_eq!(
            std::fs::read_to_string(workspace.path().join("src/lib.rs")).unwrap(),
            "pub fn demo() {}\n"
        );
        assert!(!workspace.path().parent().unwrap().join("escape.txt").exists());

        let root = workspace.path().to_path_buf();
        drop(workspace);
        assert!(!root.exists());
    }
}
