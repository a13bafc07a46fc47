//! Named templates for `use-template` actions.

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([\w.-]+)\s*\}\}").expect("placeholder pattern is valid"));

const README: &str = r#"# {{ project }}

Generated during the {{ phase }} phase.

## Usage

See `docs/` for the full requirement breakdown.
"#;

const DOCKERFILE: &str = r#"FROM debian:bookworm-slim
LABEL org.opencontainers.image.title="{{ project }}"
WORKDIR /app
COPY . .
CMD ["./{{ project }}"]
"#;

const RUST_MODULE: &str = r#"//! {{ module }} module for {{ project }}.

pub fn init() {}
"#;

const ESM_MODULE: &str = r#"// {{ module }} module for {{ project }}
export function init() {}
"#;

/// Result of rendering a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub content: String,

    /// Placeholders with no matching variable, left as-is in `content`
    pub unresolved: Vec<String>,
}

/// Registry of named templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, String>,
}

impl TemplateRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the templates shipped with the binary.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.insert("readme", README);
        registry.insert("dockerfile", DOCKERFILE);
        registry.insert("rust-module", RUST_MODULE);
        registry.insert("esm-module", ESM_MODULE);
        registry
    }

    /// Add or replace a template.
    pub fn insert(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.templates.insert(name.into(), body.into());
    }

    /// Load every `*.tmpl` file in `dir`, keyed by file stem.
    pub fn load_dir(&mut self, dir: &Path) -> anyhow::Result<usize> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)?.filter_map(Result::ok) {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "tmpl") {
                let Some(name) = path.file_stem().and_then(|n| n.to_str()) else { continue };
                self.insert(name, std::fs::read_to_string(&path)?);
                loaded += 1;
            }
        }
        tracing::debug!(dir = ?dir, loaded, "Loaded templates");
        Ok(loaded)
    }

    /// Whether a template is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Template names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Render `name` with `variables`, or `None` if it is not registered.
    pub fn render(&self, name: &str, variables: &BTreeMap<String, String>) -> Option<Rendered> {
        self.templates.get(name).map(|body| interpolate(body, variables))
    }
}

/// Substitute `{{ var }}` placeholders.
pub fn interpolate(template: &str, variables: &BTreeMap<String, String>) -> Rendered {
    let mut unresolved = Vec::new();

    let content = PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            let var_name = &caps[1];
            variables.get(var_name).cloned().unwrap_or_else(|| {
                if !unresolved.iter().any(|u| u == var_name) {
                    unresolved.push(var_name.to_string());
                }
                caps[0].to_string()
            })
        })
        .to_string();

    Rendered { content, unresolved }
}
