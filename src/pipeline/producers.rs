//! Built-in phase producers.
//!
//! Thin and deterministic: the functional producer breaks a markdown
//! requirement into list items, and every later producer derives its
//! section structurally from its inputs.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::phases::{PhaseInput, PhaseProducer};
use crate::document::SectionName;

/// Words that mark a requirement as non-functional.
const NON_FUNCTIONAL_KEYWORDS: &[&str] = &[
    "performance",
    "latency",
    "throughput",
    "security",
    "secure",
    "availability",
    "uptime",
    "scalab",
    "reliab",
];

/// Producer for one section, backed by a plain function.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinProducer {
    section: SectionName,
}

impl BuiltinProducer {
    pub fn new(section: SectionName) -> Self {
        Self { section }
    }
}

#[async_trait]
impl PhaseProducer for BuiltinProducer {
    fn name(&self) -> &str {
        match self.section {
            SectionName::Functional => "builtin/functional",
            SectionName::Technical => "builtin/technical",
            SectionName::Architecture => "builtin/architecture",
            SectionName::Testing => "builtin/testing",
            SectionName::Implementation => "builtin/implementation",
            SectionName::Review => "builtin/review",
            SectionName::Documentation => "builtin/documentation",
            SectionName::Deployment => "builtin/deployment",
        }
    }

    async fn produce(&self, input: &PhaseInput) -> anyhow::Result<Value> {
        match self.section {
            SectionName::Functional => {
                let text = input.requirement.as_deref().context("no requirement text supplied")?;
                functional(text)
            }
            SectionName::Technical => Ok(technical(input)),
            SectionName::Architecture => Ok(architecture(input)),
            SectionName::Testing => Ok(testing(input)),
            SectionName::Implementation => Ok(implementation(input)),
            SectionName::Review => Ok(review(input)),
            SectionName::Documentation => Ok(documentation(input)),
            SectionName::Deployment => Ok(deployment(input)),
        }
    }
}

/// One built-in producer per section.
pub fn default_producers() -> BTreeMap<SectionName, Arc<dyn PhaseProducer>> {
    SectionName::ALL
        .into_iter()
        .map(|s| (s, Arc::new(BuiltinProducer::new(s)) as Arc<dyn PhaseProducer>))
        .collect()
}

/// Break a markdown requirement into list items grouped under their headings.
pub fn functional(markdown: &str) -> anyhow::Result<Value> {
    let mut heading = String::from("General");
    let mut requirements = Vec::new();

    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            let title = trimmed.trim_start_matches('#').trim();
            if !title.is_empty() {
                heading = title.to_string();
            }
            continue;
        }

        let Some(item) = parse_list_item(trimmed) else { continue };
        let item = item.trim();
        if item.is_empty() {
            continue;
        }

        let id = format!("FR-{:03}", requirements.len() + 1);
        requirements.push(json!({
            "id": id,
            "text": item,
            "type": classify(item),
            "section": heading,
        }));
    }

    if requirements.is_empty() {
        bail!("requirement contains no list items");
    }

    Ok(json!({ "requirements": requirements }))
}

fn classify(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if NON_FUNCTIONAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
        "non-functional"
    } else {
        "functional"
    }
}

fn technical(input: &PhaseInput) -> Value {
    let specifications: Vec<Value> = input
        .items(SectionName::Functional, "requirements")
        .iter()
        .enumerate()
        .map(|(i, req)| {
            let text = str_field(req, "text");
            json!({
                "id": format!("SPEC-{:03}", i + 1),
                "requirement": req.get("id").and_then(Value::as_str).unwrap_or(text),
                "title": text,
                "kind": str_field(req, "type"),
                "acceptance": [format!("The system satisfies: {text}")],
            })
        })
        .collect();

    json!({ "specifications": specifications })
}

/// Requirements grouped by heading, in first-appearance order.
fn grouped_requirements(input: &PhaseInput) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();

    for req in input.items(SectionName::Functional, "requirements") {
        let name = match slugify(str_field(req, "section")) {
            slug if slug.is_empty() => "core".to_string(),
            slug => slug,
        };
        let text = str_field(req, "text").to_string();
        match groups.iter_mut().find(|(n, _)| *n == name) {
            Some((_, texts)) => texts.push(text),
            None => groups.push((name, vec![text])),
        }
    }

    groups
}

fn architecture(input: &PhaseInput) -> Value {
    let groups = grouped_requirements(input);
    let root = groups.first().map(|(name, _)| name.clone());
    let spec_count = input.items(SectionName::Technical, "specifications").len();

    let components: Vec<Value> = groups
        .iter()
        .map(|(name, responsibilities)| {
            let depends_on: Vec<&String> = root.iter().filter(|r| *r != name).collect();
            json!({
                "name": name,
                "responsibilities": responsibilities,
                "dependsOn": depends_on,
            })
        })
        .collect();

    json!({ "components": components, "specificationCount": spec_count })
}

fn components(input: &PhaseInput) -> Vec<(String, Vec<String>)> {
    input
        .items(SectionName::Architecture, "components")
        .iter()
        .map(|c| {
            let responsibilities = c
                .get("responsibilities")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            (str_field(c, "name").to_string(), responsibilities)
        })
        .collect()
}

fn testing(input: &PhaseInput) -> Value {
    let mut test_cases = Vec::new();

    for (name, responsibilities) in components(input) {
        for responsibility in responsibilities {
            let id = format!("TC-{:03}", test_cases.len() + 1);
            test_cases.push(json!({
                "id": id,
                "target": name,
                "description": format!("verifies that {}", lowercase_first(&responsibility)),
            }));
        }
    }

    json!({ "testCases": test_cases })
}

fn implementation(input: &PhaseInput) -> Value {
    let package = slugify(&input.project.name);
    let components = components(input);
    let test_cases = input.items(SectionName::Testing, "testCases");

    let mut files = vec![json!({
        "path": "package.json",
        "content": format!(
            "{{\n  \"name\": \"{package}\",\n  \"version\": \"0.1.0\",\n  \"private\": true,\n  \"type\": \"module\"\n}}\n"
        ),
    })];

    let mut index = String::new();
    for (name, responsibilities) in &components {
        let ident = identifier(name);
        let mut source = format!("// {name} component\n");
        for responsibility in responsibilities {
            source.push_str(&format!("// - {responsibility}\n"));
        }
        source.push_str(&format!("export function {ident}() {{\n  return '{name}';\n}}\n"));
        files.push(json!({ "path": format!("src/{name}.js"), "content": source }));
        index.push_str(&format!("export {{ {ident} }} from './{name}.js';\n"));

        let mut test = format!("import {{ {ident} }} from '../src/{name}.js';\n\n");
        for case in test_cases.iter().filter(|c| str_field(c, "target") == name.as_str()) {
            test.push_str(&format!(
                "// {}: {}\nconsole.assert({ident}() === '{name}');\n",
                str_field(case, "id"),
                str_field(case, "description")
            ));
        }
        files.push(json!({ "path": format!("test/{name}.test.js"), "content": test }));
    }
    files.push(json!({ "path": "src/index.js", "content": index }));

    json!({ "files": files })
}

fn review(input: &PhaseInput) -> Value {
    let files = input.items(SectionName::Implementation, "files");
    let mut findings = Vec::new();

    for file in files {
        let path = str_field(file, "path");
        if str_field(file, "content").trim().is_empty() {
            findings.push(json!({ "severity": "HIGH", "message": "file is empty", "file": path }));
        }
        if path.starts_with("src/") && path != "src/index.js" {
            let test_path = path.replacen("src/", "test/", 1).replace(".js", ".test.js");
            if !files.iter().any(|f| str_field(f, "path") == test_path) {
                findings.push(json!({
                    "severity": "MEDIUM",
                    "message": "source file has no matching test",
                    "file": path,
                }));
            }
        }
    }

    let approved = !findings
        .iter()
        .any(|f| matches!(str_field(f, "severity"), "CRITICAL" | "HIGH"));

    json!({ "findings": findings, "approved": approved })
}

fn documentation(input: &PhaseInput) -> Value {
    let mut readme = format!("# {}\n\n## Requirements\n\n", input.project.name);
    for req in input.items(SectionName::Functional, "requirements") {
        readme.push_str(&format!("- {} ({})\n", str_field(req, "text"), str_field(req, "type")));
    }

    let mut architecture = String::from("# Architecture\n\n");
    for (name, responsibilities) in components(input) {
        architecture.push_str(&format!("## {name}\n\n"));
        for responsibility in responsibilities {
            architecture.push_str(&format!("- {responsibility}\n"));
        }
        architecture.push('\n');
    }

    let file_list: String = input
        .items(SectionName::Implementation, "files")
        .iter()
        .map(|f| format!("- `{}`\n", str_field(f, "path")))
        .collect();

    json!({
        "documents": [
            { "title": "README", "content": readme },
            { "title": "Architecture", "content": architecture },
            { "title": "Files", "content": format!("# Files\n\n{file_list}") },
        ]
    })
}

fn deployment(input: &PhaseInput) -> Value {
    let name = slugify(&input.project.name);
    let approved = input
        .section(SectionName::Review)
        .and_then(|r| r.get("approved"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let file_count = input.items(SectionName::Implementation, "files").len();

    let dockerfile = format!(
        "FROM node:20-alpine\nLABEL org.opencontainers.image.title=\"{name}\"\nWORKDIR /app\nCOPY . .\nCMD [\"node\", \"src/index.js\"]\n"
    );
    let manifest = json!({
        "name": name,
        "files": file_count,
        "approved": approved,
        "entrypoint": "src/index.js",
    });

    json!({
        "manifests": [
            { "name": "Dockerfile", "content": dockerfile },
            { "name": "deploy.json", "content": format!("{manifest:#}\n") },
        ]
    })
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn parse_list_item(line: &str) -> Option<&str> {
    let item = if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        rest
    } else if line.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        line.split_once(". ")?.1
    } else {
        return None;
    };
    Some(item.trim_start_matches("[ ] ").trim_start_matches("[x] "))
}

fn slugify(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// camelCase identifier from a slug.
fn identifier(slug: &str) -> String {
    let mut ident = String::new();
    for (i, part) in slug.split('-').filter(|p| !p.is_empty()).enumerate() {
        if i == 0 {
            ident.push_str(part);
        } else {
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                ident.extend(first.to_uppercase());
                ident.push_str(chars.as_str());
            }
        }
    }
    if ident.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
