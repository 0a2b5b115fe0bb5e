use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

const DEFAULT_GENERATOR: &str = include_str!("default_prompts/generator.md");
const DEFAULT_REVIEWER: &str = include_str!("default_prompts/reviewer.md");
const DEFAULT_FIXER: &str = include_str!("default_prompts/fixer.md");

/// Known template variable names for validation.
const KNOWN_VARIABLES: &[&str] = &["source_text", "chart", "issues"];

fn default_template(role: &str) -> Option<&'static str> {
    match role {
        "generator" => Some(DEFAULT_GENERATOR),
        "reviewer" => Some(DEFAULT_REVIEWER),
        "fixer" => Some(DEFAULT_FIXER),
        _ => None,
    }
}

fn template_filename(role: &str) -> String {
    format!("{role}.md")
}

/// Prompt template engine with default templates and user overrides.
pub struct PromptEngine {
    override_dir: Option<String>,
}

impl PromptEngine {
    pub fn new(override_dir: Option<String>) -> Self {
        Self { override_dir }
    }

    /// Load a prompt template for the given agent role.
    /// User overrides in `override_dir` take precedence over defaults.
    pub fn load_template(&self, role: &str) -> Result<String> {
        // Check for user override first
        if let Some(ref dir) = self.override_dir {
            let path = Path::new(dir).join(template_filename(role));
            if path.exists() {
                return std::fs::read_to_string(&path).map_err(|e| {
                    Error::Prompt(format!(
                        "failed to read override template {}: {e}",
                        path.display()
                    ))
                });
            }
        }

        // Fall back to embedded default
        default_template(role)
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Prompt(format!("unknown agent role: {role}")))
    }

    /// Load a template and render it with the given variables.
    pub fn render_role(&self, role: &str, vars: &HashMap<String, String>) -> Result<String> {
        let template = self.load_template(role)?;
        render_template(&template, vars)
    }
}

/// Render a template string by substituting `{{variable}}` placeholders.
/// Errors on unknown variables (strict mode).
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'{') {
            chars.next(); // consume second {
            let mut var_name = String::new();
            let mut found_close = false;

            while let Some(c2) = chars.next() {
                if c2 == '}' && chars.peek() == Some(&'}') {
                    chars.next(); // consume second }
                    found_close = true;
                    break;
                }
                var_name.push(c2);
            }

            if !found_close {
                return Err(Error::Prompt(format!(
                    "unclosed template variable: {{{{{var_name}"
                )));
            }

            let var_name = var_name.trim();
            if !KNOWN_VARIABLES.contains(&var_name) {
                return Err(Error::Prompt(format!(
                    "unknown template variable: {var_name}"
                )));
            }

            match vars.get(var_name) {
                Some(value) => result.push_str(value),
                None => {
                    return Err(Error::Prompt(format!(
                        "missing value for template variable: {var_name}"
                    )));
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}
