//! Prompt template storage and rendering.
//!
//! Templates live in per-module YAML files:
//!
//! ```yaml
//! prompts:
//!   parse_entry_prompt:
//!     template: |
//!       Classify the following entry: {entry_content}
//! ```
//!
//! Rendering substitutes `{name}` placeholders from a variable map. A
//! placeholder with no matching variable is a configuration defect and fails
//! fast; `{{` and `}}` escape literal braces.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::assistant::AssistantClientError;

/// A named prompt template
#[derive(Debug, Clone, Deserialize)]
pub struct PromptEntry {
    pub template: String,
}

/// In-memory store of a module's prompt templates
#[derive(Debug, Clone, Default)]
pub struct PromptStore {
    prompts: HashMap<String, PromptEntry>,
}

#[derive(Debug, Deserialize)]
struct PromptsFile {
    #[serde(default)]
    prompts: HashMap<String, PromptEntry>,
}

impl PromptStore {
    /// Load templates from a YAML prompts file
    pub fn from_file(path: &Path) -> Result<Self, AssistantClientError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AssistantClientError::Config(format!(
                "prompts file not found: {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse templates from YAML content
    pub fn from_yaml(content: &str) -> Result<Self, AssistantClientError> {
        let file: PromptsFile = serde_yaml::from_str(content)
            .map_err(|e| AssistantClientError::Config(format!("invalid prompts file: {}", e)))?;

        if file.prompts.is_empty() {
            return Err(AssistantClientError::Config(
                "no prompts found in prompts file".to_string(),
            ));
        }

        Ok(Self {
            prompts: file.prompts,
        })
    }

    /// Look up a template by name
    pub fn get(&self, name: &str) -> Result<&str, AssistantClientError> {
        self.prompts
            .get(name)
            .map(|p| p.template.as_str())
            .ok_or_else(|| {
                AssistantClientError::Config(format!("prompt '{}' not found", name))
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.prompts.keys().map(|k| k.as_str())
    }
}

/// Render a template by substituting `{name}` placeholders.
///
/// A referenced variable missing from `vars` is a ConfigError: it signals a
/// template/config mismatch, not a transient condition, so callers must not
/// retry it.
pub fn render_template(
    template: &str,
    vars: &HashMap<String, String>,
) -> Result<String, AssistantClientError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }

                let mut name = String::new();
                for inner in chars.by_ref() {
                    if inner == '}' {
                        break;
                    }
                    name.push(inner);
                }

                match vars.get(&name) {
                    Some(value) => out.push_str(value),
                    None => {
                        return Err(AssistantClientError::Config(format!(
                            "missing template variable: '{}'",
                            name
                        )))
                    }
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                }
                out.push('}');
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PROMPTS_YAML: &str = r#"
prompts:
  parse_entry_prompt:
    template: "Classify this entry: {entry_content}"
  assistant_instructions_json:
    template: "Respond only with JSON."
"#;

    #[test]
    fn test_store_parsing_and_lookup() {
        let store = PromptStore::from_yaml(TEST_PROMPTS_YAML).unwrap();

        assert_eq!(
            store.get("parse_entry_prompt").unwrap(),
            "Classify this entry: {entry_content}"
        );
        assert!(store.get("missing_prompt").is_err());
    }

    #[test]
    fn test_empty_prompts_rejected() {
        assert!(PromptStore::from_yaml("prompts: {}").is_err());
    }

    #[test]
    fn test_render_substitutes_variables() {
        let mut vars = HashMap::new();
        vars.insert("entry_content".to_string(), "buy milk".to_string());

        let out = render_template("Classify this entry: {entry_content}", &vars).unwrap();
        assert_eq!(out, "Classify this entry: buy milk");
    }

    #[test]
    fn test_render_missing_variable_is_config_error() {
        let vars = HashMap::new();
        let err = render_template("Hello {name}", &vars).unwrap_err();
        assert!(matches!(err, AssistantClientError::Config(_)));
    }

    #[test]
    fn test_render_escaped_braces() {
        let mut vars = HashMap::new();
        vars.insert("x".to_string(), "1".to_string());

        let out = render_template("{{\"value\": {x}}}", &vars).unwrap();
        assert_eq!(out, "{\"value\": 1}");
    }
}
