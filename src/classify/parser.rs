//! Classifier output normalization.
//!
//! Classifier responses arrive in several shapes: a fenced JSON block, a JSON
//! object with a `classifications` array, a flat JSON object, or plain
//! `key: value` line text. Parsing always returns a record; an absent
//! `category` signals ambiguity and is the caller's cue to fall back.

use serde_json::Value;
use tracing::debug;

/// Category-bearing keys, checked in priority order (English then Portuguese)
const CATEGORY_KEYS: &[&str] = &["category", "type", "classificação", "categoria", "tipo"];

/// Canonical classification result.
///
/// `text` is the text that was classified (the classifier may echo a cleaned
/// version; otherwise the caller's input is carried through). `raw` holds the
/// parsed JSON structure when one was recognized.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRecord {
    pub category: Option<String>,
    pub text: String,
    pub raw: Option<Value>,
}

impl ClassificationRecord {
    pub fn has_category(&self) -> bool {
        self.category.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// Parse classifier output into a canonical record. Never fails: each
/// strategy degrades to the next, down to line-oriented text.
pub fn parse(output: &str, original_text: &str) -> ClassificationRecord {
    let stripped = strip_code_fence(output);

    if let Ok(value) = serde_json::from_str::<Value>(stripped) {
        return from_json(value, original_text);
    }

    from_line_text(stripped, original_text)
}

/// Remove a surrounding ``` fence (with or without a `json` language tag)
fn strip_code_fence(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };

    // Drop the language tag on the opening fence line
    match body.split_once('\n') {
        Some((first, remainder)) if first.trim().eq_ignore_ascii_case("json") || first.trim().is_empty() => {
            remainder.trim()
        }
        _ => body.trim(),
    }
}

fn from_json(value: Value, original_text: &str) -> ClassificationRecord {
    // Shape 1: {"classifications": [{"category": ..., "text": ...}, ...]}
    // The first element is authoritative.
    if let Some(first) = value
        .get("classifications")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
    {
        let category = extract_category(first);
        let text = first
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or(original_text)
            .to_string();

        return ClassificationRecord {
            category,
            text,
            raw: Some(value),
        };
    }

    // Shape 2: a flat object carrying a category-bearing key directly
    let category = extract_category(&value);
    let text = value
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or(original_text)
        .to_string();

    if category.is_none() {
        debug!("JSON classifier output carried no category-bearing key");
    }

    ClassificationRecord {
        category,
        text,
        raw: Some(value),
    }
}

/// Shape 3: `key: value` lines. Each line splits on the first colon into a
/// lowercased key and trimmed value.
fn from_line_text(output: &str, original_text: &str) -> ClassificationRecord {
    let mut pairs: Vec<(String, String)> = Vec::new();

    for line in output.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_lowercase();
            let value = value.trim().to_string();
            if !key.is_empty() && !value.is_empty() {
                pairs.push((key, value));
            }
        }
    }

    let category = CATEGORY_KEYS.iter().find_map(|wanted| {
        pairs
            .iter()
            .find(|(k, _)| k == wanted)
            .map(|(_, v)| v.to_lowercase())
    });

    let text = pairs
        .iter()
        .find(|(k, _)| k == "text" || k == "texto")
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| original_text.to_string());

    ClassificationRecord {
        category,
        text,
        raw: None,
    }
}

fn extract_category(value: &Value) -> Option<String> {
    CATEGORY_KEYS.iter().find_map(|key| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_classifications_array() {
        let output = "```json\n{\"classifications\":[{\"category\":\"agenda\",\"text\":\"x\"}]}\n```";
        let record = parse(output, "original");

        assert_eq!(record.category.as_deref(), Some("agenda"));
        assert_eq!(record.text, "x");
        assert!(record.raw.is_some());
    }

    #[test]
    fn test_first_classification_is_authoritative() {
        let output = r#"{"classifications":[
            {"category":"finance","text":"pay rent"},
            {"category":"tasks","text":"ignored"}
        ]}"#;
        let record = parse(output, "original");

        assert_eq!(record.category.as_deref(), Some("finance"));
        assert_eq!(record.text, "pay rent");
    }

    #[test]
    fn test_flat_json_with_portuguese_key() {
        let record = parse(r#"{"categoria": "Contactos"}"#, "ligar ao João");

        assert_eq!(record.category.as_deref(), Some("contactos"));
        assert_eq!(record.text, "ligar ao João");
    }

    #[test]
    fn test_line_text_portuguese_category() {
        let record = parse("Categoria: tarefa\nOutro: valor", "comprar pão");

        assert_eq!(record.category.as_deref(), Some("tarefa"));
        assert_eq!(record.text, "comprar pão");
        assert!(record.raw.is_none());
    }

    #[test]
    fn test_line_text_category_key_priority() {
        // "category" outranks "tipo" regardless of line order
        let record = parse("tipo: diario\ncategory: agenda", "x");
        assert_eq!(record.category.as_deref(), Some("agenda"));
    }

    #[test]
    fn test_unrecognized_text_yields_no_category() {
        let record = parse("I could not classify this entry.", "hmm");

        assert!(!record.has_category());
        assert_eq!(record.text, "hmm");
    }

    #[test]
    fn test_fence_without_language_tag() {
        let record = parse("```\n{\"category\": \"diary\"}\n```", "dear diary");
        assert_eq!(record.category.as_deref(), Some("diary"));
    }

    #[test]
    fn test_empty_category_is_ambiguous() {
        let record = parse(r#"{"category": ""}"#, "x");
        assert!(!record.has_category());
    }
}
