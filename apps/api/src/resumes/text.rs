//! Flattens a resume into plain text for prompts.
//!
//! Priority: structured editor content → text parsed from an upload → nothing.

use serde_json::Value;

use crate::models::resume::ResumeRow;

const SKIPPED_PROPS: [&str; 3] = ["title", "layoutZone", "titleStyle"];
const LIST_PROPS: [&str; 5] = ["items", "educations", "experiences", "projects", "skills"];

pub fn resume_plain_text(resume: &ResumeRow) -> String {
    if let Some(content) = &resume.content_json {
        let text = content_json_text(content);
        if !text.is_empty() {
            return text;
        }
    }
    resume.parsed_content.clone()
}

/// Accepts both the two-column `{"sidebar": [...], "main": [...]}` layout and
/// the older flat array of modules.
pub fn content_json_text(content: &Value) -> String {
    let modules: Vec<&Value> = match content {
        Value::Object(layout) if layout.contains_key("main") => ["sidebar", "main"]
            .iter()
            .filter_map(|zone| layout.get(*zone).and_then(Value::as_array))
            .flatten()
            .collect(),
        Value::Array(modules) => modules.iter().collect(),
        _ => Vec::new(),
    };

    let mut parts: Vec<String> = Vec::new();
    for module in modules {
        let Some(props) = module.get("props").and_then(Value::as_object) else {
            continue;
        };
        if props.is_empty() {
            continue;
        }

        let title = props
            .get("title")
            .or_else(|| module.get("title"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        parts.push(format!("\n--- {title} ---\n"));

        for (key, value) in props {
            if let Value::String(s) = value {
                if !SKIPPED_PROPS.contains(&key.as_str()) {
                    parts.push(s.clone());
                }
            }
        }

        for list_key in LIST_PROPS {
            let Some(items) = props.get(list_key).and_then(Value::as_array) else {
                continue;
            };
            for item in items.iter().filter_map(Value::as_object) {
                let line = item
                    .iter()
                    .filter(|(k, _)| k.as_str() != "id")
                    .filter_map(|(_, v)| v.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                parts.push(line);
            }
        }
    }

    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
