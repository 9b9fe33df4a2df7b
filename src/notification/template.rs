//! Message template rendering.
//!
//! Rendering happens at enqueue time so a later template edit can never
//! alter an already-queued message. The engine is pluggable; the default
//! substitutes `{{dot.path}}` placeholders from the flow event context.

use serde_json::Value;

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, context: &Value) -> String;
}

/// Default renderer: `{{path.to.field}}` placeholders, missing fields
/// render empty
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderRenderer;

impl TemplateRenderer for PlaceholderRenderer {
    fn render(&self, template: &str, context: &Value) -> String {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            match after_open.find("}}") {
                Some(end) => {
                    let path = after_open[..end].trim();
                    output.push_str(&lookup(context, path));
                    rest = &after_open[end + 2..];
                }
                None => {
                    // Unclosed placeholder, emit literally
                    output.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        output.push_str(rest);
        output
    }
}

fn lookup(context: &Value, path: &str) -> String {
    let mut current = context;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    match current {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
