use crate::mcpchat::tool_protocol::{ContentItem, InvocationContent, InvocationResult};

/// Render an invocation result as display text for the user and the model.
///
/// Content items are joined by newlines: text items and textual resources show their
/// text, any other item is shown as compact JSON. Structured payloads are pretty
/// printed.
pub fn format_tool_result(result: &InvocationResult) -> String {
    match &result.content {
        InvocationContent::Text(text) => text.clone(),
        InvocationContent::Structured(value) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        InvocationContent::Items(items) => items
            .iter()
            .map(format_item)
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn format_item(item: &ContentItem) -> String {
    match item {
        ContentItem::Text(text) => text.clone(),
        ContentItem::Resource { text, .. } => text.clone(),
        ContentItem::Opaque(value) => value.to_string(),
    }
}
