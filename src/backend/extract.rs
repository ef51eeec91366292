//! Strip markdown fencing from generated test code.
//!
//! The generation endpoints return prose-wrapped answers; the actual test
//! lives inside ```java fenced blocks.

/// Extract every ```java fenced block from `text`, trimmed.
///
/// Returns an empty vec when the text carries no java fence; callers fall
/// back to the raw response in that case.
pub fn test_code_blocks(text: &str) -> Vec<String> {
    const OPEN: &str = "```java";
    const CLOSE: &str = "```";

    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        match after_open.find(CLOSE) {
            Some(end) => {
                blocks.push(after_open[..end].trim().to_string());
                rest = &after_open[end + CLOSE.len()..];
            }
            None => break, // unterminated fence
        }
    }

    blocks
}

/// Best single extraction: first fenced block, or the raw text when the
/// response was not fenced at all.
pub fn best_test_code(text: &str) -> String {
    test_code_blocks(text)
        .into_iter()
        .next()
        .unwrap_or_else(|| text.trim().to_string())
}
