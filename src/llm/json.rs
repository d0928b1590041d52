//! Extraction of JSON payloads from raw model output.
//!
//! Models are instructed to return bare JSON but routinely wrap it in
//! markdown fences or surrounding prose. These helpers recover the payload
//! before serde parsing; parse failures stay the caller's problem.

/// Extract a JSON object from LLM output (handles markdown wrapping).
pub fn extract_json_object(text: &str) -> String {
    extract_json(text, '{', '}')
}

/// Extract a JSON array from LLM output (handles markdown wrapping).
pub fn extract_json_array(text: &str) -> String {
    extract_json(text, '[', ']')
}

fn extract_json(text: &str, open: char, close: char) -> String {
    let trimmed = text.trim();

    // Already bare JSON
    if trimmed.starts_with(open) {
        return trimmed.to_string();
    }

    // Wrapped in a ```json code block
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    // Wrapped in a bare ``` code block
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with(open) {
                return inner.to_string();
            }
        }
    }

    // Fall back to the outermost bracket pair
    if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
