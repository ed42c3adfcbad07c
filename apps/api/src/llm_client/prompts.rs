// Shared prompt fragments. Each pipeline that calls the LLM keeps its own
// prompts.rs alongside it; only cross-cutting pieces live here.

/// System prompt that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You extract structured data from hiring documents. \
    Reply with exactly one JSON object and nothing else: \
    no prose before or after it, no markdown fences, no commentary.";

/// Appended to every structured prompt: the expected JSON shape, then the JSON-only reminder.
pub fn with_response_shape(prompt: &str, shape: &str) -> String {
    format!(
        "{prompt}\n\nRespond with a single JSON object of exactly this shape:\n{shape}\n\n\
         Return ONLY the JSON object."
    )
}

/// Substitutes `{name}` placeholders in one pass. Inserted values are never
/// rescanned, so user text containing `{...}` stays literal; unknown braces are kept.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after_brace = &rest[start + 1..];
        let hit = vars.iter().find_map(|(name, value)| {
            after_brace
                .strip_prefix(name)?
                .strip_prefix('}')
                .map(|tail| (*value, tail))
        });
        match hit {
            Some((value, tail)) => {
                out.push_str(value);
                rest = tail;
            }
            None => {
                out.push('{');
                rest = after_brace;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_keeps_json_braces_and_does_not_rescan_values() {
        let template = "{\"a\": 1}\n{first} / {second}";
        let out = render(template, &[("first", "{second}"), ("second", "B")]);
        assert_eq!(out, "{\"a\": 1}\n{second} / B");
    }

    #[test]
    fn test_with_response_shape_appends_shape_after_prompt() {
        let prompt = with_response_shape("Score it.", "{\n  \"match_score\": number\n}");
        assert!(prompt.starts_with("Score it."));
        assert!(prompt.contains("\"match_score\": number"));
        assert!(prompt.ends_with("Return ONLY the JSON object."));
    }
}
