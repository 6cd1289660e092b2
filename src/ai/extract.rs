use serde_json::Value;

/// Pulls the first JSON document out of raw model output.
///
/// Tries the whole text first (after stripping a markdown code fence), then
/// scans for the first balanced `{...}` or `[...]` span outside string
/// literals. Only that first span is tried; if it does not parse, the whole
/// payload is treated as garbage.
pub fn parse_possible_json(raw: &str) -> Option<Value> {
    let mut text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(rest) = text.strip_prefix("```") {
        text = rest
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .trim_start();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    scan_balanced(text)
}

fn scan_balanced(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' | b']' => {
                if depth > 0 {
                    depth -= 1;
                }
                if depth == 0 {
                    if let Some(s) = start {
                        return serde_json::from_str(&text[s..=i]).ok();
                    }
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::parse_possible_json;
    use serde_json::json;

    #[test]
    fn parses_plain_object() {
        let v = parse_possible_json(r#"{"action":"Kill","target":"p2"}"#).unwrap();
        assert_eq!(v["action"], "Kill");
    }

    #[test]
    fn strips_markdown_fences() {
        let raw = "```json\n{\"shouldSpeak\": true}\n```";
        let v = parse_possible_json(raw).unwrap();
        assert_eq!(v["shouldSpeak"], json!(true));
    }

    #[test]
    fn extracts_object_embedded_in_prose() {
        let raw = "Sure! Here is my decision: {\"action\":\"Save\",\"target\":\"p1\"} hope that helps.";
        let v = parse_possible_json(raw).unwrap();
        assert_eq!(v["target"], "p1");
    }

    #[test]
    fn braces_inside_strings_do_not_close_the_span() {
        let raw = r#"noise {"dialogue":"curly } inside","shouldSpeak":true} trailer"#;
        let v = parse_possible_json(raw).unwrap();
        assert_eq!(v["dialogue"], "curly } inside");
    }

    #[test]
    fn escaped_quotes_inside_strings_are_handled() {
        let raw = r#"{"dialogue":"she said \"vote him\" twice","shouldSpeak":true}"#;
        let v = parse_possible_json(raw).unwrap();
        assert_eq!(v["dialogue"], "she said \"vote him\" twice");
    }

    #[test]
    fn unbalanced_text_yields_none() {
        assert!(parse_possible_json("{\"action\": \"Kill\"").is_none());
        assert!(parse_possible_json("no json here at all").is_none());
        assert!(parse_possible_json("   ").is_none());
    }

    #[test]
    fn first_balanced_span_wins() {
        let raw = r#"{"a":1} {"b":2}"#;
        let v = parse_possible_json(raw).unwrap();
        assert_eq!(v["a"], json!(1));
    }

    #[test]
    fn arrays_are_accepted_too() {
        let raw = "prefix [1, 2, 3] suffix";
        let v = parse_possible_json(raw).unwrap();
        assert_eq!(v, json!([1, 2, 3]));
    }
}
