use serde::Serialize;
use serde_json::Value;

/// Strict parse of a stored decision payload. No fence stripping or span
/// scanning here; raw strings in session state are already extracted JSON.
pub fn safe_parse_json(raw: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }
    serde_json::from_str(raw).ok()
}

/// Serialized back into the night-action store after target normalization,
/// so the on-disk/raw key names follow the wire schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NightAction {
    pub action: String,
    pub target: String,
    pub dialogue: String,
    pub reasoning: String,
    #[serde(rename = "investigationResult")]
    pub investigation_result: String,
    pub internal_analysis: Value,
}

/// Human-seat submissions are synthesized through this type, so it serializes
/// with the wire key names the validators read back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscussionAction {
    pub dialogue: String,
    #[serde(rename = "shouldSpeak")]
    pub should_speak: bool,
    pub strategy_notes: String,
    pub internal_analysis: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteAction {
    pub vote: String,
    pub reasoning: String,
    pub internal_analysis: Value,
}

/// Shapes a decision value into a night action. `action` must be a string;
/// every other field is coerced to a safe default.
pub fn to_night_action(value: &Value) -> Option<NightAction> {
    let obj = usable_object(value)?;
    obj.get("action")?.as_str()?;
    Some(NightAction {
        action: str_field(obj, "action", ""),
        target: str_field(obj, "target", ""),
        dialogue: str_field(obj, "dialogue", ""),
        reasoning: str_field(obj, "reasoning", ""),
        investigation_result: str_field(obj, "investigationResult", "Unknown"),
        internal_analysis: analysis_field(obj),
    })
}

/// Shapes a decision value into a discussion action. Accepted when at least
/// one of `dialogue` (string) or `shouldSpeak` (bool) is well typed; a
/// missing `shouldSpeak` is inferred from whether the dialogue is non-blank.
pub fn to_discussion_action(value: &Value) -> Option<DiscussionAction> {
    let obj = usable_object(value)?;
    let dialogue_ok = obj.get("dialogue").is_some_and(Value::is_string);
    let speak_ok = obj.get("shouldSpeak").is_some_and(Value::is_boolean);
    if !dialogue_ok && !speak_ok {
        return None;
    }
    let dialogue = str_field(obj, "dialogue", "");
    let should_speak = obj
        .get("shouldSpeak")
        .and_then(Value::as_bool)
        .unwrap_or_else(|| !dialogue.trim().is_empty());
    Some(DiscussionAction {
        dialogue,
        should_speak,
        strategy_notes: str_field(obj, "strategy_notes", ""),
        internal_analysis: analysis_field(obj),
    })
}

/// Shapes a decision value into a vote. `vote` must be a string.
pub fn to_vote_action(value: &Value) -> Option<VoteAction> {
    let obj = usable_object(value)?;
    obj.get("vote")?.as_str()?;
    Some(VoteAction {
        vote: str_field(obj, "vote", ""),
        reasoning: str_field(obj, "reasoning", ""),
        internal_analysis: analysis_field(obj),
    })
}

fn usable_object(value: &Value) -> Option<&serde_json::Map<String, Value>> {
    let obj = value.as_object()?;
    match obj.get("__error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Some(obj),
        Some(_) => None,
    }
}

fn str_field(obj: &serde_json::Map<String, Value>, key: &str, default: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn analysis_field(obj: &serde_json::Map<String, Value>) -> Value {
    match obj.get("internal_analysis") {
        Some(v) if v.is_object() => v.clone(),
        _ => Value::Object(serde_json::Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn night_action_requires_string_action() {
        assert!(to_night_action(&json!({"target": "p2"})).is_none());
        assert!(to_night_action(&json!({"action": 7, "target": "p2"})).is_none());
        let act = to_night_action(&json!({"action": "Kill", "target": "p2"})).unwrap();
        assert_eq!(act.action, "Kill");
        assert_eq!(act.target, "p2");
        assert_eq!(act.investigation_result, "Unknown");
        assert_eq!(act.internal_analysis, json!({}));
    }

    #[test]
    fn error_payloads_are_rejected() {
        let err = json!({"__error": true, "action": "Kill", "target": "p2"});
        assert!(to_night_action(&err).is_none());
        assert!(to_discussion_action(&err).is_none());
        assert!(to_vote_action(&err).is_none());
    }

    #[test]
    fn discussion_accepts_either_well_typed_field() {
        let only_dialogue = to_discussion_action(&json!({"dialogue": "I suspect Blair."})).unwrap();
        assert!(only_dialogue.should_speak);
        let only_flag = to_discussion_action(&json!({"shouldSpeak": false})).unwrap();
        assert!(!only_flag.should_speak);
        assert_eq!(only_flag.dialogue, "");
        assert!(to_discussion_action(&json!({"strategy_notes": "hm"})).is_none());
    }

    #[test]
    fn should_speak_is_inferred_from_blank_dialogue() {
        let blank = to_discussion_action(&json!({"dialogue": "   "})).unwrap();
        assert!(!blank.should_speak);
    }

    #[test]
    fn vote_requires_string_vote() {
        assert!(to_vote_action(&json!({"reasoning": "x"})).is_none());
        let v = to_vote_action(&json!({"vote": "p3", "reasoning": "pressure"})).unwrap();
        assert_eq!(v.vote, "p3");
        assert_eq!(v.reasoning, "pressure");
    }

    #[test]
    fn non_objects_and_blank_raw_are_rejected() {
        assert!(safe_parse_json("").is_none());
        assert!(safe_parse_json("not json").is_none());
        assert!(to_night_action(&json!(["Kill"])).is_none());
        assert!(to_vote_action(&json!("p3")).is_none());
    }

    #[test]
    fn malformed_analysis_collapses_to_empty_object() {
        let act =
            to_night_action(&json!({"action": "Save", "internal_analysis": "private"})).unwrap();
        assert_eq!(act.internal_analysis, json!({}));
    }
}
