use lexiforge_core::{GenerationRequest, GenerationResponse, OutputSchema, Role, UsageStats};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
struct NounEntry {
    lemma: String,
    gender: String,
    plural: Option<String>,
}

fn noun_schema() -> OutputSchema {
    OutputSchema::new(
        "noun",
        json!({
            "type": "object",
            "required": ["lemma", "gender"],
            "properties": {
                "lemma": {"type": "string"},
                "gender": {"type": "string"},
                "frequency": {"type": "integer"}
            }
        }),
    )
}

#[test]
fn accepts_conforming_payload() {
    let payload = json!({"lemma": "Haus", "gender": "n", "frequency": 120});
    noun_schema().validate(&payload).expect("valid");
}

#[test]
fn rejects_missing_required_field() {
    let err = noun_schema()
        .validate(&json!({"lemma": "Haus"}))
        .unwrap_err();
    assert!(err.to_string().contains("requires field 'gender'"));
}

#[test]
fn rejects_null_required_field_and_wrong_types() {
    assert!(noun_schema()
        .validate(&json!({"lemma": "Haus", "gender": null}))
        .is_err());
    assert!(noun_schema()
        .validate(&json!({"lemma": "Haus", "gender": "n", "frequency": "often"}))
        .is_err());
    assert!(noun_schema().validate(&json!(["Haus"])).is_err());
}

#[test]
fn derived_schema_lists_required_fields() {
    let schema = OutputSchema::for_type::<NounEntry>("noun");
    let required = schema.schema["required"].as_array().expect("required");
    assert!(required.contains(&json!("lemma")));
    assert!(required.contains(&json!("gender")));
    assert!(!required.contains(&json!("plural")));
}

#[test]
fn request_builds_system_then_user_messages() {
    let request = GenerationRequest::new("Describe 'Haus'", noun_schema())
        .with_system_prompt("You are a lexicographer.")
        .with_temperature(0.2)
        .with_max_tokens(512);

    let messages = request.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[1].content, "Describe 'Haus'");
    assert_eq!(request.temperature(), Some(0.2));
    assert_eq!(request.max_tokens(), Some(512));
    assert_eq!(request.model(), None);
}

#[test]
fn response_parses_into_caller_type() {
    let response = GenerationResponse {
        payload: json!({"lemma": "Haus", "gender": "n"}),
        usage: UsageStats::default(),
        model: "gpt-4o-mini".to_string(),
        provider: "openai".to_string(),
        attempts: 1,
    };
    let entry: NounEntry = response.parse().expect("parse");
    assert_eq!(entry.plural, None);

    let broken = GenerationResponse {
        payload: json!({"lemma": 3}),
        ..response
    };
    assert!(broken.parse::<NounEntry>().is_err());
}
