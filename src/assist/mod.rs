//! Governance assistant.
//!
//! Asks an LLM behind the platform's AI gateway to propose values for
//! governance form fields, given whatever the UI knows about the model.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::upstream::client::API_KEY_HEADER;

const SYSTEM_PROMPT: &str = "You help data scientists fill in model governance forms. \
Answer with a single JSON object only. Use the requested field names as keys. \
For fields with options, answer with one of the options. \
Omit a field when the context gives no basis for a value.";

/// One form field the UI wants filled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

/// Body of `POST /assist-governance`.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistRequest {
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub context: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum AssistError {
    #[error("Gateway request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Gateway reply had no content")]
    EmptyReply,

    #[error("Could not parse suggestions from gateway reply: {0}")]
    Unparsable(String),
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct AssistClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl AssistClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        }
    }

    /// Ask the gateway for suggested values, keyed by field name.
    pub async fn suggest(&self, request: &AssistRequest) -> Result<Map<String, Value>, AssistError> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt(request) },
            ],
        });

        tracing::info!(
            endpoint = %self.endpoint,
            fields = request.fields.len(),
            "Requesting governance suggestions"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AssistError::EmptyReply)?;

        parse_suggestions(&content, &request.fields)
    }
}

fn user_prompt(request: &AssistRequest) -> String {
    let fields: Vec<Value> = request
        .fields
        .iter()
        .map(|f| {
            json!({
                "name": f.name,
                "label": f.label.as_deref().unwrap_or(&f.name),
                "type": f.kind.as_deref().unwrap_or("text"),
                "options": f.options,
            })
        })
        .collect();

    format!(
        "Fields to fill:\n{}\n\nModel context:\n{}",
        serde_json::to_string_pretty(&fields).unwrap_or_default(),
        serde_json::to_string_pretty(&request.context).unwrap_or_default()
    )
}

/// Extract the JSON object from a model reply and keep only requested fields.
pub fn parse_suggestions(
    content: &str,
    fields: &[FieldSpec],
) -> Result<Map<String, Value>, AssistError> {
    // The first complete object wins; text after it is ignored.
    let mut parsed = content
        .match_indices('{')
        .find_map(|(start, _)| {
            serde_json::Deserializer::from_str(&content[start..])
                .into_iter::<Map<String, Value>>()
                .next()
                .and_then(Result::ok)
        })
        .ok_or_else(|| AssistError::Unparsable(content.to_string()))?;

    parsed.retain(|key, _| fields.iter().any(|f| &f.name == key));
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Vec<FieldSpec> {
        names
            .iter()
            .map(|n| FieldSpec {
                name: n.to_string(),
                label: None,
                kind: None,
                options: vec![],
            })
            .collect()
    }

    #[test]
    fn test_parse_fenced_reply() {
        let reply = "Here you go:\n```json\n{\"riskTier\": \"Medium\", \"owner\": \"ana\"}\n```";
        let parsed = parse_suggestions(reply, &fields(&["riskTier", "owner"])).unwrap();
        assert_eq!(parsed["riskTier"], "Medium");
        assert_eq!(parsed["owner"], "ana");
    }

    #[test]
    fn test_unrequested_keys_dropped() {
        let parsed = parse_suggestions(r#"{"a": 1, "b": 2}"#, &fields(&["a"])).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parsed.contains_key("a"));
    }

    #[test]
    fn test_first_of_several_objects_used() {
        let reply = "{\"owner\": \"ana\"}\nAlternatively: {\"owner\": \"bo\"}";
        let parsed = parse_suggestions(reply, &fields(&["owner"])).unwrap();
        assert_eq!(parsed["owner"], "ana");
    }

    #[test]
    fn test_trailing_brace_in_prose_ignored() {
        let reply = "Suggested {\"riskTier\": \"High\"} (fields left blank: {none})";
        let parsed = parse_suggestions(reply, &fields(&["riskTier"])).unwrap();
        assert_eq!(parsed["riskTier"], "High");

        let reply = "Use {braces} carefully: {\"owner\": \"bo\"}";
        let parsed = parse_suggestions(reply, &fields(&["owner"])).unwrap();
        assert_eq!(parsed["owner"], "bo");
    }

    #[test]
    fn test_no_object_is_error() {
        let err = parse_suggestions("I cannot help with that", &fields(&["a"])).unwrap_err();
        assert!(matches!(err, AssistError::Unparsable(_)));
    }

    #[test]
    fn test_prompt_mentions_every_field() {
        let request = AssistRequest {
            fields: fields(&["intendedUse", "dataSources"]),
            context: json!({ "modelName": "churn" }),
        };
        let prompt = user_prompt(&request);
        assert!(prompt.contains("intendedUse"));
        assert!(prompt.contains("dataSources"));
        assert!(prompt.contains("churn"));
    }
}
