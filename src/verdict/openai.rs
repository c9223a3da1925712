//! OpenAI-backed verdict generator.
//!
//! Targets the Responses API with a strict JSON schema so the model's
//! output parses directly into a `VerdictOpinion`. Probabilities are
//! sanitized (clamped + renormalized) before being returned.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{renormalize, CaseBundle, VerdictGenerator, VerdictOpinion};
use crate::types::Outcome;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/responses";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 900;

const SYSTEM_PROMPT: &str = "You are an expert judge issuing a *simulated* \
verdict strictly from the case material below. If the material is \
insufficient, say so and draw a cautious conclusion. Do not invent facts. \
The verdict is strictly binary: GUILTY or NOT_GUILTY. Reply strictly as \
JSON matching the given schema.";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    output_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawOpinion {
    verdict: Outcome,
    p_guilty: f64,
    p_not_guilty: f64,
    why: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenAiVerdictClient {
    http: Client,
    api_key: String,
    model: String,
    max_output_tokens: u32,
}

impl OpenAiVerdictClient {
    pub fn new(api_key: String, model: Option<String>, max_output_tokens: Option<u32>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to build OpenAI HTTP client")?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_output_tokens: max_output_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
        })
    }

    fn build_user_prompt(bundle: &CaseBundle) -> String {
        format!(
            "PREPROMPT (from the user):\n{}\n\nCASE MATERIAL:\nCase #{}: {}\n\
             Status: {}\nWagering closes: {}\n\nReply as JSON.",
            bundle.preprompt,
            bundle.case.id,
            bundle.case.title,
            bundle.case.status,
            bundle.case.deadline,
        )
    }

    /// Concatenate assistant `output_text` parts from a Responses API body,
    /// falling back to the SDK-style `output_text` field.
    fn collect_output_text(body: &ResponsesBody) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for item in &body.output {
            if item.kind != "message" || item.role != "assistant" {
                continue;
            }
            for part in &item.content {
                if part.kind == "output_text" {
                    parts.push(&part.text);
                }
            }
        }
        if parts.is_empty() {
            return body.output_text.clone().unwrap_or_default();
        }
        parts.concat()
    }

    /// Parse model output as JSON, tolerating prose around the object.
    fn parse_opinion(text: &str) -> Result<RawOpinion> {
        if let Ok(raw) = serde_json::from_str(text) {
            return Ok(raw);
        }
        let start = text.find('{');
        let end = text.rfind('}');
        if let (Some(start), Some(end)) = (start, end) {
            if end > start {
                return serde_json::from_str(&text[start..=end])
                    .context("Model returned malformed verdict JSON");
            }
        }
        anyhow::bail!("Model returned non-JSON output")
    }

    async fn call_api(&self, bundle: &CaseBundle) -> Result<String> {
        let schema = json!({
            "type": "object",
            "properties": {
                "verdict": { "type": "string", "enum": ["GUILTY", "NOT_GUILTY"] },
                "p_guilty": { "type": "number", "minimum": 0, "maximum": 1 },
                "p_not_guilty": { "type": "number", "minimum": 0, "maximum": 1 },
                "why": { "type": "string" }
            },
            "required": ["verdict", "p_guilty", "p_not_guilty", "why"],
            "additionalProperties": false
        });

        let request = json!({
            "model": self.model,
            "input": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": Self::build_user_prompt(bundle) }
            ],
            "temperature": 0.2,
            "max_output_tokens": self.max_output_tokens,
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": "verdict",
                    "strict": true,
                    "schema": schema
                }
            }
        });

        let response = self
            .http
            .post(OPENAI_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error {status}: {error_text}");
        }

        let body: ResponsesBody = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;
        Ok(Self::collect_output_text(&body))
    }
}

#[async_trait]
impl VerdictGenerator for OpenAiVerdictClient {
    async fn generate(&self, bundle: &CaseBundle) -> Result<VerdictOpinion> {
        debug!(case_id = bundle.case.id, model = %self.model, "Requesting simulated verdict");

        let text = self.call_api(bundle).await?;
        let raw = Self::parse_opinion(&text)?;
        let (p_guilty, p_not_guilty) = renormalize(raw.p_guilty, raw.p_not_guilty);

        Ok(VerdictOpinion {
            verdict: raw.verdict,
            p_guilty,
            p_not_guilty,
            why: raw.why.trim().to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Case, CaseStatus};
    use chrono::Utc;

    #[test]
    fn test_client_construction() {
        let client = OpenAiVerdictClient::new("test-key".into(), None, None).unwrap();
        assert_eq!(client.model_name(), DEFAULT_MODEL);
    }

    #[test]
    fn test_client_custom_model() {
        let client =
            OpenAiVerdictClient::new("key".into(), Some("gpt-4o".into()), Some(500)).unwrap();
        assert_eq!(client.model_name(), "gpt-4o");
    }

    #[test]
    fn test_parse_clean_json() {
        let raw = OpenAiVerdictClient::parse_opinion(
            r#"{"verdict":"GUILTY","p_guilty":0.8,"p_not_guilty":0.2,"why":"clear access logs"}"#,
        )
        .unwrap();
        assert_eq!(raw.verdict, Outcome::Guilty);
        assert_eq!(raw.p_guilty, 0.8);
    }

    #[test]
    fn test_parse_json_wrapped_in_prose() {
        let text = "Here is my verdict:\n{\"verdict\":\"NOT_GUILTY\",\"p_guilty\":0.3,\
                    \"p_not_guilty\":0.7,\"why\":\"doubt remains\"}\nThank you.";
        let raw = OpenAiVerdictClient::parse_opinion(text).unwrap();
        assert_eq!(raw.verdict, Outcome::NotGuilty);
        assert_eq!(raw.why, "doubt remains");
    }

    #[test]
    fn test_parse_non_json_fails() {
        assert!(OpenAiVerdictClient::parse_opinion("I cannot decide").is_err());
    }

    #[test]
    fn test_collect_output_text_prefers_message_parts() {
        let body: ResponsesBody = serde_json::from_value(serde_json::json!({
            "output": [
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [
                        { "type": "output_text", "text": "{\"a\":" },
                        { "type": "output_text", "text": "1}" }
                    ]
                },
                { "type": "reasoning", "role": "", "content": [] }
            ],
            "output_text": "ignored"
        }))
        .unwrap();
        assert_eq!(OpenAiVerdictClient::collect_output_text(&body), "{\"a\":1}");
    }

    #[test]
    fn test_collect_output_text_falls_back() {
        let body: ResponsesBody = serde_json::from_value(serde_json::json!({
            "output": [],
            "output_text": "fallback"
        }))
        .unwrap();
        assert_eq!(OpenAiVerdictClient::collect_output_text(&body), "fallback");
    }

    #[test]
    fn test_user_prompt_contains_case_material() {
        let bundle = CaseBundle {
            case: Case {
                id: 3,
                title: "The missing backup".into(),
                deadline: Utc::now(),
                status: CaseStatus::Active,
            },
            preprompt: "Focus on the access logs".into(),
        };
        let prompt = OpenAiVerdictClient::build_user_prompt(&bundle);
        assert!(prompt.contains("Case #3"));
        assert!(prompt.contains("The missing backup"));
        assert!(prompt.contains("Focus on the access logs"));
    }
}
