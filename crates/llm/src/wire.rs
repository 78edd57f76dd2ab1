//! Request and response bodies of the chat-completions API.

use pipeline::{ResponseFormat, StructuredPrompt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{LlmConfig, LlmError};

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: [ChatMessage<'a>; 2],
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormatSpec>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResponseFormatSpec {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

pub(crate) fn chat_request<'a>(
    config: &LlmConfig,
    model: &'a str,
    prompt: &'a StructuredPrompt,
) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: [
            ChatMessage {
                role: "system",
                content: &prompt.system,
            },
            ChatMessage {
                role: "user",
                content: &prompt.user,
            },
        ],
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        response_format: match prompt.format {
            ResponseFormat::Json => Some(ResponseFormatSpec {
                kind: "json_object",
            }),
            ResponseFormat::Text => None,
        },
    }
}

/// Extracts the first choice's content in the shape `format` asks for.
///
/// JSON answers wrapped in a Markdown code fence are unwrapped first.
pub(crate) fn answer(format: ResponseFormat, response: ChatResponse) -> Result<Value, LlmError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| LlmError::MalformedResponse {
            message: "response carried no message content".to_string(),
        })?;

    match format {
        ResponseFormat::Text => Ok(Value::String(content)),
        ResponseFormat::Json => {
            let body = strip_code_fence(&content);
            let value: Value = serde_json::from_str(body).map_err(|e| LlmError::MalformedResponse {
                message: format!("content is not JSON: {e}"),
            })?;
            if !value.is_object() {
                return Err(LlmError::MalformedResponse {
                    message: "JSON content is not an object".to_string(),
                });
            }
            Ok(value)
        }
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(content: Option<&str>) -> ChatResponse {
        serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        }))
        .unwrap()
    }

    #[test]
    fn json_prompts_request_a_json_object() {
        let config = LlmConfig::default();
        let prompt = StructuredPrompt::json("be terse", "list symptoms");
        let body = serde_json::to_value(chat_request(&config, "gpt-4-turbo-preview", &prompt)).unwrap();

        assert_eq!(body["model"], "gpt-4-turbo-preview");
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "be terse"}));
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["response_format"], json!({"type": "json_object"}));
        assert_eq!(body["max_tokens"], 2000);
    }

    #[test]
    fn text_prompts_omit_the_response_format() {
        let config = LlmConfig::default();
        let prompt = StructuredPrompt::text("summarise", "sources");
        let body = serde_json::to_value(chat_request(&config, "m", &prompt)).unwrap();
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn parses_json_and_fenced_json() {
        let plain = answer(ResponseFormat::Json, response(Some(r#"{"symptoms": ["cough"]}"#))).unwrap();
        assert_eq!(plain, json!({"symptoms": ["cough"]}));

        let fenced = answer(
            ResponseFormat::Json,
            response(Some("```json\n{\"symptoms\": []}\n```")),
        )
        .unwrap();
        assert_eq!(fenced, json!({"symptoms": []}));
    }

    #[test]
    fn text_is_returned_as_a_string() {
        let text = answer(ResponseFormat::Text, response(Some("likely viral"))).unwrap();
        assert_eq!(text, json!("likely viral"));
    }

    #[test]
    fn missing_or_invalid_content_is_malformed() {
        assert!(matches!(
            answer(ResponseFormat::Json, response(None)),
            Err(LlmError::MalformedResponse { .. })
        ));
        assert!(matches!(
            answer(ResponseFormat::Json, response(Some("not json"))),
            Err(LlmError::MalformedResponse { .. })
        ));
        assert!(matches!(
            answer(ResponseFormat::Json, response(Some("[1, 2]"))),
            Err(LlmError::MalformedResponse { .. })
        ));

        let empty: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(answer(ResponseFormat::Text, empty).is_err());
    }
}
