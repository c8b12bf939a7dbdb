//! Gemini API client (https://generativelanguage.googleapis.com by default).
//! Single-shot `generateContent`; no streaming, no retries.

use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// System instruction sent when the relay runs with a system prompt and none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Please answer the user's question with user's language, do not use any other language. Not use any format like markdown.";

/// Client for the Gemini generateContent API. Cheap to clone; share one per process.
#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("gemini request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("gemini api error: {0}")]
    Api(String),
    #[error("gemini response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    /// The response had no usable text (no candidate, no part, or a non-text first part).
    #[error("failed to get text from response: {0}")]
    Extraction(&'static str),
}

impl GeminiError {
    pub fn is_extraction(&self) -> bool {
        matches!(self, GeminiError::Extraction(_))
    }
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    /// POST /v1beta/models/{model}:generateContent: one completion for `user_message`.
    /// Returns the text of the first part of the first candidate.
    pub async fn complete(
        &self,
        system_prompt: Option<&str>,
        user_message: &str,
    ) -> Result<String, GeminiError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = GenerateContentRequest {
            system_instruction: system_prompt
                .filter(|s| !s.trim().is_empty())
                .map(|s| Content::text(None, s)),
            contents: vec![Content::text(Some("user"), user_message)],
        };
        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = res.status();
        let raw = res.text().await?;
        log::debug!("gemini response ({}): {}", status, raw);
        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorResponse>(&raw)
                .map(|e| e.error.message)
                .unwrap_or(raw);
            return Err(GeminiError::Api(format!("{} {}", status, message)));
        }
        let data: GenerateContentResponse = serde_json::from_str(&raw)?;
        let text = data.first_text()?;
        Ok(text.to_string())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

/// One content part. Non-text parts (inlineData, functionCall, ...) deserialize with `text: None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Text of the first part of the first candidate. Empty text counts as missing;
    /// whitespace-only text is returned as is.
    pub fn first_text(&self) -> Result<&str, GeminiError> {
        let candidate = self
            .candidates
            .first()
            .ok_or(GeminiError::Extraction("no candidates"))?;
        let part = candidate
            .content
            .as_ref()
            .and_then(|c| c.parts.first())
            .ok_or(GeminiError::Extraction("no content parts"))?;
        let text = part
            .text
            .as_deref()
            .ok_or(GeminiError::Extraction("first part is not text"))?;
        if text.is_empty() {
            return Err(GeminiError::Extraction("empty text"));
        }
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GENERATE_PATH: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

    fn test_client(base_url: &str) -> GeminiClient {
        GeminiClient::new(
            "test-key".to_string(),
            "gemini-1.5-flash".to_string(),
            Some(format!("{}/", base_url)),
        )
    }

    fn text_response(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 3, "totalTokenCount": 10 }
        })
    }

    #[tokio::test]
    async fn complete_returns_first_text_part() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{ "role": "user", "parts": [{ "text": "Hello" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("Hi there")))
            .expect(1)
            .mount(&server)
            .await;

        let out = test_client(&server.uri()).complete(None, "Hello").await.unwrap();
        assert_eq!(out, "Hi there");
    }

    #[tokio::test]
    async fn system_prompt_is_sent_as_system_instruction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(body_partial_json(json!({
                "systemInstruction": { "parts": [{ "text": DEFAULT_SYSTEM_PROMPT }] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let out = test_client(&server.uri())
            .complete(Some(DEFAULT_SYSTEM_PROMPT), "你好")
            .await
            .unwrap();
        assert_eq!(out, "ok");
    }

    #[test]
    fn request_without_system_prompt_omits_field() {
        let body = GenerateContentRequest {
            system_instruction: None,
            contents: vec![Content::text(Some("user"), "Hello")],
        };
        let v = serde_json::to_value(&body).unwrap();
        assert!(v.get("systemInstruction").is_none());
        assert_eq!(v["contents"][0]["parts"][0]["text"], "Hello");
    }

    #[tokio::test]
    async fn zero_candidates_is_extraction_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "promptFeedback": { "blockReason": "SAFETY" } })),
            )
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .complete(None, "Hello")
            .await
            .unwrap_err();
        assert!(err.is_extraction(), "unexpected error: {err}");
    }

    #[test]
    fn non_text_first_part_is_extraction_error() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [
                    { "inlineData": { "mimeType": "image/png", "data": "AAAA" } },
                    { "text": "ignored" }
                ] }
            }]
        }))
        .unwrap();
        let err = resp.first_text().unwrap_err();
        assert!(matches!(err, GeminiError::Extraction("first part is not text")));
    }

    #[test]
    fn candidate_without_parts_is_extraction_error() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        }))
        .unwrap();
        assert!(resp.first_text().unwrap_err().is_extraction());

        let empty: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "" }] } }]
        }))
        .unwrap();
        assert!(empty.first_text().unwrap_err().is_extraction());
    }

    #[test]
    fn whitespace_text_is_returned_not_rejected() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "  " }] } }]
        }))
        .unwrap();
        assert_eq!(resp.first_text().unwrap(), "  ");
    }

    #[tokio::test]
    async fn non_json_success_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .complete(None, "Hello")
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::Decode(_)), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn api_error_carries_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT" }
            })))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .complete(None, "Hello")
            .await
            .unwrap_err();
        match err {
            GeminiError::Api(msg) => {
                assert!(msg.contains("400"), "{msg}");
                assert!(msg.contains("API key not valid."), "{msg}");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_request_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let uri = format!("http://127.0.0.1:{}", port);
        let err = test_client(&uri).complete(None, "Hello").await.unwrap_err();
        assert!(matches!(err, GeminiError::Request(_)), "unexpected error: {err}");
    }
}
