use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::GenerationError;
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline(data: InlineData) -> Self {
        Self {
            text: None,
            inline_data: Some(data),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

/// Creative content about disasters trips the default filters, so all
/// four harm categories are opened up.
pub fn permissive_safety_settings() -> Vec<SafetySetting> {
    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .into_iter()
    .map(|category| SafetySetting {
        category: category.to_string(),
        threshold: "BLOCK_NONE".to_string(),
    })
    .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_settings: Vec<SafetySetting>,
}

impl GenerateContentRequest {
    pub fn from_parts(parts: Vec<Part>, config: GenerationConfig) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: Some(config),
            safety_settings: permissive_safety_settings(),
        }
    }

    /// Concatenated text of every part, for logging and test assertions.
    pub fn prompt_text(&self) -> String {
        self.contents
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    ProhibitedContent,
    ImageSafety,
    NoImage,
    Other(String),
}

impl FinishReason {
    pub fn is_safety(&self) -> bool {
        matches!(
            self,
            FinishReason::Safety | FinishReason::ProhibitedContent | FinishReason::ImageSafety
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "STOP",
            FinishReason::MaxTokens => "MAX_TOKENS",
            FinishReason::Safety => "SAFETY",
            FinishReason::ProhibitedContent => "PROHIBITED_CONTENT",
            FinishReason::ImageSafety => "IMAGE_SAFETY",
            FinishReason::NoImage => "NO_IMAGE",
            FinishReason::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for FinishReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::MaxTokens,
            "SAFETY" => FinishReason::Safety,
            "PROHIBITED_CONTENT" => FinishReason::ProhibitedContent,
            "IMAGE_SAFETY" => FinishReason::ImageSafety,
            "NO_IMAGE" => FinishReason::NoImage,
            _ => FinishReason::Other(s),
        }
    }
}

impl From<FinishReason> for String {
    fn from(r: FinishReason) -> Self {
        r.as_str().to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    pub fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.as_ref().and_then(|c| c.first())
    }

    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.first_candidate().and_then(|c| c.finish_reason.as_ref())
    }

    /// Text parts of the first candidate joined together; `None` when
    /// there is no non-empty text.
    pub fn text(&self) -> Option<String> {
        let parts = self.first_candidate()?.content.as_ref()?.parts.iter();
        let text: String = parts.filter_map(|p| p.text.as_deref()).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn inline_image(&self) -> Option<&InlineData> {
        self.first_candidate()?
            .content
            .as_ref()?
            .parts
            .iter()
            .find_map(|p| p.inline_data.as_ref())
    }

    /// The request was refused before any candidate was produced, or the
    /// candidate stopped on a safety filter.
    pub fn is_blocked(&self) -> bool {
        let feedback_blocked = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_ref())
            .is_some();
        feedback_blocked || self.finish_reason().is_some_and(FinishReason::is_safety)
    }
}

/// Transport to the generative service. The HTTP implementation talks
/// to Gemini; tests substitute a scripted one.
#[allow(async_fn_in_trait)]
pub trait GeminiBackend {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GenerationError>;
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Maps a non-success HTTP answer to the error taxonomy.
pub fn classify_http_failure(status: u16, body: &str) -> GenerationError {
    let (message, api_status) = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .map(|e| (e.message, e.status))
        .unwrap_or_else(|| (body.trim().to_string(), String::new()));
    let detail = format!("HTTP {status} {api_status}: {message}");

    let key_rejected = message.contains("API key not valid") || message.contains("API_KEY_INVALID");
    if status == 401
        || status == 403
        || key_rejected
        || api_status == "PERMISSION_DENIED"
        || api_status == "UNAUTHENTICATED"
    {
        return GenerationError::Auth(detail);
    }
    if status == 429 || api_status == "RESOURCE_EXHAUSTED" {
        return GenerationError::Quota(detail);
    }
    if matches!(status, 500 | 502 | 503 | 504)
        || matches!(api_status.as_str(), "INTERNAL" | "UNAVAILABLE" | "DEADLINE_EXCEEDED")
    {
        return GenerationError::Transient(detail);
    }
    GenerationError::Request(detail)
}

/// reqwest-backed client for the `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiHttp {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiHttp {
    pub fn from_settings(settings: &Settings) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs()))
            .build()
            .map_err(|e| GenerationError::Config(format!("http client: {e}")))?;
        let api_key = settings.resolve_api_key();
        if api_key.is_none() {
            warn!("Gemini API key not set; generation calls will fail until one is configured");
        }
        Ok(Self {
            client,
            base_url: settings.api_base_url().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl GeminiBackend for GeminiHttp {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GenerationError::Config("Gemini API key not set".to_string()))?;

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        debug!(model, prompt_len = request.prompt_text().len(), "gemini request");

        let resp = self
            .client
            .post(url)
            .header("X-goog-api-key", api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    GenerationError::Transient(format!("gemini request failed: {e}"))
                } else {
                    GenerationError::Request(format!("gemini request failed: {e}"))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_http_failure(status.as_u16(), &body));
        }

        resp.json::<GenerateContentResponse>()
            .await
            .map_err(|e| GenerationError::Request(format!("gemini parse error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    #[test]
    fn http_failures_are_classified() {
        let invalid_key = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(classify_http_failure(400, invalid_key).class(), ErrorClass::Auth);
        assert_eq!(classify_http_failure(403, "").class(), ErrorClass::Auth);

        let quota = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(classify_http_failure(429, quota).class(), ErrorClass::Quota);

        let internal = r#"{"error":{"code":500,"message":"An internal error has occurred","status":"INTERNAL"}}"#;
        let err = classify_http_failure(500, internal);
        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(err.is_retryable());
        assert_eq!(classify_http_failure(503, "overloaded").class(), ErrorClass::Transient);

        assert_eq!(classify_http_failure(404, "not found").class(), ErrorClass::Request);
    }

    #[test]
    fn response_helpers_read_wire_format() {
        let body = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Hello "},
                    {"inlineData": {"mimeType": "image/png", "data": "iVBORw0"}},
                    {"text": "world"}
                ]},
                "finishReason": "STOP"
            }]
        }"#;
        let resp: GenerateContentResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.text().as_deref(), Some("Hello world"));
        assert_eq!(resp.inline_image().map(|d| d.mime_type.as_str()), Some("image/png"));
        assert_eq!(resp.finish_reason(), Some(&FinishReason::Stop));
        assert!(!resp.is_blocked());

        let blocked: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"OTHER"}}"#).unwrap();
        assert!(blocked.is_blocked());
        assert!(blocked.text().is_none());

        let odd: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"RECITATION"}]}"#).unwrap();
        assert_eq!(odd.finish_reason(), Some(&FinishReason::Other("RECITATION".into())));
    }

    #[test]
    fn request_serializes_camel_case() {
        let req = GenerateContentRequest::from_parts(
            vec![Part::text("hi")],
            GenerationConfig {
                temperature: Some(0.7),
                top_k: Some(40),
                ..GenerationConfig::default()
            },
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert!(json["generationConfig"].get("topP").is_none());
        assert_eq!(json["safetySettings"].as_array().map(Vec::len), Some(4));
        assert_eq!(json["safetySettings"][0]["threshold"], "BLOCK_NONE");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
    }
}
