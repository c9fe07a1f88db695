//! Scripted backend shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::GenerationError;
use crate::gemini::{
    Candidate, Content, FinishReason, GeminiBackend, GenerateContentRequest,
    GenerateContentResponse, InlineData, Part,
};

type Scripted = Result<GenerateContentResponse, GenerationError>;

/// Replays canned responses in order and records every request.
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<(String, GenerateContentRequest)>>,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<Scripted>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<(String, GenerateContentRequest)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<(String, GenerateContentRequest)> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl GeminiBackend for ScriptedBackend {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GenerationError> {
        self.requests
            .lock()
            .unwrap()
            .push((model.to_string(), request.clone()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Request("script exhausted".into())))
    }
}

pub fn with_finish(text: Option<&str>, finish: &str) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: Some(vec![Candidate {
            content: Some(Content {
                role: Some("model".into()),
                parts: text.map(Part::text).into_iter().collect(),
            }),
            finish_reason: Some(FinishReason::from(finish.to_string())),
        }]),
        prompt_feedback: None,
    }
}

pub fn text_response(text: &str) -> GenerateContentResponse {
    with_finish(Some(text), "STOP")
}

pub fn image_response(mime_type: &str, data: &str) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: Some(vec![Candidate {
            content: Some(Content {
                role: Some("model".into()),
                parts: vec![Part::inline(InlineData {
                    mime_type: mime_type.into(),
                    data: data.into(),
                })],
            }),
            finish_reason: Some(FinishReason::Stop),
        }]),
        prompt_feedback: None,
    }
}
