//! Text and image generation on top of a [`GeminiBackend`].

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::GenerationError;
use crate::gemini::{
    FinishReason, GeminiBackend, GenerateContentRequest, GenerationConfig, ImageConfig, InlineData,
    Part,
};
use crate::settings::Settings;

/// Attempt budget with linear backoff: the n-th retry waits
/// `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const MAX_ATTEMPTS: u32 = 3;

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: Self::MAX_ATTEMPTS,
            base_delay: settings.retry_base_delay(),
        }
    }

    pub fn immediate() -> Self {
        Self {
            max_attempts: Self::MAX_ATTEMPTS,
            base_delay: Duration::ZERO,
        }
    }

    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        self.base_delay * failed_attempts
    }

    pub(crate) async fn pause(&self, failed_attempts: u32) {
        let delay = self.delay_after(failed_attempts);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn story_config() -> GenerationConfig {
    GenerationConfig {
        temperature: Some(0.7),
        top_k: Some(40),
        top_p: Some(0.95),
        ..GenerationConfig::default()
    }
}

/// Generates narrative text. Transient failures and empty answers are
/// retried within the policy's budget; everything else is returned as
/// soon as it happens.
#[instrument(skip(backend, prompt, retry), fields(prompt_len = prompt.len()))]
pub async fn generate_text<B: GeminiBackend>(
    backend: &B,
    model: &str,
    prompt: &str,
    retry: RetryPolicy,
) -> Result<String, GenerationError> {
    let request = GenerateContentRequest::from_parts(vec![Part::text(prompt)], story_config());
    let mut attempt = 0;

    loop {
        attempt += 1;
        let outcome = match backend.generate_content(model, &request).await {
            Ok(resp) if resp.is_blocked() => Err(GenerationError::Safety(format!(
                "text generation blocked ({})",
                resp.finish_reason().map(FinishReason::as_str).unwrap_or("prompt feedback")
            ))),
            Ok(resp) => resp
                .text()
                .ok_or_else(|| GenerationError::EmptyResponse("model returned no text".into())),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(text) => {
                debug!(attempt, text_len = text.len(), "text generated");
                return Ok(text);
            }
            Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                warn!(attempt, error = %e, "text generation failed, retrying");
                retry.pause(attempt).await;
            }
            Err(e) => {
                warn!(attempt, error = %e, "text generation failed");
                return Err(e);
            }
        }
    }
}

/// How closely a scene image must follow the character's reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReferenceStrength {
    Weak,
    #[default]
    Medium,
    Strong,
}

impl ReferenceStrength {
    pub fn instruction(&self) -> &'static str {
        match self {
            ReferenceStrength::Weak => "Use the attached image as a loose reference.",
            ReferenceStrength::Medium => "Maintain consistency with the attached reference image.",
            ReferenceStrength::Strong => {
                "Strictly follow the visual details and face of the attached reference image."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    Landscape,
    Portrait,
    Square,
    Standard,
    StandardPortrait,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Square => "1:1",
            AspectRatio::Standard => "4:3",
            AspectRatio::StandardPortrait => "3:4",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageTier {
    #[default]
    Fast,
    HighQuality,
}

impl ImageTier {
    pub fn model<'a>(&self, settings: &'a Settings) -> &'a str {
        match self {
            ImageTier::Fast => settings.image_model(),
            ImageTier::HighQuality => settings.hq_image_model(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageRequest<'a> {
    pub prompt: &'a str,
    pub reference: Option<&'a InlineData>,
    pub tier: ImageTier,
    pub aspect_ratio: AspectRatio,
    pub strength: ReferenceStrength,
}

pub(crate) fn build_image_request(req: &ImageRequest<'_>) -> GenerateContentRequest {
    let mut parts = Vec::with_capacity(2);
    let mut text = req.prompt.to_string();
    if let Some(reference) = req.reference {
        text.push(' ');
        text.push_str(req.strength.instruction());
        parts.push(Part::inline(reference.clone()));
    }
    parts.push(Part::text(text));

    GenerateContentRequest::from_parts(
        parts,
        GenerationConfig {
            response_modalities: Some(vec!["IMAGE".to_string()]),
            image_config: Some(ImageConfig {
                aspect_ratio: req.aspect_ratio.as_str().to_string(),
            }),
            ..GenerationConfig::default()
        },
    )
}

/// Renders one image and returns it as a `data:` URI. A single attempt;
/// callers decide whether to try again.
#[instrument(skip(backend, settings, req), fields(tier = ?req.tier, aspect = req.aspect_ratio.as_str(), has_reference = req.reference.is_some()))]
pub async fn generate_image<B: GeminiBackend>(
    backend: &B,
    settings: &Settings,
    req: &ImageRequest<'_>,
) -> Result<String, GenerationError> {
    let request = build_image_request(req);
    let resp = backend
        .generate_content(req.tier.model(settings), &request)
        .await?;

    let candidate = resp.first_candidate().ok_or(GenerationError::NoCandidates)?;
    match &candidate.finish_reason {
        Some(reason) if reason.is_safety() => {
            return Err(GenerationError::Safety(
                "the scene description may be too graphic; the image was blocked".to_string(),
            ))
        }
        Some(FinishReason::NoImage) => return Err(GenerationError::NoImage),
        Some(FinishReason::Stop) | None => {}
        Some(other) => return Err(GenerationError::AbnormalFinish(other.as_str().to_string())),
    }

    let image = resp.inline_image().ok_or(GenerationError::MissingImageData)?;
    info!(mime = %image.mime_type, bytes_b64 = image.data.len(), "image generated");
    Ok(format!("data:{};base64,{}", image.mime_type, image.data))
}
