//! Turns a written scene into an English prompt for the image model.
//!
//! A secondary text model writes the final prompt. If it refuses the
//! standard request, either explicitly (safety finish reason) or silently
//! (no text), a stricter symbolic request is sent instead.

use tracing::{debug, info, instrument, warn};

use crate::error::GenerationError;
use crate::gemini::{
    FinishReason, GeminiBackend, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, Part,
};
use crate::generate::RetryPolicy;
use crate::profile::{BackgroundProfile, CharacterProfile};
use crate::prompt::DEFAULT_COMPOSITION;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneKind {
    Prologue,
    Ending,
}

/// Everything the synthesizer needs to describe one scene.
#[derive(Debug, Clone)]
pub struct SceneBrief<'a> {
    pub scenario: &'a str,
    pub kind: SceneKind,
    pub character: &'a CharacterProfile,
    pub background: &'a BackgroundProfile,
    pub title: Option<&'a str>,
    pub pose: Option<&'a str>,
}

impl SceneBrief<'_> {
    fn camera_and_pose(&self) -> String {
        let pose = self
            .pose
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_COMPOSITION);
        format!("{}, {}", self.background.composition.camera_keywords(), pose)
    }

    fn context(&self) -> String {
        match self.kind {
            SceneKind::Prologue => "Prologue of a carbon crisis game".to_string(),
            SceneKind::Ending => format!("Ending: {}", self.title.unwrap_or("")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPass {
    Standard,
    Fallback,
}

/// What one call to the prompt model produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    Prompt(String),
    SafetyRejected,
    Empty(Option<FinishReason>),
}

impl PassOutcome {
    pub fn classify(resp: &GenerateContentResponse) -> Self {
        if resp.is_blocked() {
            return PassOutcome::SafetyRejected;
        }
        match resp.text() {
            Some(text) => PassOutcome::Prompt(text),
            None => PassOutcome::Empty(resp.finish_reason().cloned()),
        }
    }
}

pub fn standard_request_text(brief: &SceneBrief<'_>) -> String {
    let style = brief.character.art_style.english();
    let mood = brief.background.mood.english();
    format!(
        r#"You are an expert prompt engineer for image generation models.
Write one highly detailed, descriptive prompt for an illustration of the scenario below.

Input:
- Context: {context}
- Scenario: "{scenario}"
- Character: {character}
- Style: {style}
- Setting: {setting}
- Mood: {mood}
- Camera & Pose: {camera} (follow this structure strictly)

Instructions:
1. Pick the most visually striking moment of the scenario.
2. Describe clothing textures, lighting and background details that reflect the carbon crisis theme.
3. Frame the image with the camera part of 'Camera & Pose' and depict the character's action with its pose part.
4. Keep the content PG-13 and suitable for general audiences. Represent any crisis or conflict symbolically or artistically; no gore, extreme violence or other prohibited content. Focus on atmosphere and emotion.
5. Return ONLY the English prompt text, without prefixes such as "Prompt:".

Quality keywords for the style:
"{tags}""#,
        context = brief.context(),
        scenario = brief.scenario,
        character = brief.character.english_description(),
        setting = brief.background.english_setting(),
        camera = brief.camera_and_pose(),
        tags = brief.character.art_style.quality_tags(),
    )
}

pub fn fallback_request_text(brief: &SceneBrief<'_>) -> String {
    let style = brief.character.art_style.english();
    let mood = brief.background.mood.english();
    let context = match brief.kind {
        SceneKind::Prologue => "Prologue".to_string(),
        SceneKind::Ending => format!("Ending: {}", brief.title.unwrap_or("")),
    };
    format!(
        r#"You are an expert prompt engineer for image generation models.
A previous request for this scene was flagged by a safety filter.
Write a safe, symbolic and atmospheric image prompt that carries the mood of the scene while leaving out any explicit depiction of violence, disaster or suffering.

Input:
- Context: {context} (carbon crisis theme)
- Mood: {mood}
- Setting: {setting}
- Character: {character}
- Style: {style}
- Camera: {camera}

Instructions:
1. Convey the emotion (tension, melancholy, hope) through lighting, color and environment, without showing its cause.
2. Use metaphors such as a withered flower, a looming shadow or a ray of light instead of literal crisis imagery.
3. Show the character reacting or contemplating, never harmed or in immediate danger.
4. Absolutely no gore, violence, destruction or disturbing imagery. Keep it PG and artistic.
5. Return ONLY the English prompt text.

Quality keywords for the style:
"{tags}""#,
        setting = brief.background.english_setting(),
        character = brief.character.english_description(),
        camera = brief.camera_and_pose(),
        tags = brief.character.art_style.quality_tags(),
    )
}

fn request_for(pass: PromptPass, brief: &SceneBrief<'_>) -> GenerateContentRequest {
    let text = match pass {
        PromptPass::Standard => standard_request_text(brief),
        PromptPass::Fallback => fallback_request_text(brief),
    };
    GenerateContentRequest::from_parts(
        vec![Part::text(text)],
        GenerationConfig {
            temperature: Some(0.7),
            response_mime_type: Some("text/plain".to_string()),
            ..GenerationConfig::default()
        },
    )
}

/// Removes a surrounding markdown code fence (with an optional
/// `text`/`plaintext`/`en`/`english` tag) and trims the result.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed.to_string();
    };
    let inner = ["plaintext", "english", "text", "en"]
        .iter()
        .find_map(|tag| {
            inner
                .strip_prefix(tag)
                .filter(|rest| rest.starts_with(char::is_whitespace))
        })
        .unwrap_or(inner);
    inner.trim().to_string()
}

/// Two-pass prompt synthesis. Switching from the standard to the
/// fallback pass spends no attempt; service failures and empty fallback
/// answers spend one each.
#[instrument(skip(backend, brief, retry), fields(kind = ?brief.kind))]
pub async fn synthesize_image_prompt<B: GeminiBackend>(
    backend: &B,
    model: &str,
    brief: &SceneBrief<'_>,
    retry: RetryPolicy,
) -> Result<String, GenerationError> {
    let mut pass = PromptPass::Standard;
    let mut failed_attempts = 0;

    loop {
        let request = request_for(pass, brief);
        let failure = match backend.generate_content(model, &request).await {
            Ok(resp) => match (PassOutcome::classify(&resp), pass) {
                (PassOutcome::Prompt(text), _) => {
                    let prompt = strip_code_fence(&text);
                    info!(?pass, prompt_len = prompt.len(), "image prompt ready");
                    return Ok(prompt);
                }
                (PassOutcome::SafetyRejected, PromptPass::Standard) => {
                    warn!("standard image prompt rejected by safety filter, switching to fallback");
                    pass = PromptPass::Fallback;
                    continue;
                }
                (PassOutcome::Empty(_), PromptPass::Standard) => {
                    warn!("standard image prompt came back empty, switching to fallback");
                    pass = PromptPass::Fallback;
                    continue;
                }
                (PassOutcome::SafetyRejected, PromptPass::Fallback) => {
                    warn!("fallback image prompt also rejected by safety filter");
                    return Err(GenerationError::Safety(
                        "image description blocked even in symbolic mode".to_string(),
                    ));
                }
                (PassOutcome::Empty(reason), PromptPass::Fallback) => match reason {
                    Some(r) if r != FinishReason::Stop => {
                        GenerationError::AbnormalFinish(r.as_str().to_string())
                    }
                    _ => GenerationError::EmptyResponse("prompt model returned no text".into()),
                },
            },
            Err(e) => e,
        };

        failed_attempts += 1;
        let retryable = failure.is_retryable() || matches!(failure, GenerationError::AbnormalFinish(_));
        if !retryable || failed_attempts >= retry.max_attempts {
            warn!(failed_attempts, error = %failure, "image prompt synthesis failed");
            return Err(failure);
        }
        debug!(failed_attempts, error = %failure, "retrying image prompt synthesis");
        retry.pause(failed_attempts).await;
    }
}

/// Rule-based prompt for the character sheet preview; no text model
/// involved.
pub fn character_preview_prompt(profile: &CharacterProfile) -> String {
    let style = &profile.art_style;
    let shot = if style.is_illustrated() {
        "Waist-up portrait, character centered, looking at viewer, illustration composition"
    } else {
        "Waist-up portrait, 85mm lens, f/1.8, bokeh, character centered, looking at viewer"
    };
    [
        format!("**Art Style**: {}", style.english()),
        format!(
            "**Character**: A {} {} {} {}",
            profile.age.english(),
            profile.nationality.english(),
            profile.gender.english(),
            profile.occupation.english()
        ),
        format!("**Outfit**: wearing {}", profile.outfit.english(&profile.occupation)),
        format!("**Shot**: {shot}"),
        "**Background**: Simple white background, studio lighting, clean isolated background"
            .to_string(),
        format!("**Visual Style**: {}", style.quality_tags()),
    ]
    .join(", ")
}
