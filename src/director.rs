//! Drives generation for one session: checks preconditions on the
//! session, calls the models, commits results and persists after every
//! change.

use tracing::{info, instrument, warn};

use crate::error::{friendly_message, GenerationError};
use crate::gemini::GeminiBackend;
use crate::generate::{
    generate_image, generate_text, AspectRatio, ImageRequest, ImageTier, RetryPolicy,
};
use crate::image_prompt::{character_preview_prompt, synthesize_image_prompt, SceneBrief, SceneKind};
use crate::media::parse_data_uri;
use crate::profile::CharacterProfile;
use crate::prompt::{ending_prompt, parse_scenario_response, prologue_prompt, ScenarioDraft};
use crate::session::{ImageTarget, Session, SessionError};
use crate::settings::Settings;
use crate::store::{persist_session, restore_session, PersistOutcome, SessionStore};

pub struct Director<B, S> {
    backend: B,
    store: S,
    settings: Settings,
    retry: RetryPolicy,
    session: Session,
}

impl<B: GeminiBackend, S: SessionStore> Director<B, S> {
    /// Picks up the saved session, or starts a new one.
    pub async fn resume(backend: B, store: S, settings: Settings) -> Self {
        let session = restore_session(&store).await.unwrap_or_default();
        Self::with_session(backend, store, settings, session)
    }

    pub fn with_session(backend: B, store: S, settings: Settings, session: Session) -> Self {
        let retry = RetryPolicy::from_settings(&settings);
        Self {
            backend,
            store,
            settings,
            retry,
            session,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn persist(&self) -> PersistOutcome {
        persist_session(&self.store, &self.session).await
    }

    /// Runs one session command and saves the result. Rejected commands
    /// leave the session untouched and are not saved.
    pub async fn apply<T>(
        &mut self,
        command: impl FnOnce(&mut Session) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let out = command(&mut self.session)?;
        self.persist().await;
        Ok(out)
    }

    async fn write_scene(&self, prompt: &str) -> Result<ScenarioDraft, GenerationError> {
        let raw = generate_text(&self.backend, self.settings.text_model(), prompt, self.retry).await?;
        let draft = parse_scenario_response(&raw);
        if draft.scenario.is_empty() {
            return Err(GenerationError::EmptyResponse(
                "response held only the composition tag".into(),
            ));
        }
        Ok(draft)
    }

    #[instrument(skip(self), fields(session = %self.session.id))]
    pub async fn generate_prologue(&mut self) -> Result<(), SessionError> {
        self.session.begin_prologue_text()?;
        self.persist().await;

        let prompt = {
            let s = &self.session;
            let character = s.character.as_ref().ok_or(SessionError::NotReady)?;
            prologue_prompt(&s.theme, character, &s.background)
        };
        let result = self.write_scene(&prompt).await;
        self.commit_text(result, Session::finish_prologue_text).await
    }

    #[instrument(skip(self), fields(session = %self.session.id, ending = self.session.current_ending_index))]
    pub async fn generate_ending(&mut self) -> Result<(), SessionError> {
        self.session.begin_ending_text()?;
        self.persist().await;

        let prompt = {
            let s = &self.session;
            let character = s.character.as_ref().ok_or(SessionError::NotReady)?;
            ending_prompt(
                &s.prologue.scenario,
                s.current_ending().ending_type,
                &s.theme,
                character,
                &s.background,
                Some(s.ending_suggestion.as_str()),
            )
        };
        let result = self.write_scene(&prompt).await;
        self.commit_text(result, Session::finish_ending_text).await
    }

    async fn commit_text(
        &mut self,
        result: Result<ScenarioDraft, GenerationError>,
        finish: fn(&mut Session, Result<(String, String), String>),
    ) -> Result<(), SessionError> {
        let outcome = match result {
            Ok(draft) => {
                info!(chars = draft.scenario.chars().count(), "scene written");
                finish(&mut self.session, Ok((draft.scenario, draft.composition)));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "scene generation failed");
                finish(&mut self.session, Err(friendly_message(&e)));
                Err(e.into())
            }
        };
        self.persist().await;
        outcome
    }

    pub async fn generate_prologue_image(&mut self) -> Result<(), SessionError> {
        self.generate_scene_image(ImageTarget::Prologue).await
    }

    pub async fn generate_ending_image(&mut self) -> Result<(), SessionError> {
        let index = self.session.current_ending_index;
        self.generate_scene_image(ImageTarget::Ending(index)).await
    }

    /// Prompt synthesis then rendering. Failures land on the image's own
    /// error slot; the global notice is left alone.
    #[instrument(skip(self), fields(session = %self.session.id))]
    async fn generate_scene_image(&mut self, target: ImageTarget) -> Result<(), SessionError> {
        self.session.begin_image(target)?;
        self.persist().await;

        let result = self.render_scene(target).await;
        let outcome = match result {
            Ok(url) => {
                self.session.finish_image(target, Ok(url))?;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "scene image failed");
                self.session.finish_image(target, Err(friendly_message(&e)))?;
                Err(e.into())
            }
        };
        self.persist().await;
        outcome
    }

    async fn render_scene(&mut self, target: ImageTarget) -> Result<String, GenerationError> {
        let s = &self.session;
        let character = s
            .character
            .clone()
            .ok_or_else(|| GenerationError::Precondition("캐릭터를 먼저 설정해주세요.".into()))?;
        let background = s.background.clone();
        let (unit, kind, title) = match target {
            ImageTarget::Prologue => (s.prologue.clone(), SceneKind::Prologue, None),
            ImageTarget::Ending(i) => {
                let ending = &s.endings[i];
                (ending.unit.clone(), SceneKind::Ending, Some(ending.title()))
            }
        };
        let strength = s.reference_strength;

        let brief = SceneBrief {
            scenario: &unit.scenario,
            kind,
            character: &character,
            background: &background,
            title,
            pose: Some(unit.composition.as_str()),
        };
        let prompt =
            synthesize_image_prompt(&self.backend, self.settings.prompt_model(), &brief, self.retry)
                .await?;
        self.session
            .record_image_prompt(target, prompt.clone())
            .map_err(|e| GenerationError::Precondition(e.to_string()))?;

        let reference = character.reference_image.as_deref().and_then(parse_data_uri);
        generate_image(
            &self.backend,
            &self.settings,
            &ImageRequest {
                prompt: &prompt,
                reference: reference.as_ref(),
                tier: ImageTier::Fast,
                aspect_ratio: AspectRatio::Landscape,
                strength,
            },
        )
        .await
    }

    pub async fn skip_image(&mut self, target: ImageTarget) -> Result<(), SessionError> {
        self.apply(|s| s.skip_image(target)).await
    }

    /// Renders a portrait for the character sheet. The caller decides
    /// whether to keep it as the profile's reference image.
    #[instrument(skip(self, profile))]
    pub async fn generate_character_preview(
        &mut self,
        profile: &CharacterProfile,
    ) -> Result<String, SessionError> {
        if self.session.is_busy() {
            return Err(SessionError::Busy);
        }
        profile.validate().map_err(SessionError::Precondition)?;

        let prompt = character_preview_prompt(profile);
        let req = ImageRequest {
            prompt: &prompt,
            reference: None,
            tier: ImageTier::HighQuality,
            aspect_ratio: AspectRatio::Portrait,
            strength: self.session.reference_strength,
        };
        generate_image(&self.backend, &self.settings, &req)
            .await
            .map_err(|e| {
                warn!(error = %e, "character preview failed");
                SessionError::Generation(e)
            })
    }
}
