//! The playthrough aggregate and every command that mutates it.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::error::GenerationError;
use crate::generate::ReferenceStrength;
use crate::profile::{BackgroundProfile, CharacterProfile};
use crate::scenario::{EndingScenario, ScenarioUnit};

/// Seconds a global error notice stays up before it expires on its own.
pub const ERROR_NOTICE_SECS: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Page {
    #[default]
    Introduction,
    CharacterCreation,
    PrologueGeneration,
    EndingGeneration,
    FullScenario,
}

/// How the player answered the profile-change prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    Reset,
    Keep,
    Cancel,
}

/// Outcome of submitting a character profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Proceeded,
    ConflictPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTarget {
    Prologue,
    Ending(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorNotice {
    pub message: String,
    pub raised_at: OffsetDateTime,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Precondition(String),

    #[error("another generation is still running")]
    Busy,

    #[error("current scene is not finished yet")]
    NotReady,

    #[error("not available on page {0:?}")]
    WrongPage(Page),

    #[error("no profile change is waiting for a decision")]
    NoPendingProfile,

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub page: Page,
    pub character: Option<CharacterProfile>,
    pub theme: String,
    pub background: BackgroundProfile,
    pub prologue: ScenarioUnit,
    pub endings: [EndingScenario; 3],
    pub current_ending_index: usize,
    #[serde(default)]
    pub ending_suggestion: String,
    #[serde(default)]
    pub reference_strength: ReferenceStrength,

    #[serde(skip)]
    pub is_loading: bool,
    #[serde(skip)]
    pub error: Option<ErrorNotice>,
    #[serde(skip)]
    pub pending_profile: Option<CharacterProfile>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            page: Page::Introduction,
            character: None,
            theme: String::new(),
            background: BackgroundProfile::default(),
            prologue: ScenarioUnit::default(),
            endings: EndingScenario::initial_set(),
            current_ending_index: 0,
            ending_suggestion: String::new(),
            reference_strength: ReferenceStrength::default(),
            is_loading: false,
            error: None,
            pending_profile: None,
        }
    }

    /// Rebuilds a session read back from storage. A load that was running
    /// when the record was written can never finish, so its flag is
    /// dropped.
    pub fn restore(mut self) -> Self {
        self.is_loading = false;
        self.error = None;
        self.pending_profile = None;
        self.prologue.image.is_loading = false;
        for ending in &mut self.endings {
            ending.unit.image.is_loading = false;
        }
        if self.current_ending_index >= self.endings.len() {
            self.current_ending_index = self.endings.len() - 1;
        }
        self
    }

    /// Copy with every scene image URL removed; the character's reference
    /// image is kept.
    pub fn without_image_urls(&self) -> Session {
        let mut copy = self.clone();
        copy.prologue.image.url = None;
        for ending in &mut copy.endings {
            ending.unit.image.url = None;
        }
        copy
    }

    pub fn current_ending(&self) -> &EndingScenario {
        &self.endings[self.current_ending_index]
    }

    pub fn unit(&self, target: ImageTarget) -> Option<&ScenarioUnit> {
        match target {
            ImageTarget::Prologue => Some(&self.prologue),
            ImageTarget::Ending(i) => self.endings.get(i).map(|e| &e.unit),
        }
    }

    fn unit_mut(&mut self, target: ImageTarget) -> Result<&mut ScenarioUnit, SessionError> {
        match target {
            ImageTarget::Prologue => Ok(&mut self.prologue),
            ImageTarget::Ending(i) => self
                .endings
                .get_mut(i)
                .map(|e| &mut e.unit)
                .ok_or_else(|| SessionError::Precondition(format!("no ending at index {i}"))),
        }
    }

    /// Any generation running, text or image.
    pub fn is_busy(&self) -> bool {
        self.is_loading
            || self.prologue.image.is_loading
            || self.endings.iter().any(|e| e.unit.image.is_loading)
    }

    pub fn has_generated_content(&self) -> bool {
        self.prologue.is_generated || self.endings.iter().any(|e| e.unit.is_generated)
    }

    /// Whether "next" is enabled on the current page.
    pub fn can_advance(&self) -> bool {
        match self.page {
            Page::Introduction => true,
            Page::PrologueGeneration => self.prologue.is_ready(),
            Page::EndingGeneration => self.current_ending().unit.is_ready(),
            Page::CharacterCreation | Page::FullScenario => false,
        }
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        Ok(())
    }

    fn ensure_page(&self, page: Page) -> Result<(), SessionError> {
        if self.page != page {
            return Err(SessionError::WrongPage(self.page));
        }
        Ok(())
    }

    /// Every page change drops the global notice.
    fn navigate(&mut self, page: Page) {
        self.page = page;
        self.error = None;
    }

    fn enter_ending(&mut self, index: usize) {
        self.current_ending_index = index;
        self.background = self.endings[index]
            .ending_type
            .default_background(&self.background);
        self.navigate(Page::EndingGeneration);
    }

    // ---- navigation ----

    pub fn start(&mut self) -> Result<(), SessionError> {
        self.ensure_page(Page::Introduction)?;
        self.navigate(Page::CharacterCreation);
        Ok(())
    }

    /// Proceeds to the prologue, or parks the profile for a decision when
    /// it differs from one that already has scenes written for it.
    pub fn submit_character(&mut self, profile: CharacterProfile) -> Result<Submission, SessionError> {
        self.ensure_page(Page::CharacterCreation)?;
        self.ensure_idle()?;
        profile.validate().map_err(SessionError::Precondition)?;

        let changed = self
            .character
            .as_ref()
            .map_or(true, |current| !current.same_as(&profile));
        if changed && self.has_generated_content() {
            debug!("profile changed after generation, awaiting decision");
            self.pending_profile = Some(profile);
            return Ok(Submission::ConflictPending);
        }

        self.character = Some(profile);
        self.navigate(Page::PrologueGeneration);
        Ok(Submission::Proceeded)
    }

    pub fn resolve_conflict(&mut self, choice: ConflictChoice) -> Result<(), SessionError> {
        let profile = self
            .pending_profile
            .take()
            .ok_or(SessionError::NoPendingProfile)?;
        match choice {
            ConflictChoice::Cancel => return Ok(()),
            ConflictChoice::Reset => {
                self.prologue = ScenarioUnit::default();
                self.endings = EndingScenario::initial_set();
                self.current_ending_index = 0;
                self.ending_suggestion.clear();
            }
            ConflictChoice::Keep => {}
        }
        debug!(?choice, "profile conflict resolved");
        self.character = Some(profile);
        self.navigate(Page::PrologueGeneration);
        Ok(())
    }

    pub fn advance(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        match self.page {
            Page::Introduction => self.start(),
            Page::CharacterCreation => Err(SessionError::Precondition(
                "submit a character profile to continue".into(),
            )),
            Page::PrologueGeneration => {
                if !self.prologue.is_ready() {
                    return Err(SessionError::NotReady);
                }
                self.enter_ending(0);
                Ok(())
            }
            Page::EndingGeneration => {
                if !self.current_ending().unit.is_ready() {
                    return Err(SessionError::NotReady);
                }
                let next = self.current_ending_index + 1;
                if next < self.endings.len() {
                    self.enter_ending(next);
                    self.ending_suggestion.clear();
                } else {
                    self.navigate(Page::FullScenario);
                }
                Ok(())
            }
            Page::FullScenario => Err(SessionError::WrongPage(Page::FullScenario)),
        }
    }

    pub fn go_back(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        match self.page {
            Page::PrologueGeneration => self.navigate(Page::CharacterCreation),
            Page::EndingGeneration if self.current_ending_index == 0 => {
                self.navigate(Page::PrologueGeneration)
            }
            Page::EndingGeneration => self.enter_ending(self.current_ending_index - 1),
            other => return Err(SessionError::WrongPage(other)),
        }
        self.ending_suggestion.clear();
        Ok(())
    }

    /// Back to character creation from the summary; nothing is cleared.
    pub fn edit_from_summary(&mut self) -> Result<(), SessionError> {
        self.ensure_page(Page::FullScenario)?;
        self.navigate(Page::CharacterCreation);
        Ok(())
    }

    // ---- inputs ----

    pub fn set_theme(&mut self, theme: impl Into<String>) {
        self.theme = theme.into();
    }

    pub fn set_background(&mut self, background: BackgroundProfile) {
        self.background = background;
    }

    pub fn set_ending_suggestion(&mut self, suggestion: impl Into<String>) {
        self.ending_suggestion = suggestion.into();
    }

    pub fn set_reference_strength(&mut self, strength: ReferenceStrength) {
        self.reference_strength = strength;
    }

    // ---- generation lifecycle ----

    fn text_inputs(&self) -> Result<&CharacterProfile, SessionError> {
        if self.theme.trim().is_empty() {
            return Err(SessionError::Precondition("핵심 테마를 입력해주세요.".into()));
        }
        self.character
            .as_ref()
            .ok_or_else(|| SessionError::Precondition("캐릭터를 먼저 설정해주세요.".into()))
    }

    pub fn begin_prologue_text(&mut self) -> Result<(), SessionError> {
        self.ensure_page(Page::PrologueGeneration)?;
        self.ensure_idle()?;
        self.text_inputs()?;
        self.error = None;
        self.prologue = ScenarioUnit::default();
        self.is_loading = true;
        Ok(())
    }

    /// Stores the generated prologue. The previous scene and its picture
    /// were dropped when generation began.
    pub fn finish_prologue_text(&mut self, result: Result<(String, String), String>) {
        self.is_loading = false;
        match result {
            Ok((scenario, composition)) if !scenario.trim().is_empty() => {
                self.prologue = ScenarioUnit {
                    scenario,
                    composition,
                    is_generated: true,
                    ..ScenarioUnit::default()
                };
            }
            Ok(_) => self.raise_error("생성된 시나리오가 비어 있습니다. 다시 시도해주세요."),
            Err(message) => self.raise_error(message),
        }
    }

    pub fn begin_ending_text(&mut self) -> Result<(), SessionError> {
        self.ensure_page(Page::EndingGeneration)?;
        self.ensure_idle()?;
        self.text_inputs()?;
        if !self.prologue.has_text() {
            return Err(SessionError::Precondition("프롤로그를 먼저 생성해주세요.".into()));
        }
        self.error = None;
        self.endings[self.current_ending_index].unit = ScenarioUnit::default();
        self.is_loading = true;
        Ok(())
    }

    pub fn finish_ending_text(&mut self, result: Result<(String, String), String>) {
        self.is_loading = false;
        match result {
            Ok((scenario, composition)) if !scenario.trim().is_empty() => {
                let ending = &mut self.endings[self.current_ending_index];
                ending.unit = ScenarioUnit {
                    scenario,
                    composition,
                    is_generated: true,
                    ..ScenarioUnit::default()
                };
            }
            Ok(_) => self.raise_error("생성된 시나리오가 비어 있습니다. 다시 시도해주세요."),
            Err(message) => self.raise_error(message),
        }
    }

    fn image_target_allowed(&self, target: ImageTarget) -> Result<(), SessionError> {
        match target {
            ImageTarget::Prologue => self.ensure_page(Page::PrologueGeneration),
            ImageTarget::Ending(i) => {
                self.ensure_page(Page::EndingGeneration)?;
                if i != self.current_ending_index {
                    return Err(SessionError::Precondition(format!(
                        "ending {i} is not the current scene"
                    )));
                }
                Ok(())
            }
        }
    }

    pub fn begin_image(&mut self, target: ImageTarget) -> Result<(), SessionError> {
        self.image_target_allowed(target)?;
        self.ensure_idle()?;
        if self.character.is_none() {
            return Err(SessionError::Precondition("캐릭터를 먼저 설정해주세요.".into()));
        }
        let unit = self.unit_mut(target)?;
        if !unit.has_text() {
            return Err(SessionError::Precondition(
                "이미지를 만들려면 시나리오를 먼저 생성해주세요.".into(),
            ));
        }
        unit.image.start();
        Ok(())
    }

    pub fn record_image_prompt(&mut self, target: ImageTarget, prompt: String) -> Result<(), SessionError> {
        self.unit_mut(target)?.image.prompt = Some(prompt);
        Ok(())
    }

    pub fn finish_image(&mut self, target: ImageTarget, result: Result<String, String>) -> Result<(), SessionError> {
        let image = &mut self.unit_mut(target)?.image;
        match result {
            Ok(url) => image.complete(url),
            Err(message) => image.fail(message),
        }
        Ok(())
    }

    pub fn skip_image(&mut self, target: ImageTarget) -> Result<(), SessionError> {
        self.image_target_allowed(target)?;
        self.ensure_idle()?;
        let unit = self.unit_mut(target)?;
        if !unit.has_text() {
            return Err(SessionError::Precondition(
                "시나리오를 먼저 생성해주세요.".into(),
            ));
        }
        unit.image.skip();
        Ok(())
    }

    pub fn dismiss_image_error(&mut self, target: ImageTarget) -> Result<(), SessionError> {
        self.unit_mut(target)?.image.error = None;
        Ok(())
    }

    // ---- global notice ----

    pub fn raise_error(&mut self, message: impl Into<String>) {
        self.error = Some(ErrorNotice {
            message: message.into(),
            raised_at: OffsetDateTime::now_utc(),
        });
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Drops the notice once it has been visible long enough. Returns
    /// whether it was removed.
    pub fn expire_error(&mut self, now: OffsetDateTime) -> bool {
        let expired = self
            .error
            .as_ref()
            .is_some_and(|n| now - n.raised_at >= time::Duration::seconds(ERROR_NOTICE_SECS));
        if expired {
            self.error = None;
        }
        expired
    }
}
