use serde::{Deserialize, Serialize};

use crate::profile::{BackgroundProfile, CameraComposition, Mood, TimeOfDay, Weather};

/// The three outcomes every playthrough is written towards, in the
/// order they are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndingType {
    CarbonNeutralitySuccess,
    CarbonNeutralityFailure,
    ResidentHappinessFailure,
}

impl EndingType {
    pub const ORDERED: [EndingType; 3] = [
        EndingType::CarbonNeutralitySuccess,
        EndingType::CarbonNeutralityFailure,
        EndingType::ResidentHappinessFailure,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            EndingType::CarbonNeutralitySuccess => "탄소중립 성공",
            EndingType::CarbonNeutralityFailure => "탄소 중립 실패",
            EndingType::ResidentHappinessFailure => "행복도 관리 실패",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            EndingType::CarbonNeutralitySuccess => "탄소 중립에 성공하여 문제가 해결된 미래",
            EndingType::CarbonNeutralityFailure => "탄소중립에 실패하여 문제가 악화된 미래",
            EndingType::ResidentHappinessFailure => "탄소중립을 시도하다 사람들의 반발이 심해진 미래",
        }
    }

    /// Writing direction handed to the text model for this outcome.
    pub fn directive(&self) -> &'static str {
        match self {
            EndingType::CarbonNeutralitySuccess => {
                "탄소중립에 완벽히 성공하여 핵심 테마와 관련된 문제가 모두 해결된 밝은 미래를 분명한 해피엔딩으로 그려주세요. \
                 이 성공이 사람들과 자연에 가져온 긍정적인 변화와 행복한 감정을 구체적으로 묘사하고, \
                 성취감과 기쁨이 느껴지는 등장인물의 대사를 포함해주세요."
            }
            EndingType::CarbonNeutralityFailure => {
                "탄소중립 노력이 실패로 돌아가 핵심 테마와 관련된 탄소 배출 문제가 더욱 악화된 절망적인 미래를 그려주세요. \
                 이 비극적인 상황 속 등장인물의 대사를 포함해주세요."
            }
            EndingType::ResidentHappinessFailure => {
                "탄소중립 정책을 밀어붙이는 과정에서 시민들의 거센 반발로 사회적 갈등이 깊어지고 주민 행복도 관리에 실패한 미래를 그려주세요. \
                 이 상황이 핵심 테마와 어떻게 이어지는지, 탄소 감축 노력에 어떤 영향을 주었는지(정책 후퇴, 부분적 성공 뒤의 사회 불안 등) 구체적으로 보여주고, \
                 등장인물의 대사를 포함해주세요."
            }
        }
    }

    /// Scene defaults applied when the player reaches this ending. The
    /// location is always carried over from the current background.
    pub fn default_background(&self, current: &BackgroundProfile) -> BackgroundProfile {
        let (weather, time_of_day, mood, composition) = match self {
            EndingType::CarbonNeutralitySuccess => (
                Weather::Clear,
                TimeOfDay::Midday,
                Mood::Lively,
                CameraComposition::EnvironmentFocus,
            ),
            EndingType::CarbonNeutralityFailure => (
                Weather::Cloudy,
                TimeOfDay::Night,
                Mood::Empty,
                CameraComposition::Balanced,
            ),
            EndingType::ResidentHappinessFailure => (
                Weather::Cloudy,
                TimeOfDay::Sunset,
                Mood::Urgent,
                CameraComposition::CharacterFocus,
            ),
        };
        BackgroundProfile {
            space: current.space.clone(),
            weather,
            time_of_day,
            mood,
            composition,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageState {
    pub is_loading: bool,
    pub is_generated: bool,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub skipped: bool,
    /// Prompt actually sent to the image model, kept for transparency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl ImageState {
    /// An image exists or the player chose to go on without one.
    pub fn is_ready(&self) -> bool {
        self.is_generated || self.url.is_some() || self.skipped
    }

    pub(crate) fn start(&mut self) {
        self.is_loading = true;
        self.is_generated = false;
        self.error = None;
        self.skipped = false;
    }

    pub(crate) fn complete(&mut self, url: String) {
        self.is_loading = false;
        self.is_generated = true;
        self.url = Some(url);
        self.error = None;
    }

    /// Keeps any previous image on screen alongside the error.
    pub(crate) fn fail(&mut self, message: String) {
        self.is_loading = false;
        self.is_generated = self.url.is_some();
        self.error = Some(message);
    }

    pub(crate) fn skip(&mut self) {
        self.skipped = true;
        self.error = None;
    }
}

/// One generated narrative segment with its illustration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScenarioUnit {
    pub scenario: String,
    /// Pose/action phrase extracted from the model output; never shown.
    pub composition: String,
    pub is_generated: bool,
    pub image: ImageState,
}

impl ScenarioUnit {
    pub fn has_text(&self) -> bool {
        self.is_generated && !self.scenario.is_empty()
    }

    /// Text is done and the image step is resolved one way or another.
    pub fn is_ready(&self) -> bool {
        self.has_text() && self.image.is_ready()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndingScenario {
    #[serde(rename = "type")]
    pub ending_type: EndingType,
    #[serde(flatten)]
    pub unit: ScenarioUnit,
}

impl EndingScenario {
    pub fn new(ending_type: EndingType) -> Self {
        Self {
            ending_type,
            unit: ScenarioUnit::default(),
        }
    }

    pub fn title(&self) -> &'static str {
        self.ending_type.title()
    }

    pub fn initial_set() -> [EndingScenario; 3] {
        EndingType::ORDERED.map(EndingScenario::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Space;

    #[test]
    fn ending_defaults_keep_location() {
        let current = BackgroundProfile {
            space: Space::Other("floating market".into()),
            ..BackgroundProfile::default()
        };
        for ending in EndingType::ORDERED {
            let bg = ending.default_background(&current);
            assert_eq!(bg.space, current.space);
        }
        let last = EndingType::ResidentHappinessFailure.default_background(&current);
        assert_eq!(last.composition, CameraComposition::CharacterFocus);
        assert_eq!(last.time_of_day, TimeOfDay::Sunset);
    }

    #[test]
    fn image_failure_keeps_previous_picture() {
        let mut image = ImageState::default();
        image.start();
        image.complete("data:image/png;base64,AAA".into());
        image.start();
        image.fail("boom".into());
        assert!(image.is_generated);
        assert_eq!(image.url.as_deref(), Some("data:image/png;base64,AAA"));
        assert_eq!(image.error.as_deref(), Some("boom"));

        let mut fresh = ImageState::default();
        fresh.start();
        fresh.fail("boom".into());
        assert!(!fresh.is_generated);
        assert!(!fresh.is_ready());
    }

    #[test]
    fn skipped_image_counts_as_ready() {
        let mut unit = ScenarioUnit {
            scenario: "글".into(),
            is_generated: true,
            ..ScenarioUnit::default()
        };
        assert!(!unit.is_ready());
        unit.image.skip();
        assert!(unit.is_ready());
    }

    #[test]
    fn ending_serializes_flat() {
        let ending = EndingScenario::new(EndingType::CarbonNeutralityFailure);
        let json = serde_json::to_value(&ending).unwrap();
        assert_eq!(json["type"], "CARBON_NEUTRALITY_FAILURE");
        assert_eq!(json["isGenerated"], false);
        let back: EndingScenario = serde_json::from_value(json).unwrap();
        assert_eq!(back, ending);
    }
}
