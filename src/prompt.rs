//! Scenario prompts for the text model and parsing of what comes back.

use crate::profile::{BackgroundProfile, CharacterProfile};
use crate::scenario::EndingType;

/// Hard ceiling on the length of the generated narrative, in characters.
pub const MAX_SCENARIO_CHARS: usize = 700;

/// Pose used when the model leaves the composition tag out or empty.
pub const DEFAULT_COMPOSITION: &str = "character standing naturally";

const COMPOSITION_OPEN: &str = "<composition>";
const COMPOSITION_CLOSE: &str = "</composition>";

/// Narrative text split from the hidden pose directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioDraft {
    pub scenario: String,
    pub composition: String,
}

fn format_scenario_prompt(
    role: &str,
    instruction: &str,
    theme: &str,
    character: &CharacterProfile,
    background: &BackgroundProfile,
    extra_context: &str,
) -> String {
    let name = match character.display_name() {
        Some(name) => format!("\"{name}\""),
        None => "Unnamed (refer to them as the protagonist)".to_string(),
    };

    format!(
        r#"Role: {role}
Task: {instruction}

---
[Key Theme & Context]
Theme: "{theme}"
{extra_context}

[Character Profile]
- Name: {name}
- Demographics: {age}, {gender}, {nationality}
- Occupation/Role: {occupation}
- Appearance: Wearing {outfit}

[Scene Setting]
- Location: {space}
- Weather/Time: {weather}, {time_of_day}
- Mood: {mood}
---

[Writing Guidelines]
1. Structure: Write exactly 2 narrative paragraphs separated by a blank line, followed by exactly 1 line of dialogue.
   - Paragraph 1: the scene, its atmosphere and sensory detail.
   - Paragraph 2: the character's concrete action, thought or reaction.
   - Dialogue: one line spoken by the character or a key supporting character.
2. Language: Korean, natural novel-style prose.
3. Tone: {mood}, consistent with the theme.
4. Length: strictly under {max_chars} characters in total.
5. Formatting: no markdown headers or labels, only the raw text.
6. Visual guidance: after everything else, add a tag <Composition>...</Composition> containing a short English phrase that describes ONLY the character's pose and action in this scene.
   - Do NOT mention camera angles, lenses or shot types (such as "close-up" or "wide shot"); framing is added separately.
   - Example: "kneeling beside a withered plant with a worried expression"

Response format example:
[Paragraph 1]

[Paragraph 2]

"[One line of dialogue]"

<Composition>
looking up at the sky with hope, holding a seed
</Composition>
"#,
        age = character.age,
        gender = character.gender,
        nationality = character.nationality,
        occupation = character.occupation,
        outfit = character.outfit,
        space = background.space,
        weather = background.weather,
        time_of_day = background.time_of_day,
        mood = background.mood,
        max_chars = MAX_SCENARIO_CHARS,
    )
}

pub fn prologue_prompt(
    theme: &str,
    character: &CharacterProfile,
    background: &BackgroundProfile,
) -> String {
    let instruction = format!(
        "Write the prologue of a game about the carbon crisis. Show the calm before the storm: \
         subtle signs of \"{theme}\" creeping into daily life, seen through the eyes of a {}. \
         Do not resolve the conflict; leave tension and curiosity.",
        character.occupation
    );
    format_scenario_prompt(
        "Interactive fiction writer specialising in eco-thrillers",
        &instruction,
        theme,
        character,
        background,
        "",
    )
}

pub fn ending_prompt(
    prologue: &str,
    ending: EndingType,
    theme: &str,
    character: &CharacterProfile,
    background: &BackgroundProfile,
    suggestion: Option<&str>,
) -> String {
    let mut extra_context = format!(
        "Previous Story (Prologue):\n\"\"\"\n{prologue}\n\"\"\"\n\nEnding Type: {}\nSpecific Direction: {}",
        ending.title(),
        ending.directive()
    );
    if let Some(twist) = suggestion.map(str::trim).filter(|s| !s.is_empty()) {
        extra_context.push_str(&format!(
            "\nPlayer's Creative Twist: \"{twist}\" (weave this in naturally)"
        ));
    }

    let instruction = format!(
        "Write the ending that follows the prologue and the theme. The outcome must clearly be \
         the \"{}\" scenario. Convey the emotion fully (joy and hope for success, despair and \
         regret for failure). Do not state the ending title in the text.",
        ending.title()
    );

    format_scenario_prompt(
        "Game scenario writer",
        &instruction,
        theme,
        character,
        background,
        &extra_context,
    )
}

/// Splits the model output into visible prose and the pose directive.
/// The tag is matched case-insensitively; a missing or empty tag yields
/// [`DEFAULT_COMPOSITION`].
pub fn parse_scenario_response(raw: &str) -> ScenarioDraft {
    // ASCII lowercasing keeps byte offsets aligned with `raw`.
    let folded = raw.to_ascii_lowercase();

    let tag = folded.find(COMPOSITION_OPEN).and_then(|start| {
        let inner_start = start + COMPOSITION_OPEN.len();
        folded[inner_start..]
            .find(COMPOSITION_CLOSE)
            .map(|rel| (start, inner_start, inner_start + rel))
    });

    match tag {
        Some((start, inner_start, inner_end)) => {
            let end = inner_end + COMPOSITION_CLOSE.len();
            let composition = raw[inner_start..inner_end].trim();
            let scenario = format!("{}{}", &raw[..start], &raw[end..]);
            ScenarioDraft {
                scenario: scenario.trim().to_string(),
                composition: if composition.is_empty() {
                    DEFAULT_COMPOSITION.to_string()
                } else {
                    composition.to_string()
                },
            }
        }
        None => ScenarioDraft {
            scenario: raw.trim().to_string(),
            composition: DEFAULT_COMPOSITION.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{
        AgeBracket, ArtStyle, CameraComposition, Gender, Mood, Nationality, Occupation, Outfit,
        Space, TimeOfDay, Weather,
    };

    fn profile() -> CharacterProfile {
        CharacterProfile {
            name: Some("서연".into()),
            gender: Gender::Female,
            age: AgeBracket::YoungAdult,
            nationality: Nationality::Other("투발루".into()),
            occupation: Occupation::Scientist,
            outfit: Outfit::Other("노란 우비".into()),
            art_style: ArtStyle::Webtoon,
            reference_image: None,
        }
    }

    #[test]
    fn prologue_prompt_embeds_theme_and_profile() {
        let theme = "해수면 상승으로 인한 도시 침몰";
        let background = BackgroundProfile {
            space: Space::Park,
            weather: Weather::Rain,
            time_of_day: TimeOfDay::Night,
            mood: Mood::Urgent,
            composition: CameraComposition::CharacterFocus,
        };
        let prompt = prologue_prompt(theme, &profile(), &background);

        for needle in [
            theme, "서연", "여", "청년", "투발루", "과학자", "노란 우비", "공원", "비", "밤", "긴박한",
        ] {
            assert!(prompt.contains(needle), "missing {needle}");
        }
        assert!(prompt.contains("exactly 2 narrative paragraphs"));
        assert!(prompt.contains("Korean"));
        assert!(prompt.contains("700"));
        assert!(prompt.contains("<Composition>"));
    }

    #[test]
    fn unnamed_character_is_the_protagonist() {
        let mut character = profile();
        character.name = Some("   ".into());
        let prompt = prologue_prompt("가뭄", &character, &BackgroundProfile::default());
        assert!(prompt.contains("Unnamed"));
    }

    #[test]
    fn ending_prompt_carries_prologue_and_twist() {
        let prompt = ending_prompt(
            "비가 그치지 않았다.",
            EndingType::ResidentHappinessFailure,
            "폭우",
            &profile(),
            &BackgroundProfile::default(),
            Some("시장이 사라진다"),
        );
        assert!(prompt.contains("비가 그치지 않았다."));
        assert!(prompt.contains("행복도 관리 실패"));
        assert!(prompt.contains(EndingType::ResidentHappinessFailure.directive()));
        assert!(prompt.contains("시장이 사라진다"));

        let plain = ending_prompt(
            "x",
            EndingType::CarbonNeutralitySuccess,
            "폭우",
            &profile(),
            &BackgroundProfile::default(),
            Some("  "),
        );
        assert!(!plain.contains("Creative Twist"));
    }

    #[test]
    fn composition_tag_is_extracted_case_insensitively() {
        let raw = "첫 문단.\n\n둘째 문단.\n\n\"가자.\"\n<COMPOSITION>\n  running through flooded streets \n</composition>\n";
        let draft = parse_scenario_response(raw);
        assert_eq!(draft.composition, "running through flooded streets");
        assert_eq!(draft.scenario, "첫 문단.\n\n둘째 문단.\n\n\"가자.\"");
        assert!(!draft.scenario.to_lowercase().contains("<composition>"));
    }

    #[test]
    fn missing_or_empty_tag_uses_default_pose() {
        let draft = parse_scenario_response("  그냥 이야기  ");
        assert_eq!(draft.scenario, "그냥 이야기");
        assert_eq!(draft.composition, DEFAULT_COMPOSITION);

        let empty = parse_scenario_response("이야기<Composition>   </Composition>");
        assert_eq!(empty.scenario, "이야기");
        assert_eq!(empty.composition, DEFAULT_COMPOSITION);
    }
}
