use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Categorical field whose preset values come from a fixed list and
/// whose `Other` variant carries free text typed by the player.
macro_rules! open_choice {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            pub const PRESETS: &'static [$name] = &[$($name::$variant),+];

            pub fn label(&self) -> &str {
                match self {
                    $($name::$variant => $label,)+
                    $name::Other(text) => text.as_str(),
                }
            }

            pub fn is_other(&self) -> bool {
                matches!(self, $name::Other(_))
            }
        }

        impl From<String> for $name {
            fn from(label: String) -> Self {
                match label.as_str() {
                    $($label => $name::$variant,)+
                    _ => $name::Other(label),
                }
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.label().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

/// Categorical field restricted to its preset values.
macro_rules! closed_choice {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const PRESETS: &'static [$name] = &[$($name::$variant),+];

            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(label: String) -> Result<Self, Self::Error> {
                match label.trim() {
                    $($label => Ok($name::$variant),)+
                    other => Err(format!("unknown {} value: {other}", stringify!($name))),
                }
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.label().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

closed_choice!(Gender {
    Male => "남",
    Female => "여",
});

closed_choice!(AgeBracket {
    Teen => "청소년",
    YoungAdult => "청년",
    MiddleAged => "중년",
    Elderly => "노년",
});

open_choice!(Nationality {
    Usa => "미국",
    China => "중국",
    Kenya => "케냐",
    Uk => "영국",
    Korea => "한국",
});

open_choice!(Occupation {
    Student => "학생",
    Scientist => "과학자",
    Activist => "환경 운동가",
    Ceo => "CEO",
    Politician => "정치인",
});

open_choice!(Outfit {
    Casual => "캐쥬얼",
    Modern => "모던",
    Street => "스트리트",
    Vintage => "빈티지",
    Traditional => "전통의상",
    Outdoor => "아웃도어",
    Uniform => "유니폼",
});

open_choice!(ArtStyle {
    Anime => "애니메이션",
    RetroAnime => "90s 애니",
    Webtoon => "웹툰",
    OilPainting => "유화",
    PixelArt => "픽셀아트",
    LineArt => "라인아트",
    SuperDeformed => "SD캐릭터",
    SemiRealistic => "반실사",
});

open_choice!(Space {
    City => "도시",
    Countryside => "시골",
    Home => "집",
    School => "학교",
    Park => "공원",
});

open_choice!(Weather {
    Clear => "맑음",
    Cloudy => "흐림",
    Rain => "비",
    Snow => "눈",
    Fog => "안개",
});

open_choice!(TimeOfDay {
    Dawn => "새벽",
    Morning => "아침",
    Midday => "낮",
    Sunset => "해질녘",
    Night => "밤",
});

open_choice!(Mood {
    Peaceful => "평화로운",
    Lively => "활기찬",
    Empty => "공허한",
    Urgent => "긴박한",
});

impl Gender {
    pub fn english(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl AgeBracket {
    pub fn english(&self) -> &'static str {
        match self {
            AgeBracket::Teen => "15-year-old teenager",
            AgeBracket::YoungAdult => "25-year-old young adult",
            AgeBracket::MiddleAged => "45-year-old middle-aged adult",
            AgeBracket::Elderly => "70-year-old elderly person",
        }
    }
}

impl Nationality {
    pub fn english(&self) -> Cow<'_, str> {
        Cow::Borrowed(match self {
            Nationality::Usa => "American",
            Nationality::China => "Chinese",
            Nationality::Kenya => "Kenyan",
            Nationality::Uk => "British",
            Nationality::Korea => "Korean",
            Nationality::Other(text) => text.as_str(),
        })
    }
}

impl Occupation {
    pub fn english(&self) -> Cow<'_, str> {
        Cow::Borrowed(match self {
            Occupation::Student => "student",
            Occupation::Scientist => "scientist",
            Occupation::Activist => "environmental activist",
            Occupation::Ceo => "corporate CEO, business leader in a suit",
            Occupation::Politician => "politician",
            Occupation::Other(text) => text.as_str(),
        })
    }
}

impl Outfit {
    /// The uniform preset is described in terms of the wearer's job.
    pub fn english(&self, occupation: &Occupation) -> Cow<'_, str> {
        Cow::Borrowed(match self {
            Outfit::Casual => "casual everyday clothing, t-shirt and jeans",
            Outfit::Modern => "modern minimalist fashion, sleek and clean",
            Outfit::Street => "streetwear, hoodie, hip-hop fashion",
            Outfit::Vintage => "vintage clothing, retro aesthetic",
            Outfit::Traditional => "traditional cultural attire, authentic folk costume",
            Outfit::Outdoor => "outdoor survival gear, hiking clothes, practical",
            Outfit::Uniform => {
                return Cow::Owned(format!(
                    "professional uniform, work attire, functional clothing suitable for a {}",
                    occupation.english()
                ))
            }
            Outfit::Other(text) => text.as_str(),
        })
    }
}

impl ArtStyle {
    pub fn english(&self) -> Cow<'_, str> {
        Cow::Borrowed(match self {
            ArtStyle::Anime => "modern high-quality anime style, ufotable style, kyoto animation style, highly detailed, vibrant colors",
            ArtStyle::RetroAnime => "90s retro anime style, cel shaded, vintage aesthetic, Sailor Moon vibe, grain",
            ArtStyle::Webtoon => "korean webtoon style, sharp lines, vibrant coloring, manhwa aesthetic, digital art",
            ArtStyle::OilPainting => "oil painting style, impasto, textured, classical art style, rich colors",
            ArtStyle::PixelArt => "pixel art, retro game style, 16-bit, isometric or side view",
            ArtStyle::LineArt => "intricate ink illustration, line art, hatching, black and white, detailed linework, masterpiece",
            ArtStyle::SuperDeformed => "chibi style, super deformed, cute proportions, large head",
            ArtStyle::SemiRealistic => "Arcane style, Riot Games style, semi-realistic digital painting, highly detailed, ArtStation trending",
            ArtStyle::Other(text) => text.as_str(),
        })
    }

    /// Rendering keywords matched to the medium, so that stylised looks
    /// are not pulled towards photorealism.
    pub fn quality_tags(&self) -> &'static str {
        match self {
            ArtStyle::Anime | ArtStyle::RetroAnime | ArtStyle::Webtoon | ArtStyle::SuperDeformed => {
                "flat color, cel shaded, 2D, digital illustration, vector art, vibrant, clean lines, anime key visual"
            }
            ArtStyle::LineArt => {
                "ink illustration, monochrome, hatching, line art, manga style, high contrast, clean white background"
            }
            ArtStyle::OilPainting => {
                "oil painting texture, impasto, visible brush strokes, canvas texture, painterly, traditional media"
            }
            ArtStyle::PixelArt => "pixel art, 16-bit, retro game sprite, sharp edges, digital art",
            ArtStyle::SemiRealistic | ArtStyle::Other(_) => {
                "masterpiece, best quality, 8k, photorealistic textures, ray tracing, cinematic lighting, detailed skin texture, subsurface scattering, depth of field"
            }
        }
    }

    /// Drawn styles, for which photographic lens vocabulary is avoided.
    pub fn is_illustrated(&self) -> bool {
        matches!(
            self,
            ArtStyle::Anime
                | ArtStyle::RetroAnime
                | ArtStyle::Webtoon
                | ArtStyle::SuperDeformed
                | ArtStyle::LineArt
                | ArtStyle::PixelArt
        )
    }
}

impl Space {
    pub fn english(&self) -> Cow<'_, str> {
        Cow::Borrowed(match self {
            Space::City => "futuristic city",
            Space::Countryside => "rural countryside",
            Space::Home => "cozy house interior",
            Space::School => "classroom or school hallway",
            Space::Park => "urban park with nature",
            Space::Other(text) => text.as_str(),
        })
    }
}

impl Weather {
    pub fn english(&self) -> Cow<'_, str> {
        Cow::Borrowed(match self {
            Weather::Clear => "clear sunny sky, high contrast",
            Weather::Cloudy => "overcast, diffuse lighting",
            Weather::Rain => "heavy rain, wet surfaces, reflections",
            Weather::Snow => "snowy, white winter atmosphere",
            Weather::Fog => "foggy, misty, atmospheric perspective",
            Weather::Other(text) => text.as_str(),
        })
    }
}

impl TimeOfDay {
    pub fn english(&self) -> Cow<'_, str> {
        Cow::Borrowed(match self {
            TimeOfDay::Dawn => "dawn, blue hour",
            TimeOfDay::Morning => "morning, soft sunlight",
            TimeOfDay::Midday => "mid-day, bright daylight",
            TimeOfDay::Sunset => "sunset, golden hour",
            TimeOfDay::Night => "night, cinematic lighting, moonlit",
            TimeOfDay::Other(text) => text.as_str(),
        })
    }
}

impl Mood {
    pub fn english(&self) -> Cow<'_, str> {
        Cow::Borrowed(match self {
            Mood::Peaceful => "peaceful, serene",
            Mood::Lively => "vibrant, energetic, dynamic",
            Mood::Empty => "desolate, empty, lonely",
            Mood::Urgent => "tense, dramatic, ominous",
            Mood::Other(text) => text.as_str(),
        })
    }
}

/// Camera framing preset for scene images. Stored values that are not
/// one of the presets read back as the balanced shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CameraComposition {
    CharacterFocus,
    #[default]
    Balanced,
    EnvironmentFocus,
}

impl CameraComposition {
    pub const PRESETS: &'static [CameraComposition] = &[
        CameraComposition::CharacterFocus,
        CameraComposition::Balanced,
        CameraComposition::EnvironmentFocus,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CameraComposition::CharacterFocus => "인물 중심",
            CameraComposition::Balanced => "중간",
            CameraComposition::EnvironmentFocus => "배경 중심",
        }
    }

    pub fn camera_keywords(&self) -> &'static str {
        match self {
            CameraComposition::CharacterFocus => "Close-up shot, portrait lens (85mm), depth of field, focus on character's face and expression, bokeh background",
            CameraComposition::Balanced => "Medium shot, waist-up shot, balanced composition, rule of thirds, character interacting with the immediate surroundings",
            CameraComposition::EnvironmentFocus => "Wide angle shot, landscape view, establishing shot, character is small in frame, focus on the vast environment and atmosphere",
        }
    }
}

impl From<String> for CameraComposition {
    fn from(label: String) -> Self {
        match label.trim() {
            "인물 중심" => CameraComposition::CharacterFocus,
            "배경 중심" => CameraComposition::EnvironmentFocus,
            _ => CameraComposition::Balanced,
        }
    }
}

impl From<CameraComposition> for String {
    fn from(value: CameraComposition) -> Self {
        value.label().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub gender: Gender,
    pub age: AgeBracket,
    pub nationality: Nationality,
    pub occupation: Occupation,
    pub outfit: Outfit,
    pub art_style: ArtStyle,
    /// Data URI used as the image-to-image reference for scene images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,
}

impl Default for CharacterProfile {
    fn default() -> Self {
        Self {
            name: None,
            gender: Gender::Male,
            age: AgeBracket::Teen,
            nationality: Nationality::Usa,
            occupation: Occupation::Student,
            outfit: Outfit::Casual,
            art_style: ArtStyle::Anime,
            reference_image: None,
        }
    }
}

fn normalized(value: Option<&str>) -> &str {
    value.map(str::trim).unwrap_or("")
}

impl CharacterProfile {
    /// Rejects `Other` choices whose free text was left blank.
    pub fn validate(&self) -> Result<(), String> {
        let blank = |other: bool, label: &str| other && label.trim().is_empty();
        if blank(self.nationality.is_other(), self.nationality.label()) {
            return Err("국적을 직접 입력해주세요.".into());
        }
        if blank(self.occupation.is_other(), self.occupation.label()) {
            return Err("직업을 직접 입력해주세요.".into());
        }
        if blank(self.outfit.is_other(), self.outfit.label()) {
            return Err("의상 스타일을 직접 입력해주세요.".into());
        }
        if blank(self.art_style.is_other(), self.art_style.label()) {
            return Err("화풍을 직접 입력해주세요.".into());
        }
        Ok(())
    }

    /// Field-by-field comparison that ignores surrounding whitespace and
    /// treats a missing name or image like an empty one.
    pub fn same_as(&self, other: &CharacterProfile) -> bool {
        normalized(self.name.as_deref()) == normalized(other.name.as_deref())
            && self.gender == other.gender
            && self.age == other.age
            && self.nationality.label().trim() == other.nationality.label().trim()
            && self.occupation.label().trim() == other.occupation.label().trim()
            && self.outfit.label().trim() == other.outfit.label().trim()
            && self.art_style.label().trim() == other.art_style.label().trim()
            && normalized(self.reference_image.as_deref())
                == normalized(other.reference_image.as_deref())
    }

    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }

    /// One-sentence English description used by image prompts.
    pub fn english_description(&self) -> String {
        let named = self
            .display_name()
            .map(|n| format!(" named {n}"))
            .unwrap_or_default();
        format!(
            "A {} {} {} {}{}, wearing {}.",
            self.age.english(),
            self.nationality.english(),
            self.gender.english(),
            self.occupation.english(),
            named,
            self.outfit.english(&self.occupation),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundProfile {
    pub space: Space,
    pub weather: Weather,
    pub time_of_day: TimeOfDay,
    pub mood: Mood,
    #[serde(default)]
    pub composition: CameraComposition,
}

impl Default for BackgroundProfile {
    fn default() -> Self {
        Self {
            space: Space::City,
            weather: Weather::Clear,
            time_of_day: TimeOfDay::Midday,
            mood: Mood::Peaceful,
            composition: CameraComposition::Balanced,
        }
    }
}

impl BackgroundProfile {
    /// English setting fragment: location, weather and time of day.
    pub fn english_setting(&self) -> String {
        format!(
            "{}, {}, {}",
            self.space.english(),
            self.weather.english(),
            self.time_of_day.english()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_through_strings() {
        for occ in Occupation::PRESETS {
            assert_eq!(&Occupation::from(occ.label().to_string()), occ);
        }
        assert_eq!(
            Occupation::from("어부".to_string()),
            Occupation::Other("어부".into())
        );
        assert!(AgeBracket::try_from("외계인".to_string()).is_err());
        assert_eq!(
            CameraComposition::from("알 수 없음".to_string()),
            CameraComposition::Balanced
        );
    }

    #[test]
    fn free_text_passes_through_translation() {
        let occupation = Occupation::Other("deep-sea welder".into());
        assert_eq!(occupation.english(), "deep-sea welder");
        assert_eq!(
            Outfit::Other("a raincoat made of kelp".into()).english(&occupation),
            "a raincoat made of kelp"
        );
        assert!(Outfit::Uniform.english(&occupation).ends_with("for a deep-sea welder"));
    }

    #[test]
    fn every_preset_has_a_distinct_translation() {
        let ages: Vec<_> = AgeBracket::PRESETS.iter().map(|a| a.english()).collect();
        assert_eq!(ages.len(), 4);
        for style in ArtStyle::PRESETS {
            assert_ne!(style.english(), style.label());
        }
        for space in Space::PRESETS {
            assert_ne!(space.english(), space.label());
        }
    }

    #[test]
    fn blank_other_fields_fail_validation() {
        let mut profile = CharacterProfile::default();
        assert!(profile.validate().is_ok());
        profile.outfit = Outfit::Other("   ".into());
        assert_eq!(profile.validate().unwrap_err(), "의상 스타일을 직접 입력해주세요.");
    }

    #[test]
    fn comparison_ignores_whitespace() {
        let a = CharacterProfile {
            name: Some("Mina".into()),
            occupation: Occupation::Other("farmer".into()),
            ..CharacterProfile::default()
        };
        let b = CharacterProfile {
            name: Some("  Mina ".into()),
            occupation: Occupation::Other("farmer  ".into()),
            ..CharacterProfile::default()
        };
        assert!(a.same_as(&b));

        let c = CharacterProfile {
            reference_image: Some("data:image/png;base64,AAAA".into()),
            ..a.clone()
        };
        assert!(!a.same_as(&c));
    }

    #[test]
    fn profile_serializes_with_labels() {
        let profile = CharacterProfile::default();
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["gender"], "남");
        assert_eq!(json["artStyle"], "애니메이션");
        let back: CharacterProfile = serde_json::from_value(json).unwrap();
        assert_eq!(back, profile);
    }
}
