use std::sync::Mutex;

use ecoscenario_lib::gemini::{
    Candidate, Content, FinishReason, GenerateContentRequest, GenerateContentResponse, InlineData,
    Part,
};
use ecoscenario_lib::generate::RetryPolicy;
use ecoscenario_lib::profile::{AgeBracket, ArtStyle, Gender, Nationality, Occupation, Outfit};
use ecoscenario_lib::{
    CharacterProfile, Director, GeminiBackend, GenerationError, ImageTarget, MemoryStore, Page,
    SessionError, SessionStore, Settings, STORAGE_KEY,
};

const THEME: &str = "해수면 상승으로 인한 도시 침몰";
const REFERENCE_B64: &str = "UkVGRVJFTkNF";

/// Answers story, prompt and image requests by looking at what was asked.
#[derive(Default)]
struct StubGemini {
    calls: Mutex<Vec<(String, GenerateContentRequest)>>,
}

impl StubGemini {
    fn image_calls(&self) -> Vec<GenerateContentRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, r)| is_image_request(r))
            .map(|(_, r)| r.clone())
            .collect()
    }
}

fn is_image_request(req: &GenerateContentRequest) -> bool {
    req.generation_config
        .as_ref()
        .and_then(|c| c.response_modalities.as_ref())
        .is_some()
}

fn is_prompt_request(req: &GenerateContentRequest) -> bool {
    req.generation_config
        .as_ref()
        .and_then(|c| c.response_mime_type.as_deref())
        == Some("text/plain")
}

fn reply(part: Part) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: Some(vec![Candidate {
            content: Some(Content {
                role: Some("model".into()),
                parts: vec![part],
            }),
            finish_reason: Some(FinishReason::Stop),
        }]),
        prompt_feedback: None,
    }
}

impl GeminiBackend for StubGemini {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GenerationError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), request.clone()));

        if is_image_request(request) {
            return Ok(reply(Part::inline(InlineData {
                mime_type: "image/png".into(),
                data: "aW1hZ2U=".into(),
            })));
        }
        if is_prompt_request(request) {
            return Ok(reply(Part::text(
                "```text\nA young scientist on a flooded boulevard, wide shot\n```",
            )));
        }
        Ok(reply(Part::text(
            "바닷물이 도로를 덮기 시작했다.\n\n사람들은 높은 곳으로 향했다.\n\"아직 늦지 않았어.\"\n\
             <Composition>gazing at the rising water</Composition>",
        )))
    }
}

fn full_profile() -> CharacterProfile {
    CharacterProfile {
        name: Some("하린".into()),
        gender: Gender::Female,
        age: AgeBracket::YoungAdult,
        nationality: Nationality::Korea,
        occupation: Occupation::Scientist,
        outfit: Outfit::Outdoor,
        art_style: ArtStyle::Webtoon,
        reference_image: Some(format!("data:image/png;base64,{REFERENCE_B64}")),
    }
}

async fn director_at_prologue() -> Director<StubGemini, MemoryStore> {
    let mut d = Director::resume(StubGemini::default(), MemoryStore::new(), Settings::default())
        .await
        .with_retry(RetryPolicy::immediate());
    d.apply(|s| s.start()).await.unwrap();
    d.apply(|s| {
        s.set_theme(THEME);
        s.submit_character(full_profile())
    })
    .await
    .unwrap();
    d
}

#[tokio::test]
async fn prologue_is_written_and_illustrated() {
    let mut d = director_at_prologue().await;

    d.generate_prologue().await.unwrap();
    let prologue = &d.session().prologue;
    assert!(!prologue.scenario.is_empty());
    assert!(!prologue.scenario.to_lowercase().contains("<composition>"));
    assert_eq!(prologue.composition, "gazing at the rising water");

    d.generate_prologue_image().await.unwrap();
    let url = d.session().prologue.image.url.clone().unwrap();
    assert!(url.starts_with("data:image/"));
    assert!(url.contains(";base64,"));

    let image_calls = d.backend().image_calls();
    assert_eq!(image_calls.len(), 1);
    let parts = &image_calls[0].contents[0].parts;
    assert_eq!(parts[0].inline_data.as_ref().unwrap().data, REFERENCE_B64);
    assert!(parts[1]
        .text
        .as_deref()
        .unwrap()
        .starts_with("A young scientist on a flooded boulevard"));

    let saved = d.store().load(STORAGE_KEY).await.unwrap().unwrap();
    assert!(saved.contains("gazing at the rising water"));
}

#[tokio::test]
async fn endings_advance_only_when_ready() {
    let mut d = director_at_prologue().await;

    assert!(matches!(
        d.apply(|s| s.advance()).await,
        Err(SessionError::NotReady)
    ));
    d.generate_prologue().await.unwrap();
    d.skip_image(ImageTarget::Prologue).await.unwrap();
    d.apply(|s| s.advance()).await.unwrap();

    for i in 0..3 {
        assert_eq!(d.session().page, Page::EndingGeneration);
        assert_eq!(d.session().current_ending_index, i);

        assert!(d.apply(|s| s.advance()).await.is_err());
        assert_eq!(d.session().current_ending_index, i);

        d.generate_ending().await.unwrap();
        assert!(d.apply(|s| s.advance()).await.is_err());
        assert_eq!(d.session().current_ending_index, i);

        d.generate_ending_image().await.unwrap();
        d.apply(|s| s.advance()).await.unwrap();
    }

    let s = d.session();
    assert_eq!(s.page, Page::FullScenario);
    assert_eq!(s.current_ending_index, 2);
    assert!(s.endings.iter().all(|e| e.unit.is_ready()));
}
