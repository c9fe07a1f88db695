pub mod director;
pub mod error;
pub mod gemini;
pub mod generate;
pub mod image_prompt;
pub mod media;
pub mod profile;
pub mod prompt;
pub mod scenario;
pub mod session;
pub mod settings;
pub mod store;
pub mod utils;

#[cfg(test)]
mod test_support;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::director::Director;
pub use crate::error::{friendly_message, friendly_message_for, ErrorClass, GenerationError};
pub use crate::gemini::{GeminiBackend, GeminiHttp};
pub use crate::profile::{BackgroundProfile, CameraComposition, CharacterProfile};
pub use crate::scenario::{EndingType, ImageState, ScenarioUnit};
pub use crate::session::{ConflictChoice, ImageTarget, Page, Session, SessionError, Submission};
pub use crate::settings::Settings;
pub use crate::store::{MemoryStore, SessionStore, SqliteStore, STORAGE_KEY};

use crate::media::save_image_to_disk;
use crate::settings::load_settings_from_dir;
use crate::utils::{db_path, ensure_data_dir, logs_dir};

// ===== Startup and Main =====

struct AppState {
    data_dir: PathBuf,
    settings: Settings,
    _log_guard: WorkerGuard,
}

fn init_tracing(data_dir: &Path) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(logs_dir(data_dir), "ecoscenario.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    guard
}

fn startup() -> Result<AppState> {
    let data_dir = ensure_data_dir()?;
    let log_guard = init_tracing(&data_dir);
    let settings = load_settings_from_dir(&data_dir);
    info!(data_dir = %data_dir.display(), "starting");
    Ok(AppState {
        data_dir,
        settings,
        _log_guard: log_guard,
    })
}

/// Headless run: `ecoscenario [THEME]`. Continues the saved playthrough
/// and writes every remaining scene.
pub fn run() -> Result<()> {
    let state = startup()?;
    let theme = std::env::args().nth(1);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let store = SqliteStore::open(&db_path(&state.data_dir), state.settings.storage_quota_bytes())
            .await
            .context("open session store")?;
        let backend = GeminiHttp::from_settings(&state.settings)?;
        let character = state.settings.default_character.clone().unwrap_or_default();

        let mut director = Director::resume(backend, store, state.settings.clone()).await;
        autopilot(&mut director, theme, character).await?;

        let session = director.session();
        export_images(session, &state.data_dir).await;
        print_summary(session);
        Ok(())
    })
}

fn text_ready(session: &Session, target: ImageTarget) -> bool {
    session.unit(target).is_some_and(ScenarioUnit::has_text)
}

fn image_ready(session: &Session, target: ImageTarget) -> bool {
    session.unit(target).is_some_and(|u| u.image.is_ready())
}

async fn autopilot<B: GeminiBackend, S: SessionStore>(
    director: &mut Director<B, S>,
    theme: Option<String>,
    character: CharacterProfile,
) -> Result<()> {
    if let Some(theme) = theme.filter(|t| !t.trim().is_empty()) {
        director.apply(|s| {
            s.set_theme(theme);
            Ok(())
        })
        .await?;
    }
    if director.session().theme.trim().is_empty() {
        bail!("no theme given; usage: ecoscenario <THEME>");
    }

    loop {
        let page = director.session().page;
        match page {
            Page::Introduction => director.apply(|s| s.start()).await?,
            Page::FullScenario => return Ok(()),
            Page::CharacterCreation => {
                let submitted = director
                    .apply(|s| s.submit_character(character.clone()))
                    .await?;
                if submitted == Submission::ConflictPending {
                    info!("character changed, starting the story over");
                    director.apply(|s| s.resolve_conflict(ConflictChoice::Reset)).await?;
                }
            }
            Page::PrologueGeneration | Page::EndingGeneration => {
                let target = match page {
                    Page::PrologueGeneration => ImageTarget::Prologue,
                    _ => ImageTarget::Ending(director.session().current_ending_index),
                };
                if !text_ready(director.session(), target) {
                    match target {
                        ImageTarget::Prologue => director.generate_prologue().await?,
                        ImageTarget::Ending(_) => director.generate_ending().await?,
                    }
                }
                if !image_ready(director.session(), target) {
                    let rendered = match target {
                        ImageTarget::Prologue => director.generate_prologue_image().await,
                        ImageTarget::Ending(_) => director.generate_ending_image().await,
                    };
                    if let Err(e) = rendered {
                        warn!(?target, error = %e, "image failed, continuing without it");
                        director.skip_image(target).await?;
                    }
                }
                director.apply(|s| s.advance()).await?;
            }
        }
    }
}

async fn export_images(session: &Session, data_dir: &Path) {
    let session_id = session.id.to_string();
    let scenes = std::iter::once(("01_prologue".to_string(), &session.prologue)).chain(
        session
            .endings
            .iter()
            .enumerate()
            .map(|(i, e)| (format!("{:02}_ending_{}", i + 2, i + 1), &e.unit)),
    );
    for (stem, unit) in scenes {
        let Some(url) = unit.image.url.as_deref() else {
            continue;
        };
        if let Err(e) = save_image_to_disk(data_dir, url, &session_id, &stem).await {
            warn!(%stem, error = %e, "could not write image");
        }
    }
}

fn print_summary(session: &Session) {
    println!("# {}\n", session.theme);
    println!("## 프롤로그\n\n{}\n", session.prologue.scenario);
    for ending in &session.endings {
        println!("## {}\n\n{}\n", ending.title(), ending.unit.scenario);
    }
}
