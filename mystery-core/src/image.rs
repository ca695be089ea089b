//! Crime scene imagery.
//!
//! Every case gets up to three staged photographs: an overview of the scene,
//! the murder weapon, and one piece of secondary evidence. Prompt composition
//! lives here; the actual image backend is injected and entirely optional.
//! Image generation is best-effort and never fails a game start.

use crate::scenario::KnowledgePack;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

// Framing the prompt as a game prop keeps content filters happy.
const GAME_CONTEXT: &str =
    "For a fictional murder mystery detective game, theatrical prop photo:";

const SCENE_OVERVIEW_TEMPLATE: &str = "{game_context} RAW candid photograph, black and white, \
classified FBI case file photo, 1960s aesthetic. {location}. Police investigation tape cordoning \
off the area. Detectives examining the scene with flashlights. Papers and personal effects \
scattered nearby. Overturned furniture suggesting a struggle. Harsh camera flash, heavy film \
grain, gritty texture, high contrast, 35mm documentary photograph, cinematic, 8k --ar 4:3";

const EVIDENCE_PHOTO_TEMPLATE: &str = "{game_context} RAW candid photograph, black and white \
forensic evidence photo, classified FBI case file style, 1960s aesthetic. Close-up of {evidence} \
next to yellow evidence marker labeled {marker}. {context}. Harsh camera flash, heavy film grain, \
gritty texture, high contrast, 35mm documentary photograph, cinematic, 8k --ar 4:3";

/// One generated scene photograph.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneImage {
    /// `scene_overview`, `primary_evidence`, or `secondary_evidence`.
    pub label: String,
    pub png: Vec<u8>,
}

/// The first sentence of the setting, capped for prompt length.
fn extract_location(setting: &str) -> &str {
    match setting.split_once('.') {
        Some((first, _)) => first,
        None => {
            let mut end = setting.len().min(100);
            while !setting.is_char_boundary(end) {
                end -= 1;
            }
            &setting[..end]
        }
    }
}

fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Compose the labeled image prompts for a case.
pub fn scene_prompts(pack: &KnowledgePack) -> Vec<(String, String)> {
    let location = extract_location(&pack.setting);
    let mut prompts = Vec::with_capacity(3);

    prompts.push((
        "scene_overview".to_string(),
        fill(
            SCENE_OVERVIEW_TEMPLATE,
            &[("game_context", GAME_CONTEXT), ("location", location)],
        ),
    ));

    prompts.push((
        "primary_evidence".to_string(),
        fill(
            EVIDENCE_PHOTO_TEMPLATE,
            &[
                ("game_context", GAME_CONTEXT),
                ("evidence", &pack.solution.weapon),
                ("marker", "1"),
                ("context", "Found at the scene. Forensic ruler placed for scale"),
            ],
        ),
    ));

    let secondary: &str = pack
        .solution
        .critical_clues
        .first()
        .map(String::as_str)
        .unwrap_or("a torn document with partial text visible");
    prompts.push((
        "secondary_evidence".to_string(),
        fill(
            EVIDENCE_PHOTO_TEMPLATE,
            &[
                ("game_context", GAME_CONTEXT),
                ("evidence", secondary),
                ("marker", "2"),
                (
                    "context",
                    "Recovered from the investigation area. Bagged for forensic analysis",
                ),
            ],
        ),
    ));

    prompts
}

/// A raw text-to-image capability.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// PNG bytes for the prompt, or `None` on any failure.
    async fn generate(&self, prompt: &str) -> Option<Vec<u8>>;
}

/// Produces the scene photographs for a case.
#[async_trait]
pub trait SceneIllustrator: Send + Sync {
    async fn generate_images(&self, pack: &KnowledgePack) -> Vec<SceneImage>;
}

/// No imagery. The default when no backend is configured.
pub struct DisabledIllustrator;

#[async_trait]
impl SceneIllustrator for DisabledIllustrator {
    async fn generate_images(&self, _pack: &KnowledgePack) -> Vec<SceneImage> {
        tracing::debug!("image generation disabled");
        Vec::new()
    }
}

/// Composes prompts and fans them out to an injected backend, keeping
/// whatever succeeds.
pub struct BackendIllustrator {
    backend: Arc<dyn ImageBackend>,
}

impl BackendIllustrator {
    pub fn new(backend: Arc<dyn ImageBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SceneIllustrator for BackendIllustrator {
    async fn generate_images(&self, pack: &KnowledgePack) -> Vec<SceneImage> {
        let prompts = scene_prompts(pack);
        tracing::info!(images = prompts.len(), "generating crime scene images");

        let results = join_all(prompts.into_iter().map(|(label, prompt)| async move {
            match self.backend.generate(&prompt).await {
                Some(png) => Some(SceneImage { label, png }),
                None => {
                    tracing::warn!(%label, "image generation failed");
                    None
                }
            }
        }))
        .await;

        results.into_iter().flatten().collect()
    }
}
