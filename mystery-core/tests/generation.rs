//! Integration tests for scenario generation and generate-and-start.
//!
//! All tests run against the scripted mock model, no API calls.

use async_trait::async_trait;
use mystery_core::generator::{Difficulty, ScenarioGenerator};
use mystery_core::image::{BackendIllustrator, ImageBackend, SceneIllustrator};
use mystery_core::llm::{ChatTurn, LlmError, ModelError};
use mystery_core::progress::{ProgressSink, Stage};
use mystery_core::service::{GameService, ServiceError};
use mystery_core::testing::{MockModel, RecordingProgress};
use mystery_core::ChatModel;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

fn skeleton() -> serde_json::Value {
    json!({
        "name": "Murder on the Night Train",
        "setting": "A sleeper train crossing the Alps. Snow has stopped it in a tunnel.",
        "victim": {
            "name": "Henri Maillard",
            "role": "Art dealer",
            "description": "Found dead in his locked compartment."
        },
        "shared_facts": "The train stopped at 23:10. The corridor lights failed twice.",
        "timeline": "22:40 dinner ends. 23:10 train stops. 00:05 body found.",
        "intro_message": "The night train is going nowhere. Neither is the murderer.",
        "solution": {
            "murderer_id": "greta",
            "motive": "Maillard sold her family's stolen painting.",
            "weapon": "A silk scarf",
            "critical_clues": ["a torn auction catalogue", "00:00"]
        },
        "character_blueprints": [
            { "id": "greta", "name": "Greta Keller", "role": "Restorer",
              "public_description": "Quiet, watches everyone.",
              "is_murderer": true, "secret_summary": "The painting was her grandmother's." },
            { "id": "paul", "name": "Paul Renard", "role": "Conductor",
              "public_description": "Knows every door on the train.",
              "is_murderer": false, "secret_summary": "Takes bribes for empty compartments." },
            { "id": "ines", "name": "Ines Moreau", "role": "Journalist",
              "public_description": "On board chasing a story.",
              "is_murderer": false, "secret_summary": "Was in Maillard's compartment earlier." },
            { "id": "viktor", "name": "Viktor Brandt", "role": "Collector",
              "public_description": "Maillard's oldest rival.",
              "is_murderer": false, "secret_summary": "Owes Maillard a fortune." }
        ]
    })
}

fn detail(tag: &str) -> serde_json::Value {
    json!({
        "personality": format!("You are {tag}."),
        "private_knowledge": format!("{tag} knows something."),
        "knows_about_others": format!("{tag} has opinions."),
        "clue_keywords": ["00:00", format!("secret of {tag}")]
    })
}

fn push_generation(model: &MockModel) {
    model.push_structured(skeleton());
    for tag in ["greta", "paul", "ines", "viktor"] {
        model.push_structured(detail(tag));
    }
}

struct StubImages;

#[async_trait]
impl ImageBackend for StubImages {
    async fn generate(&self, _prompt: &str) -> Option<Vec<u8>> {
        Some(vec![1, 2, 3])
    }
}

#[tokio::test]
async fn test_fan_out_produces_one_persona_per_blueprint() {
    let model = Arc::new(MockModel::new());
    push_generation(&model);
    let generator = ScenarioGenerator::new(Arc::clone(&model) as Arc<dyn ChatModel>);

    let pack = generator
        .generate("a train in the snow", Difficulty::Hard, 0)
        .await
        .unwrap();

    // One skeleton call plus one detail call per blueprint.
    assert_eq!(model.structured_calls(), 5);
    assert_eq!(pack.characters.len(), 4);
    for id in ["greta", "paul", "ines", "viktor"] {
        let character = pack.character(id).unwrap();
        assert_eq!(character.personality, format!("You are {id}."));
        assert!(!character.clue_keywords.is_empty());
    }
    // Blueprint identity is authoritative.
    assert_eq!(pack.character("greta").unwrap().name, "Greta Keller");
    assert_eq!(pack.solution.murderer_id, "greta");
}

/// Hands out the skeleton freely, but holds every persona detail call at a
/// barrier until all four are in flight. A sequential fan-out never gets
/// past the first detail call.
struct GatedDetails {
    barrier: Barrier,
}

#[async_trait]
impl ChatModel for GatedDetails {
    async fn complete(
        &self,
        _system: &str,
        _history: &[ChatTurn],
        _user: &str,
    ) -> Result<String, ModelError> {
        Ok(String::new())
    }

    async fn complete_structured(
        &self,
        _system: &str,
        _user: &str,
        schema_name: &str,
        _schema: &serde_json::Value,
    ) -> Result<serde_json::Value, LlmError> {
        if schema_name == "case_skeleton" {
            return Ok(skeleton());
        }
        self.barrier.wait().await;
        Ok(detail("a suspect"))
    }
}

#[tokio::test]
async fn test_persona_detail_calls_run_concurrently() {
    let model = Arc::new(GatedDetails {
        barrier: Barrier::new(4),
    });
    let generator = ScenarioGenerator::new(model as Arc<dyn ChatModel>);

    let pack = tokio::time::timeout(
        Duration::from_secs(5),
        generator.generate("a train in the snow", Difficulty::Medium, 0),
    )
    .await
    .expect("persona detail calls were not issued concurrently")
    .unwrap();

    assert_eq!(pack.characters.len(), 4);
    assert_eq!(pack.solution.murderer_id, "greta");
}

#[tokio::test]
async fn test_generate_and_start_full_pipeline() {
    let model = Arc::new(MockModel::new());
    push_generation(&model);
    let progress = Arc::new(RecordingProgress::new());
    let service = GameService::builder(
        Arc::clone(&model) as Arc<dyn ChatModel>,
        Arc::clone(&model) as Arc<dyn ChatModel>,
    )
    .progress(Arc::clone(&progress) as Arc<dyn ProgressSink>)
    .illustrator(Arc::new(BackendIllustrator::new(Arc::new(StubImages))) as Arc<dyn SceneIllustrator>)
    .build();

    let started = service
        .generate_and_start("g1", "a train in the snow", Difficulty::Medium, 0)
        .await
        .unwrap();

    assert_eq!(started.info.case_name, "Murder on the Night Train");
    assert_eq!(started.images.len(), 3);

    // The new game is immediately playable.
    model.push_reply("I restore paintings, I do not steal them.");
    let turn = service
        .chat("g1", "greta", "Tell me about the painting.", None)
        .await
        .unwrap();
    assert_eq!(turn.character_name, "Greta Keller");

    // Staged progress runs from start to completion in order.
    let stages: Vec<Stage> = progress.updates().iter().map(|u| u.stage).collect();
    assert_eq!(stages.first(), Some(&Stage::Started));
    assert_eq!(stages.last(), Some(&Stage::Complete));
    let position = |stage: Stage| stages.iter().position(|s| *s == stage).unwrap();
    assert!(position(Stage::GeneratingScenario) < position(Stage::ScenarioComplete));
    assert!(position(Stage::ScenarioComplete) < position(Stage::GeneratingPersonas));
    assert!(position(Stage::GeneratingPersonas) < position(Stage::GeneratingImages));
    assert!(position(Stage::GeneratingImages) < position(Stage::InitializingGame));
    assert_eq!(
        stages.iter().filter(|s| **s == Stage::PersonaComplete).count(),
        4
    );
}

#[tokio::test]
async fn test_exhausted_retries_leave_no_game() {
    let model = Arc::new(MockModel::new());
    model.fail_next_structured("upstream timeout");
    model.fail_next_structured("upstream timeout again");
    let service = GameService::builder(
        Arc::clone(&model) as Arc<dyn ChatModel>,
        Arc::clone(&model) as Arc<dyn ChatModel>,
    )
    .build();

    let err = service
        .generate_and_start("g1", "", Difficulty::Easy, 1)
        .await
        .unwrap_err();

    match err {
        ServiceError::Generation(generation) => {
            assert_eq!(generation.attempts, 2);
            assert!(generation.to_string().contains("upstream timeout again"));
        }
        other => panic!("expected generation error, got {other}"),
    }
    assert_eq!(service.game_count(), 0);
    assert!(service.game_info("g1").is_err());
}

#[tokio::test]
async fn test_bad_phase_two_output_fails_the_attempt() {
    let model = Arc::new(MockModel::new());
    model.push_structured(skeleton());
    // First persona decodes, second is missing required fields.
    model.push_structured(detail("greta"));
    model.push_structured(json!({ "personality": "incomplete" }));
    model.push_structured(detail("ines"));
    model.push_structured(detail("viktor"));
    let generator = ScenarioGenerator::new(Arc::clone(&model) as Arc<dyn ChatModel>);

    let err = generator.generate("", Difficulty::Medium, 0).await.unwrap_err();
    assert_eq!(err.attempts, 1);
    assert!(err.to_string().contains("persona_detail"));
}
