//! Two-phase scenario generation.
//!
//! Phase 1 produces the case skeleton in one schema-constrained call: the
//! setting, the victim, the hidden solution, and a cast of character
//! blueprints. Phase 2 expands every blueprint into a full persona with one
//! independent call per character, fanned out concurrently. The pipeline is
//! all-or-nothing: any failure discards the attempt, and the whole pipeline
//! retries within an explicit budget.

use crate::llm::{coerce, ChatModel, LlmError};
use crate::progress::{NullProgress, ProgressReporter, ProgressSink};
use crate::prompts::{self, TemplateLibrary};
use crate::scenario::{Character, ConfigurationError, KnowledgePack, Solution, Victim};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// How hard the murderer is to catch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// How the murderer lies at this difficulty, injected into their
    /// Phase 2 instructions.
    fn deception_posture(self) -> &'static str {
        match self {
            Difficulty::Easy => {
                "You are a fragile liar. Your cover story has visible holes, you \
                 contradict yourself under moderate pressure, and direct confrontation \
                 rattles you quickly."
            }
            Difficulty::Medium => {
                "You lie in a controlled, rehearsed way, but you make occasional \
                 mistakes: a detail too many, a time that does not quite fit, \
                 visible nerves when the questions get close."
            }
            Difficulty::Hard => {
                "You are a disciplined, consistent liar. Your story holds together, \
                 you redirect suspicion calmly, and only long sustained pressure \
                 produces the smallest cracks."
            }
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed generation attempt.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Config(#[from] ConfigurationError),

    /// The skeleton decoded but is semantically unusable.
    #[error("invalid skeleton: {0}")]
    Invalid(String),
}

/// All attempts exhausted; carries the last attempt's cause.
#[derive(Debug, Error)]
#[error("scenario generation failed after {attempts} attempt(s): {last}")]
pub struct GenerationError {
    pub attempts: u32,
    #[source]
    pub last: AttemptError,
}

/// Context handed to each attempt of a retried operation.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// 0-based attempt number.
    pub number: u32,
    /// Rendering of the previous attempt's error, absent on the first try.
    pub previous_error: Option<String>,
}

/// The exhausted outcome of [`retry_with_budget`].
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// Total attempts made, including the first.
    pub attempts: u32,
    pub last: E,
}

/// Run `op` up to `1 + max_retries` times, surfacing the last error.
///
/// Each attempt sees its number and the previous attempt's error, so the
/// caller can sharpen its prompt on retry.
pub async fn retry_with_budget<T, E, F, Fut>(
    max_retries: u32,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(Attempt) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut previous_error: Option<String> = None;
    let mut number = 0;
    loop {
        let attempt = Attempt {
            number,
            previous_error: previous_error.take(),
        };
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if number < max_retries => {
                tracing::warn!(attempt = number + 1, error = %err, "attempt failed, retrying");
                previous_error = Some(err.to_string());
                number += 1;
            }
            Err(err) => {
                return Err(RetryExhausted {
                    attempts: number + 1,
                    last: err,
                })
            }
        }
    }
}

/// Phase 1 output: a not-yet-fleshed-out suspect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterBlueprint {
    pub id: String,
    pub name: String,
    pub role: String,
    pub public_description: String,
    pub is_murderer: bool,
    /// One paragraph of what this person hides, expanded in Phase 2.
    pub secret_summary: String,
}

#[derive(Debug, Deserialize)]
struct Skeleton {
    name: String,
    setting: String,
    victim: Victim,
    shared_facts: String,
    timeline: String,
    intro_message: String,
    solution: Solution,
    character_blueprints: Vec<CharacterBlueprint>,
}

/// Phase 2 output for one blueprint. Identity fields the model may echo are
/// ignored; the blueprint stays authoritative.
#[derive(Debug, Deserialize)]
struct PersonaDetail {
    personality: String,
    private_knowledge: String,
    knows_about_others: String,
    #[serde(default)]
    clue_keywords: Vec<String>,
}

fn skeleton_schema() -> serde_json::Value {
    let blueprint = json!({
        "type": "object",
        "properties": {
            "id": { "type": "string" },
            "name": { "type": "string" },
            "role": { "type": "string" },
            "public_description": { "type": "string" },
            "is_murderer": { "type": "boolean" },
            "secret_summary": { "type": "string" }
        },
        "required": ["id", "name", "role", "public_description", "is_murderer", "secret_summary"],
        "additionalProperties": false
    });
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "setting": { "type": "string" },
            "victim": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "role": { "type": "string" },
                    "description": { "type": "string" }
                },
                "required": ["name", "role", "description"],
                "additionalProperties": false
            },
            "shared_facts": { "type": "string" },
            "timeline": { "type": "string" },
            "intro_message": { "type": "string" },
            "solution": {
                "type": "object",
                "properties": {
                    "murderer_id": { "type": "string" },
                    "motive": { "type": "string" },
                    "weapon": { "type": "string" },
                    "critical_clues": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["murderer_id", "motive", "weapon", "critical_clues"],
                "additionalProperties": false
            },
            "character_blueprints": { "type": "array", "items": blueprint }
        },
        "required": [
            "name", "setting", "victim", "shared_facts", "timeline",
            "intro_message", "solution", "character_blueprints"
        ],
        "additionalProperties": false
    })
}

fn detail_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "personality": { "type": "string" },
            "private_knowledge": { "type": "string" },
            "knows_about_others": { "type": "string" },
            "clue_keywords": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["personality", "private_knowledge", "knows_about_others", "clue_keywords"],
        "additionalProperties": false
    })
}

/// Generates complete knowledge packs from a free-form player wish.
pub struct ScenarioGenerator {
    model: Arc<dyn ChatModel>,
    templates: TemplateLibrary,
}

impl ScenarioGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self::with_templates(model, TemplateLibrary::embedded_only())
    }

    pub fn with_templates(model: Arc<dyn ChatModel>, templates: TemplateLibrary) -> Self {
        Self { model, templates }
    }

    /// Generate a validated pack, retrying the whole pipeline up to
    /// `max_retries` extra times.
    pub async fn generate(
        &self,
        user_input: &str,
        difficulty: Difficulty,
        max_retries: u32,
    ) -> Result<KnowledgePack, GenerationError> {
        self.generate_with_progress(user_input, difficulty, max_retries, &NullProgress, "")
            .await
    }

    /// Like [`generate`](Self::generate), publishing staged progress for
    /// `game_id` as the pipeline advances.
    pub async fn generate_with_progress(
        &self,
        user_input: &str,
        difficulty: Difficulty,
        max_retries: u32,
        sink: &dyn ProgressSink,
        game_id: &str,
    ) -> Result<KnowledgePack, GenerationError> {
        tracing::info!(
            %difficulty,
            input = %user_input.chars().take(50).collect::<String>(),
            "generating scenario"
        );

        let reporter = ProgressReporter::new(sink, game_id);
        retry_with_budget(max_retries, |attempt| {
            let reporter = &reporter;
            async move {
                self.generate_once(user_input, difficulty, attempt, reporter)
                    .await
            }
        })
        .await
        .map_err(|exhausted| {
            tracing::error!(
                attempts = exhausted.attempts,
                error = %exhausted.last,
                "scenario generation exhausted its retry budget"
            );
            GenerationError {
                attempts: exhausted.attempts,
                last: exhausted.last,
            }
        })
    }

    async fn generate_once(
        &self,
        user_input: &str,
        difficulty: Difficulty,
        attempt: Attempt,
        reporter: &ProgressReporter<'_>,
    ) -> Result<KnowledgePack, AttemptError> {
        reporter.generating_scenario().await;
        let skeleton = self.phase1(user_input, difficulty, &attempt).await?;

        let murderers: Vec<&CharacterBlueprint> = skeleton
            .character_blueprints
            .iter()
            .filter(|b| b.is_murderer)
            .collect();
        if murderers.len() != 1 {
            return Err(AttemptError::Invalid(format!(
                "expected exactly one murderer, got {}",
                murderers.len()
            )));
        }
        if murderers[0].id != skeleton.solution.murderer_id {
            return Err(AttemptError::Invalid(format!(
                "solution names '{}' but the murderer blueprint is '{}'",
                skeleton.solution.murderer_id, murderers[0].id
            )));
        }
        reporter.scenario_complete().await;

        let total = skeleton.character_blueprints.len();
        reporter.generating_personas(total).await;
        tracing::info!(characters = total, "fleshing out personas concurrently");

        let completed = AtomicUsize::new(0);
        let details = try_join_all(skeleton.character_blueprints.iter().map(|blueprint| {
            let completed = &completed;
            let skeleton = &skeleton;
            async move {
                let detail = self.phase2(skeleton, blueprint, difficulty).await?;
                let index = completed.fetch_add(1, Ordering::SeqCst);
                reporter
                    .persona_complete(&blueprint.name, index, total)
                    .await;
                Ok::<(String, PersonaDetail), AttemptError>((blueprint.id.clone(), detail))
            }
        }))
        .await?;

        let mut details: std::collections::HashMap<String, PersonaDetail> =
            details.into_iter().collect();

        // Blueprint identity always wins over whatever Phase 2 produced.
        let characters = skeleton
            .character_blueprints
            .iter()
            .map(|blueprint| {
                let detail = details.remove(&blueprint.id).ok_or_else(|| {
                    AttemptError::Invalid(format!("no persona detail for '{}'", blueprint.id))
                })?;
                Ok(Character {
                    id: blueprint.id.clone(),
                    name: blueprint.name.clone(),
                    role: blueprint.role.clone(),
                    public_description: blueprint.public_description.clone(),
                    personality: detail.personality,
                    private_knowledge: detail.private_knowledge,
                    knows_about_others: detail.knows_about_others,
                    clue_keywords: detail
                        .clue_keywords
                        .iter()
                        .map(|k| k.trim().to_lowercase())
                        .filter(|k| !k.is_empty())
                        .collect(),
                })
            })
            .collect::<Result<Vec<Character>, AttemptError>>()?;

        let pack = KnowledgePack {
            name: skeleton.name,
            setting: skeleton.setting,
            victim: skeleton.victim,
            shared_facts: skeleton.shared_facts,
            timeline: skeleton.timeline,
            intro_message: skeleton.intro_message,
            solution: skeleton.solution,
            characters,
        };
        pack.validate()?;

        tracing::info!(case = %pack.name, murderer = %pack.solution.murderer_id, "scenario ready");
        Ok(pack)
    }

    async fn phase1(
        &self,
        user_input: &str,
        difficulty: Difficulty,
        attempt: &Attempt,
    ) -> Result<Skeleton, AttemptError> {
        let system = self.templates.get(prompts::SKELETON_SYSTEM).await;

        let mut user = if user_input.trim().is_empty() {
            format!(
                "Create a random, creative murder mystery scenario.\n\nDifficulty: {difficulty}"
            )
        } else {
            format!(
                "The player wants the following scenario:\n\n{user_input}\n\n\
                 Difficulty: {difficulty}\n\nCreate the scenario."
            )
        };
        if let Some(previous) = &attempt.previous_error {
            user.push_str(&format!(
                "\n\nThe previous attempt failed: {previous}\n\
                 Make sure you create at least 4 complete suspects with exactly one murderer."
            ));
        }

        let value = self
            .model
            .complete_structured(&system, &user, "case_skeleton", &skeleton_schema())
            .await?;
        Ok(coerce("case_skeleton", value).map_err(LlmError::from)?)
    }

    async fn phase2(
        &self,
        skeleton: &Skeleton,
        blueprint: &CharacterBlueprint,
        difficulty: Difficulty,
    ) -> Result<PersonaDetail, AttemptError> {
        let base = self.templates.get(prompts::DETAIL_SYSTEM).await;
        let extension_key = if blueprint.is_murderer {
            prompts::DETAIL_MURDERER
        } else {
            prompts::DETAIL_SUSPECT
        };
        let extension = prompts::render(
            &self.templates.get(extension_key).await,
            &[("deception_posture", difficulty.deception_posture())],
        );

        let mut system = base;
        system.push_str("\n\n");
        system.push_str(&extension);

        let others = skeleton
            .character_blueprints
            .iter()
            .filter(|b| b.id != blueprint.id)
            .map(|b| format!("- {} ({}): {}", b.name, b.role, b.public_description))
            .collect::<Vec<_>>()
            .join("\n");

        let mut user = format!(
            "CASE: {name}\nSETTING: {setting}\nVICTIM: {victim} ({victim_role}): {victim_desc}\n\
             SHARED FACTS:\n{shared}\nTIMELINE:\n{timeline}\n\n\
             SUSPECT TO FLESH OUT:\n\
             id: {id}\nname: {bname}\nrole: {role}\npublic description: {desc}\n\
             secret summary: {secret}\n\nOTHER SUSPECTS:\n{others}",
            name = skeleton.name,
            setting = skeleton.setting,
            victim = skeleton.victim.name,
            victim_role = skeleton.victim.role,
            victim_desc = skeleton.victim.description,
            shared = skeleton.shared_facts,
            timeline = skeleton.timeline,
            id = blueprint.id,
            bname = blueprint.name,
            role = blueprint.role,
            desc = blueprint.public_description,
            secret = blueprint.secret_summary,
        );
        if blueprint.is_murderer {
            user.push_str(&format!(
                "\n\nGROUND TRUTH (for your eyes only): motive: {}; weapon: {}.",
                skeleton.solution.motive, skeleton.solution.weapon
            ));
        }

        let value = self
            .model
            .complete_structured(&system, &user, "persona_detail", &detail_schema())
            .await?;
        Ok(coerce("persona_detail", value).map_err(LlmError::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockModel, RecordingProgress};
    use crate::progress::Stage;

    fn skeleton_value() -> serde_json::Value {
        json!({
            "name": "Death at the Observatory",
            "setting": "A mountain observatory cut off by a snowstorm.",
            "victim": {
                "name": "Dr. Aldo Ricci",
                "role": "Director",
                "description": "Found dead in the telescope dome."
            },
            "shared_facts": "The storm closed the road at 20:00.",
            "timeline": "20:00 road closed. 22:30 body found.",
            "intro_message": "Welcome to the observatory.",
            "solution": {
                "murderer_id": "mira",
                "motive": "He was about to expose her falsified data.",
                "weapon": "A brass counterweight",
                "critical_clues": ["falsified data", "21:40"]
            },
            "character_blueprints": [
                { "id": "mira", "name": "Mira Voss", "role": "Astronomer",
                  "public_description": "Rising star of the institute.",
                  "is_murderer": true, "secret_summary": "Falsified her survey data." },
                { "id": "jonas", "name": "Jonas Falk", "role": "Engineer",
                  "public_description": "Keeps the dome running.",
                  "is_murderer": false, "secret_summary": "Stole spare parts to sell." },
                { "id": "petra", "name": "Petra Lang", "role": "Cook",
                  "public_description": "Heard everything, says little.",
                  "is_murderer": false, "secret_summary": "Reads the guests' mail." },
                { "id": "sven", "name": "Sven Holm", "role": "Night guard",
                  "public_description": "First to find the body.",
                  "is_murderer": false, "secret_summary": "Was asleep on duty." }
            ]
        })
    }

    fn detail_value(tag: &str) -> serde_json::Value {
        json!({
            // Identity echoes are ignored during reassembly.
            "name": format!("Altered {tag}"),
            "personality": format!("You are {tag}: guarded and precise."),
            "private_knowledge": format!("Secret of {tag}."),
            "knows_about_others": format!("{tag}'s opinions of the others."),
            "clue_keywords": ["  21:40 ", "Counterweight", ""]
        })
    }

    fn push_full_run(model: &MockModel) {
        model.push_structured(skeleton_value());
        for tag in ["mira", "jonas", "petra", "sven"] {
            model.push_structured(detail_value(tag));
        }
    }

    #[tokio::test]
    async fn test_generate_assembles_validated_pack() {
        let model = Arc::new(MockModel::new());
        push_full_run(&model);
        let generator = ScenarioGenerator::new(model);

        let pack = generator
            .generate("an observatory in a snowstorm", Difficulty::Medium, 0)
            .await
            .unwrap();

        assert_eq!(pack.name, "Death at the Observatory");
        assert_eq!(pack.characters.len(), 4);
        assert_eq!(pack.solution.murderer_id, "mira");
        assert!(pack.validate().is_ok());

        // Blueprint identity wins over the model's altered echo.
        let mira = pack.character("mira").unwrap();
        assert_eq!(mira.name, "Mira Voss");
        assert_eq!(mira.personality, "You are mira: guarded and precise.");

        // Keywords are trimmed, lowercased, and stripped of empties.
        assert_eq!(mira.clue_keywords, vec!["21:40", "counterweight"]);
    }

    #[tokio::test]
    async fn test_generate_emits_staged_progress() {
        let model = Arc::new(MockModel::new());
        push_full_run(&model);
        let generator = ScenarioGenerator::new(model);
        let sink = RecordingProgress::new();

        generator
            .generate_with_progress("", Difficulty::Easy, 0, &sink, "g1")
            .await
            .unwrap();

        let stages: Vec<Stage> = sink.updates().iter().map(|u| u.stage).collect();
        assert_eq!(stages[0], Stage::GeneratingScenario);
        assert_eq!(stages[1], Stage::ScenarioComplete);
        assert_eq!(stages[2], Stage::GeneratingPersonas);
        assert_eq!(
            stages[3..].iter().filter(|s| **s == Stage::PersonaComplete).count(),
            4
        );
    }

    #[tokio::test]
    async fn test_two_murderers_fails_attempt() {
        let model = Arc::new(MockModel::new());
        let mut bad = skeleton_value();
        bad["character_blueprints"][1]["is_murderer"] = json!(true);
        model.push_structured(bad);
        let generator = ScenarioGenerator::new(model);

        let err = generator.generate("", Difficulty::Medium, 0).await.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(matches!(err.last, AttemptError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_bad_skeleton() {
        let model = Arc::new(MockModel::new());
        let mut bad = skeleton_value();
        bad["solution"]["murderer_id"] = json!("nobody");
        model.push_structured(bad);
        push_full_run(&model);
        let generator = ScenarioGenerator::new(model);

        let pack = generator.generate("", Difficulty::Hard, 1).await.unwrap();
        assert_eq!(pack.solution.murderer_id, "mira");
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_last_cause() {
        let model = Arc::new(MockModel::new());
        model.fail_next_structured("rate limited");
        model.fail_next_structured("server exploded");
        let generator = ScenarioGenerator::new(model);

        let err = generator.generate("", Difficulty::Medium, 1).await.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(err.to_string().contains("server exploded"));
    }

    #[tokio::test]
    async fn test_retry_with_budget_passes_previous_error() {
        let mut seen: Vec<Option<String>> = Vec::new();
        let result: Result<u32, RetryExhausted<String>> =
            retry_with_budget(2, |attempt: Attempt| {
                seen.push(attempt.previous_error.clone());
                let number = attempt.number;
                async move {
                    if number < 2 {
                        Err(format!("boom {number}"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(
            seen,
            vec![None, Some("boom 0".to_string()), Some("boom 1".to_string())]
        );
    }

    #[test]
    fn test_difficulty_round_trip() {
        assert_eq!(Difficulty::Hard.to_string(), "hard");
        let parsed: Difficulty = serde_json::from_str("\"easy\"").unwrap();
        assert_eq!(parsed, Difficulty::Easy);
        assert_eq!(Difficulty::default(), Difficulty::Medium);
    }
}
