//! Staged progress reporting for scenario generation.
//!
//! Generation takes long enough that callers want to show the player how far
//! along it is. Updates are published through a [`ProgressSink`]; publishing
//! is fire-and-forget, so a broken sink degrades to a silent progress bar
//! rather than a failed generation.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

/// Where a generation run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Started,
    GeneratingScenario,
    ScenarioComplete,
    GeneratingPersonas,
    PersonaComplete,
    GeneratingImages,
    InitializingGame,
    Complete,
    Error,
}

/// One progress update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub game_id: String,
    pub stage: Stage,
    /// 0..=100.
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_personas: Option<usize>,
}

impl ProgressUpdate {
    fn simple(game_id: &str, stage: Stage, progress: u8, message: impl Into<String>) -> Self {
        Self {
            game_id: game_id.to_string(),
            stage,
            progress,
            message: message.into(),
            persona_name: None,
            persona_index: None,
            total_personas: None,
        }
    }
}

/// Receives progress updates. Implementations must never fail the caller.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish(&self, update: ProgressUpdate);
}

/// Discards all updates.
pub struct NullProgress;

#[async_trait]
impl ProgressSink for NullProgress {
    async fn publish(&self, _update: ProgressUpdate) {}
}

/// Posts updates to a backend that relays them to the player's client.
pub struct HttpProgressSink {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpProgressSink {
    /// `endpoint` is the full URL updates are posted to, e.g.
    /// `http://backend/api/internal/progress`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ProgressSink for HttpProgressSink {
    async fn publish(&self, update: ProgressUpdate) {
        let result = self
            .client
            .post(&self.endpoint)
            .timeout(PUBLISH_TIMEOUT)
            .json(&update)
            .send()
            .await;
        match result {
            Ok(_) => {
                tracing::debug!(stage = ?update.stage, progress = update.progress, "progress sent")
            }
            Err(err) => tracing::warn!(error = %err, "failed to send progress update"),
        }
    }
}

/// Typed helpers for the fixed stages of a generation run.
pub struct ProgressReporter<'a> {
    sink: &'a dyn ProgressSink,
    game_id: &'a str,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink, game_id: &'a str) -> Self {
        Self { sink, game_id }
    }

    pub async fn started(&self) {
        self.send(Stage::Started, 0, "Generation started...").await;
    }

    pub async fn generating_scenario(&self) {
        self.send(Stage::GeneratingScenario, 10, "Drafting the scenario...")
            .await;
    }

    pub async fn scenario_complete(&self) {
        self.send(
            Stage::ScenarioComplete,
            40,
            "Scenario drafted, generating characters...",
        )
        .await;
    }

    pub async fn generating_personas(&self, total: usize) {
        let mut update = ProgressUpdate::simple(
            self.game_id,
            Stage::GeneratingPersonas,
            45,
            format!("Generating {total} characters in parallel..."),
        );
        update.total_personas = Some(total);
        self.sink.publish(update).await;
    }

    /// Persona completions walk progress from 45% to 80%.
    pub async fn persona_complete(&self, name: &str, index: usize, total: usize) {
        let progress = 45 + (35 * (index + 1) / total.max(1)) as u8;
        let mut update = ProgressUpdate::simple(
            self.game_id,
            Stage::PersonaComplete,
            progress,
            format!("Character '{name}' ready ({}/{total})", index + 1),
        );
        update.persona_name = Some(name.to_string());
        update.persona_index = Some(index);
        update.total_personas = Some(total);
        self.sink.publish(update).await;
    }

    pub async fn generating_images(&self) {
        self.send(
            Stage::GeneratingImages,
            85,
            "Generating crime scene images...",
        )
        .await;
    }

    pub async fn initializing_game(&self) {
        self.send(Stage::InitializingGame, 95, "Initializing the game...")
            .await;
    }

    pub async fn complete(&self) {
        self.send(Stage::Complete, 100, "Generation complete").await;
    }

    pub async fn error(&self, message: &str) {
        self.send(Stage::Error, 0, format!("Error: {message}")).await;
    }

    async fn send(&self, stage: Stage, progress: u8, message: impl Into<String>) {
        self.sink
            .publish(ProgressUpdate::simple(self.game_id, stage, progress, message))
            .await;
    }
}
