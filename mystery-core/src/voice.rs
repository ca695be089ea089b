//! Voice synthesis: assignment of voices to characters and best-effort
//! text-to-speech.
//!
//! Synthesis failures never fail a turn; the turn simply carries no audio.

use crate::scenario::Character;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

const ELEVENLABS_API_BASE: &str = "https://api.elevenlabs.io/v1";
const TTS_MODEL: &str = "eleven_multilingual_v2";

/// Best-effort text-to-speech capability.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with the given voice. `None` means "no audio for
    /// this turn" and is never an error the caller must handle.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Option<Vec<u8>>;
}

/// Synthesizer that never produces audio. Used when no TTS key is
/// configured.
#[derive(Default)]
pub struct NullVoice;

#[async_trait]
impl SpeechSynthesizer for NullVoice {
    async fn synthesize(&self, _text: &str, _voice_id: &str) -> Option<Vec<u8>> {
        None
    }
}

/// ElevenLabs-backed synthesizer.
pub struct ElevenLabsVoice {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: TtsSettings,
}

#[derive(Serialize)]
struct TtsSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

impl ElevenLabsVoice {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: ELEVENLABS_API_BASE.to_string(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Build from `ELEVENLABS_API_KEY`, or `None` when unset.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("ELEVENLABS_API_KEY").ok()?;
        if api_key.is_empty() {
            return None;
        }
        Some(Self::new(api_key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsVoice {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Option<Vec<u8>> {
        if voice_id.is_empty() {
            return None;
        }

        let url = format!("{}/text-to-speech/{voice_id}", self.base_url);
        let body = TtsRequest {
            text,
            model_id: TTS_MODEL,
            voice_settings: TtsSettings {
                stability: 0.5,
                similarity_boost: 0.75,
                style: 0.0,
                use_speaker_boost: true,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => match response.bytes().await {
                Ok(bytes) => {
                    tracing::info!(voice_id, bytes = bytes.len(), "synthesized audio");
                    Some(bytes.to_vec())
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read audio body");
                    None
                }
            },
            Ok(response) => {
                tracing::warn!(status = %response.status(), "voice synthesis failed");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "voice synthesis failed");
                None
            }
        }
    }
}

/// Voice pools loaded from the environment.
#[derive(Debug, Clone, Default)]
pub struct VoicePools {
    pub female: Vec<String>,
    pub male: Vec<String>,
}

impl VoicePools {
    /// Read `ELEVENLABS_VOICE_FEMALE_1..4` and `ELEVENLABS_VOICE_MALE_1..4`,
    /// dropping unset or placeholder entries.
    pub fn from_env() -> Self {
        let read = |prefix: &str| -> Vec<String> {
            (1..=4)
                .filter_map(|i| std::env::var(format!("{prefix}{i}")).ok())
                .filter(|v| !v.is_empty() && !v.starts_with("voice_id_placeholder"))
                .collect()
        };
        Self {
            female: read("ELEVENLABS_VOICE_FEMALE_"),
            male: read("ELEVENLABS_VOICE_MALE_"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.female.is_empty() && self.male.is_empty()
    }
}

/// Guess whether a character should draw from the female voice pool.
///
/// Deliberately crude; a wrong guess only affects the timbre of the audio.
fn is_likely_female(name: &str, role: &str) -> bool {
    let name = name.to_lowercase();
    let role = role.to_lowercase();
    const INDICATORS: &[&str] = &[
        "elena", "lisa", "maria", "anna", "sarah", "julia", "sophie", "isabella", "mrs", "ms",
        "miss", "frau", "she", "her",
    ];
    INDICATORS
        .iter()
        .any(|i| name.contains(i) || role.contains(i))
}

/// Assign a voice to each character, round-robin per pool.
///
/// `fixed` overrides everything (used for the built-in scenario, whose cast
/// has known voices). Characters left without a voice simply play silent.
pub fn assign_voices(
    characters: &[Character],
    pools: &VoicePools,
    fixed: Option<HashMap<String, String>>,
) -> HashMap<String, String> {
    if let Some(fixed) = fixed {
        tracing::info!("using fixed voice mapping");
        return fixed;
    }
    if pools.is_empty() {
        return HashMap::new();
    }

    let mut assignments = HashMap::new();
    let mut female_index = 0;
    let mut male_index = 0;

    for character in characters {
        let prefer_female = is_likely_female(&character.name, &character.role);

        let voice_id = if prefer_female && !pools.female.is_empty() {
            let v = &pools.female[female_index % pools.female.len()];
            female_index += 1;
            v
        } else if !pools.male.is_empty() {
            let v = &pools.male[male_index % pools.male.len()];
            male_index += 1;
            v
        } else {
            let v = &pools.female[female_index % pools.female.len()];
            female_index += 1;
            v
        };

        tracing::debug!(character = %character.id, voice = %voice_id, "assigned voice");
        assignments.insert(character.id.clone(), voice_id.clone());
    }

    assignments
}
