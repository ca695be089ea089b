//! One suspect's interrogation agent.
//!
//! A `CharacterAgent` carries a character's static knowledge and, per
//! invocation, composes the system prompt (shared facts + private knowledge
//! + stress framing), calls the model with the character's own slice of the
//! conversation, and applies the turn's state updates.

use crate::clue::detect_clue;
use crate::llm::{ChatModel, ChatTurn, ModelError};
use crate::prompts::{self, TemplateLibrary};
use crate::scenario::{Character, KnowledgePack};
use crate::state::{DynamicState, GameState, MessageEntry, Speaker};
use crate::voice::SpeechSynthesizer;
use std::sync::Arc;
use thiserror::Error;

/// How many prior history entries a character may see.
pub const HISTORY_WINDOW: usize = 10;

/// Errors from a character-agent invocation.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent '{expected}' invoked while '{selected}' was selected")]
    WrongCharacter { expected: String, selected: String },

    #[error("model call failed: {0}")]
    Model(#[from] ModelError),
}

/// Runtime wrapper around one character.
pub struct CharacterAgent {
    id: String,
    name: String,
    role: String,
    personality: String,
    private_knowledge: String,
    knows_about_others: String,
    clue_keywords: Vec<String>,
    voice_id: Option<String>,
    pack: Arc<KnowledgePack>,
    model: Arc<dyn ChatModel>,
    voice: Arc<dyn SpeechSynthesizer>,
    templates: TemplateLibrary,
}

impl CharacterAgent {
    pub fn new(
        character: &Character,
        pack: Arc<KnowledgePack>,
        model: Arc<dyn ChatModel>,
        voice: Arc<dyn SpeechSynthesizer>,
        voice_id: Option<String>,
        templates: TemplateLibrary,
    ) -> Self {
        Self {
            id: character.id.clone(),
            name: character.name.clone(),
            role: character.role.clone(),
            personality: character.personality.clone(),
            private_knowledge: character.private_knowledge.clone(),
            knows_about_others: character.knows_about_others.clone(),
            clue_keywords: character.clue_keywords.clone(),
            voice_id,
            pack,
            model,
            voice,
            templates,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn personality(&self) -> &str {
        &self.personality
    }

    pub fn private_knowledge(&self) -> &str {
        &self.private_knowledge
    }

    pub fn knows_about_others(&self) -> &str {
        &self.knows_about_others
    }

    pub fn clue_keywords(&self) -> &[String] {
        &self.clue_keywords
    }

    pub fn voice_id(&self) -> Option<&str> {
        self.voice_id.as_deref()
    }

    /// The stress framing block for the current dynamic state.
    ///
    /// Tiers are additive: a character above 0.6 stress gets both the
    /// nervousness and the slip-up instructions, and a heavily questioned
    /// one gets the fatigue line on top.
    pub fn stress_modifier(dynamic: &DynamicState) -> String {
        let mut modifier = String::new();

        if dynamic.stress_level > 0.3 {
            modifier.push_str(&format!(
                "\n=== CURRENT CONDITION ===\nStress level: {:.0}%\nYou are noticeably more \
nervous. Your answers get shorter, you hesitate more.\n",
                dynamic.stress_level * 100.0
            ));
        }

        if dynamic.stress_level > 0.6 {
            modifier.push_str(
                "You are highly stressed. You make small mistakes in your statements.\nUnder \
direct confrontation you might let something slip.\n",
            );
        }

        if dynamic.interrogation_count > 5 {
            modifier.push_str(&format!(
                "\nYou have already been questioned {} times. You are getting tired and \
careless.\n",
                dynamic.interrogation_count
            ));
        }

        modifier
    }

    async fn build_system_prompt(&self, state: &GameState) -> String {
        let dynamic = state.dynamic_state(&self.id);
        let stress_modifier = Self::stress_modifier(&dynamic);

        let template = self.templates.get(prompts::CHARACTER_SYSTEM).await;
        prompts::render(
            &template,
            &[
                ("persona_name", &self.name),
                ("persona_role", &self.role),
                ("case_name", &self.pack.name),
                ("personality", &self.personality),
                ("private_knowledge", &self.private_knowledge),
                ("shared_facts", &self.pack.shared_facts),
                ("timeline", &self.pack.timeline),
                ("knows_about_others", &self.knows_about_others),
                ("stress_modifier", &stress_modifier),
            ],
        )
    }

    /// The slice of history this character may see: the last
    /// [`HISTORY_WINDOW`] entries, restricted to player messages and this
    /// character's own replies. Other characters' turns are never shown, so
    /// nobody overhears another interrogation.
    fn filtered_history(&self, state: &GameState) -> Vec<ChatTurn> {
        let mut entries: &[MessageEntry] = &state.message_history;

        // The current player message is passed separately; drop its
        // freshly appended history entry to avoid sending it twice.
        if let Some(last) = entries.last() {
            if last.speaker == Speaker::Player && last.text == state.current_player_message {
                entries = &entries[..entries.len() - 1];
            }
        }

        let start = entries.len().saturating_sub(HISTORY_WINDOW);
        entries[start..]
            .iter()
            .filter_map(|entry| match entry.speaker {
                Speaker::Player => Some(ChatTurn::user(&entry.text)),
                Speaker::Character if entry.character_id.as_deref() == Some(&self.id) => {
                    Some(ChatTurn::assistant(&entry.text))
                }
                Speaker::Character => None,
            })
            .collect()
    }

    /// Run one interrogation turn.
    ///
    /// A model failure propagates without touching the state; all mutations
    /// happen after the call succeeds, so a failed turn is a no-op.
    pub async fn invoke(&self, state: &mut GameState) -> Result<(), AgentError> {
        if state.selected_character_id != self.id {
            return Err(AgentError::WrongCharacter {
                expected: self.id.clone(),
                selected: state.selected_character_id.clone(),
            });
        }

        tracing::info!(character = %self.id, game = %state.game_id, "agent invoked");

        let system_prompt = self.build_system_prompt(state).await;
        let history = self.filtered_history(state);
        let player_message = state.current_player_message.clone();

        let reply = self
            .model
            .complete(&system_prompt, &history, &player_message)
            .await?;

        tracing::debug!(character = %self.id, reply_len = reply.len(), "model replied");

        let detected_clue = detect_clue(&reply, &self.name, &self.clue_keywords);

        // Best effort; a synthesis failure just means a silent turn.
        let audio = match &self.voice_id {
            Some(voice_id) => self.voice.synthesize(&reply, voice_id).await,
            None => None,
        };

        let dynamic = state.character_states.entry(self.id.clone()).or_default();
        dynamic.stress_level = (dynamic.stress_level + 0.1).min(1.0);
        dynamic.interrogation_count += 1;

        if let Some(clue) = &detected_clue {
            tracing::info!(character = %self.id, clue = %clue, "clue revealed");
            state.record_clue(clue.clone());
        }

        let mut entry = MessageEntry::character(&self.id, &reply);
        entry.audio = audio;
        entry.voice_id = self.voice_id.clone();
        state.message_history.push(entry);

        state.final_response = reply;
        state.responding_character_id = self.id.clone();
        state.detected_clue = detected_clue;

        Ok(())
    }
}
