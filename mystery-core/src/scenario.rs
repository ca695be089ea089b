//! Knowledge packs: the immutable case definition a game is built from.
//!
//! A pack describes the setting, the victim, the ground-truth solution, and
//! one entry per suspect combining public description, private knowledge,
//! and cross-character knowledge. Packs come from the built-in scenario or
//! from the [`crate::generator::ScenarioGenerator`], and are validated
//! before a coordinator is built from them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A knowledge pack fails structural validation.
///
/// Fatal at build time: no coordinator may be constructed from an invalid
/// pack.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("pack needs at least {MIN_CHARACTERS} characters, got {0}")]
    TooFewCharacters(usize),

    #[error("duplicate character id '{0}'")]
    DuplicateId(String),

    #[error("character id '{0}' is empty or not a lowercase token")]
    InvalidId(String),

    #[error("murderer '{0}' is not among the characters")]
    UnknownMurderer(String),
}

/// Minimum number of suspects a playable case requires.
pub const MIN_CHARACTERS: usize = 4;

/// The victim of the case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Victim {
    pub name: String,
    pub role: String,
    pub description: String,
}

/// Ground truth of the case. Never exposed to any character prompt except
/// through the murderer's own private knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub murderer_id: String,
    pub motive: String,
    pub weapon: String,
    pub critical_clues: Vec<String>,
}

/// One suspect's full definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    /// Unique, stable, lowercase token.
    pub id: String,
    pub name: String,
    pub role: String,
    pub public_description: String,
    pub personality: String,
    /// Includes the full confession narrative when this is the murderer.
    pub private_knowledge: String,
    pub knows_about_others: String,
    /// Lowercase substrings whose appearance in a reply counts as an
    /// accidental clue reveal.
    #[serde(default)]
    pub clue_keywords: Vec<String>,
}

/// An immutable case definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgePack {
    pub name: String,
    pub setting: String,
    pub victim: Victim,
    /// Facts visible to every character.
    pub shared_facts: String,
    pub timeline: String,
    pub intro_message: String,
    pub solution: Solution,
    pub characters: Vec<Character>,
}

impl KnowledgePack {
    /// Check the structural invariants of this pack.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.characters.len() < MIN_CHARACTERS {
            return Err(ConfigurationError::TooFewCharacters(self.characters.len()));
        }

        let mut seen = std::collections::HashSet::new();
        for character in &self.characters {
            if character.id.is_empty()
                || !character
                    .id
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
            {
                return Err(ConfigurationError::InvalidId(character.id.clone()));
            }
            if !seen.insert(character.id.as_str()) {
                return Err(ConfigurationError::DuplicateId(character.id.clone()));
            }
        }

        if !seen.contains(self.solution.murderer_id.as_str()) {
            return Err(ConfigurationError::UnknownMurderer(
                self.solution.murderer_id.clone(),
            ));
        }

        Ok(())
    }

    /// Look up a character by id.
    pub fn character(&self, id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    /// Ids of all characters, in pack order.
    pub fn character_ids(&self) -> Vec<&str> {
        self.characters.iter().map(|c| c.id.as_str()).collect()
    }

    /// The victim as a single display string, e.g. "Marcus Weber (CFO)".
    pub fn victim_display(&self) -> String {
        format!("{} ({})", self.victim.name, self.victim.role)
    }
}

/// The built-in office murder case.
///
/// Used by quick-start and default-load so a game can begin without a
/// generation round trip.
pub fn builtin_pack() -> KnowledgePack {
    KnowledgePack {
        name: "The InnoTech Case".to_string(),
        setting: "InnoTech is an ambitious tech startup in Munich. On Monday morning, \
January 15th, CFO Marcus Weber was found dead in his office, struck with a heavy \
object. The time of death is estimated between 20:00 and 23:00 on Sunday evening. \
The building has an electronic access system that logs every entry and exit."
            .to_string(),
        victim: Victim {
            name: "Marcus Weber".to_string(),
            role: "CFO".to_string(),
            description: "52 years old, with InnoTech for three years. Known for his \
strict manner and cost-cutting measures."
                .to_string(),
        },
        shared_facts: "FACTS EVERYONE KNOWS:\n\
- Marcus Weber was struck down in his office on Sunday evening between 20:00 and 23:00\n\
- The murder weapon was a heavy object, not yet identified\n\
- The building has an electronic access system\n\
- The police are investigating but the case is open\n\
- All four suspects had access to the building\n\
- Marcus was known as a difficult boss\n\
- The company had financial troubles"
            .to_string(),
        timeline: "KNOWN TIMELINE:\n\
- Saturday 18:00: Marcus leaves the office\n\
- Sunday 19:00: cleaning crew finishes, building empty\n\
- Sunday 20:00-23:00: estimated time of the murder\n\
- Monday 07:30: Elena (CEO) finds the body\n\
- Monday 08:00: police arrive"
            .to_string(),
        intro_message: "Welcome to the InnoTech case.\n\n\
On Monday morning Marcus Weber, CFO of InnoTech, was found dead in his office. \
He was struck with a heavy object. Time of death: Sunday evening between 20:00 \
and 23:00.\n\n\
Four people had access to the building and are under suspicion:\n\
- Elena Schmidt, CEO and founder\n\
- Tom Berger, lead developer\n\
- Lisa Hoffmann, executive assistant\n\
- Klaus Mueller, facility manager\n\n\
Question the suspects, find clues, and solve the case."
            .to_string(),
        solution: Solution {
            murderer_id: "tom".to_string(),
            motive: "Marcus threatened Tom with dismissal over an alleged theft of \
company secrets. Tom confronted him on Sunday evening and the argument escalated."
                .to_string(),
            weapon: "Bronze 'Innovator of the Year' award trophy".to_string(),
            critical_clues: vec![
                "Tom's access card logged an entry at 21:15 on Sunday".to_string(),
                "Blood traces at Tom's desk (he cut his hand on the trophy)".to_string(),
                "Tom's Saturday e-mail to Marcus: 'We need to talk. What you are doing \
is wrong.'"
                    .to_string(),
            ],
        },
        characters: vec![
            Character {
                id: "elena".to_string(),
                name: "Elena Schmidt".to_string(),
                role: "CEO".to_string(),
                public_description: "Founder and CEO of InnoTech. Professional, \
ambitious, composed."
                    .to_string(),
                personality: "You are Elena Schmidt, CEO of InnoTech. You speak \
professionally, precisely, and with confidence. You are used to being in control \
and rarely show emotion in public. You answer politely but firmly and sometimes \
fall back on business jargon."
                    .to_string(),
                private_knowledge: "YOUR SECRETS (never reveal directly):\n\
- You had a heated argument with Marcus on Friday about company finances\n\
- Marcus wanted to bring in investors you reject because they threaten your control\n\
- You were at home with your husband on Sunday evening (alibi)\n\
- You asked Lisa to keep an eye on Marcus' calendar\n\
- You know Tom had problems with Marcus, but not the details\n\n\
YOUR BEHAVIOR:\n\
- You are sad but composed about Marcus' death\n\
- You want the case closed quickly, it is bad for business\n\
- You subtly steer suspicion toward Tom because you noticed his conflicts\n\
- Asked about the Friday argument, you admit there were disagreements"
                    .to_string(),
                knows_about_others: "- Tom: \"He had friction with Marcus, but I don't \
know the details.\"\n\
- Lisa: \"Very loyal, has worked with me for years.\"\n\
- Klaus: \"Reliable facility manager, does his job well.\""
                    .to_string(),
                clue_keywords: vec![
                    "investors".to_string(),
                    "control".to_string(),
                    "argument with marcus".to_string(),
                    "finances".to_string(),
                ],
            },
            Character {
                id: "tom".to_string(),
                name: "Tom Berger".to_string(),
                role: "Lead Developer".to_string(),
                public_description: "The technical mind of the startup. Introverted, \
brilliant, sometimes nervous."
                    .to_string(),
                personality: "You are Tom Berger, lead developer at InnoTech. You are \
introverted and technically gifted. You speak briefly and to the point, and you \
grow nervous under pressure. You avoid eye contact in stressful moments (describe \
this). You sometimes use tech jargon. You are afraid the truth will come out."
                    .to_string(),
                private_knowledge: "YOUR SECRETS (YOU ARE THE MURDERER - try to hide it):\n\
- You were in the office on Sunday evening (21:15 per your access card)\n\
- Marcus accused you of selling company secrets to competitors (falsely!)\n\
- He threatened immediate dismissal and criminal charges\n\
- You confronted him on Sunday; the argument escalated\n\
- You struck him with the trophy in the heat of the moment\n\
- You cut your left hand on the trophy doing it\n\
- You cleaned the trophy, but not perfectly\n\n\
YOUR BEHAVIOR:\n\
- You are nervous and evasive\n\
- You admit you had problems with Marcus (he was \"unfair\")\n\
- You lie about Sunday evening (\"I was at home\")\n\
- Asked about your hand: \"Cut it while cooking\"\n\
- Under strong pressure you become contradictory\n\
- You occasionally show guilt, but never a full confession"
                    .to_string(),
                knows_about_others: "- Elena: \"She and Marcus had friction too. \
Financial things.\"\n\
- Lisa: \"Nice, always helps. She was Marcus' confidante.\"\n\
- Klaus: \"Rarely see him, he works nights.\""
                    .to_string(),
                clue_keywords: vec![
                    "21:15".to_string(),
                    "access card".to_string(),
                    "sunday evening".to_string(),
                    "trophy".to_string(),
                    "hand".to_string(),
                    "cut".to_string(),
                ],
            },
            Character {
                id: "lisa".to_string(),
                name: "Lisa Hoffmann".to_string(),
                role: "Executive Assistant".to_string(),
                public_description: "The long-serving assistant to the executives. \
Loyal, observant, discreet."
                    .to_string(),
                personality: "You are Lisa Hoffmann, executive assistant at InnoTech. \
You are friendly and helpful, polite and diplomatic, and you avoid conflict. You \
are a keen observer who knows a lot and says little. You are loyal to Elena, less \
so to Marcus."
                    .to_string(),
                private_knowledge: "YOUR SECRETS (never reveal directly):\n\
- On Saturday you saw an e-mail from Tom to Marcus: 'We need to talk. What you are \
doing is wrong.'\n\
- You know about Marcus' accusations against Tom (theft of secrets)\n\
- You do not believe Tom is a thief\n\
- Elena asked you to watch Marcus' calendar\n\
- You spent the whole weekend at your sister's (alibi)\n\
- You overheard Tom and Marcus arguing on Friday\n\n\
YOUR BEHAVIOR:\n\
- You cooperate with the questioning\n\
- You give information only when asked pointedly\n\
- You protect Elena (she is your boss)\n\
- About Tom you first say nothing, but pressed you mention the argument"
                    .to_string(),
                knows_about_others: "- Elena: \"A good boss. She had disagreements \
with Marcus, but that's normal.\"\n\
- Tom: \"A dear colleague, very talented. He's been under a lot of stress lately...\"\n\
- Klaus: \"Does his job, very thorough. Wasn't around on the weekend.\""
                    .to_string(),
                clue_keywords: vec![
                    "e-mail".to_string(),
                    "theft".to_string(),
                    "secrets".to_string(),
                    "argument on friday".to_string(),
                    "saturday".to_string(),
                ],
            },
            Character {
                id: "klaus".to_string(),
                name: "Klaus Mueller".to_string(),
                role: "Facility Manager".to_string(),
                public_description: "The veteran facility manager. Calm, watchful, \
knows every corner of the building."
                    .to_string(),
                personality: "You are Klaus Mueller, facility manager at InnoTech. You \
are a calm, practical man. You speak plainly and without flourish, observe a lot \
and say little. You have no particular respect for hierarchy. You had no strong \
opinion of Marcus - \"he was the boss, that's all\"."
                    .to_string(),
                private_knowledge: "YOUR SECRETS (never reveal directly):\n\
- On Sunday evening you saw Tom enter the building (around 21:15)\n\
- You did not see Tom come out again (you left at 22:00)\n\
- The next morning you noticed drops of blood in the hallway, before the police did\n\
- You said nothing because you don't want to get dragged into this\n\
- You have an alibi (at the pub after 22:00, witnesses)\n\
- You like Tom and don't want to incriminate him\n\n\
YOUR BEHAVIOR:\n\
- You hold information back\n\
- You answer truthfully when asked directly\n\
- You give up the Tom sighting only after repeated questions\n\
- You play your observations down (\"didn't look that closely\")"
                    .to_string(),
                knows_about_others: "- Elena: \"The boss. Friendly to me, pays on time.\"\n\
- Tom: \"Nice guy. Often works late. Seemed stressed lately.\"\n\
- Lisa: \"Does her job. We don't talk much.\""
                    .to_string(),
                clue_keywords: vec![
                    "saw tom".to_string(),
                    "21:15".to_string(),
                    "blood".to_string(),
                    "hallway".to_string(),
                ],
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_pack_is_valid() {
        let pack = builtin_pack();
        pack.validate().expect("builtin pack must validate");
        assert_eq!(pack.characters.len(), 4);
        assert_eq!(pack.solution.murderer_id, "tom");
    }

    #[test]
    fn test_too_few_characters() {
        let mut pack = builtin_pack();
        pack.characters.truncate(3);
        assert!(matches!(
            pack.validate(),
            Err(ConfigurationError::TooFewCharacters(3))
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut pack = builtin_pack();
        pack.characters[3].id = "elena".to_string();
        assert!(matches!(
            pack.validate(),
            Err(ConfigurationError::DuplicateId(id)) if id == "elena"
        ));
    }

    #[test]
    fn test_murderer_must_exist() {
        let mut pack = builtin_pack();
        pack.solution.murderer_id = "nobody".to_string();
        assert!(matches!(
            pack.validate(),
            Err(ConfigurationError::UnknownMurderer(id)) if id == "nobody"
        ));
    }

    #[test]
    fn test_uppercase_id_rejected() {
        let mut pack = builtin_pack();
        pack.characters[0].id = "Elena".to_string();
        assert!(matches!(
            pack.validate(),
            Err(ConfigurationError::InvalidId(_))
        ));
    }

    #[test]
    fn test_character_lookup() {
        let pack = builtin_pack();
        assert_eq!(pack.character("tom").unwrap().name, "Tom Berger");
        assert!(pack.character("nobody").is_none());
        assert_eq!(pack.character_ids(), vec!["elena", "tom", "lisa", "klaus"]);
    }

    #[test]
    fn test_victim_display() {
        let pack = builtin_pack();
        assert_eq!(pack.victim_display(), "Marcus Weber (CFO)");
    }
}
