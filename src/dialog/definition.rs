//! Dialog Definition Structures
//!
//! Profiles, topics, responses and replies as authored in content files.
//! Conditions, effects and actions are closed enums tagged by `type`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::ids::{CharacterDefId, CultureId, DialogProfileId, ResponseId, TopicId};
use crate::registry::Definition;

/// Synthetic topic that ends the conversation
pub const QUIT_TOPIC: &str = "QUIT";
pub const QUIT_PROMPT: &str = "Goodbye";

/// Placeholder replaced with the player's name in response text
pub const VAR_PLAYER_NAME: &str = "{player_name}";

fn yes() -> bool {
    true
}

// ============================================================================
// Conditions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogCondition {
    /// The character def belongs to the given culture
    CharacterCulture {
        character: CharacterDefId,
        culture: CultureId,
    },
    PlayerCulture {
        culture: CultureId,
    },
    TopicSeen {
        topic: TopicId,
        #[serde(default = "yes")]
        seen: bool,
    },
    TopicUnlocked {
        topic: TopicId,
        #[serde(default = "yes")]
        unlocked: bool,
    },
    ResponseSeen {
        response: ResponseId,
        #[serde(default = "yes")]
        seen: bool,
    },
    Memory {
        key: String,
        #[serde(default = "yes")]
        set: bool,
    },
}

impl DialogCondition {
    fn validate(&self) -> Result<(), String> {
        let empty = match self {
            DialogCondition::CharacterCulture { character, culture } => {
                character.is_empty() || culture.is_empty()
            }
            DialogCondition::PlayerCulture { culture } => culture.is_empty(),
            DialogCondition::TopicSeen { topic, .. } => topic.is_empty(),
            DialogCondition::TopicUnlocked { topic, .. } => topic.is_empty(),
            DialogCondition::ResponseSeen { response, .. } => response.is_empty(),
            DialogCondition::Memory { key, .. } => key.is_empty(),
        };
        if empty {
            return Err(format!("condition {:?} has an empty parameter", self));
        }
        Ok(())
    }
}

// ============================================================================
// Effects and Actions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogEffect {
    Broadcast {
        event_type: String,
        #[serde(default)]
        data: Map<String, Value>,
    },
    AddGold {
        amount: u64,
    },
    SetMemory {
        key: String,
    },
    UnlockTopic {
        topic: TopicId,
    },
}

impl DialogEffect {
    fn validate(&self) -> Result<(), String> {
        match self {
            DialogEffect::Broadcast { event_type, .. } if event_type.is_empty() => {
                Err("broadcast effect has an empty event type".into())
            }
            DialogEffect::SetMemory { key } if key.is_empty() => {
                Err("set_memory effect has an empty key".into())
            }
            DialogEffect::UnlockTopic { topic } if topic.is_empty() => {
                Err("unlock_topic effect has an empty topic".into())
            }
            _ => Ok(()),
        }
    }
}

/// Where the result of an action is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionScope {
    PlayerName,
}

/// Interrupts a response until the host reports a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogAction {
    GetUserInput {
        scope: ActionScope,
        #[serde(default)]
        title: String,
    },
}

// ============================================================================
// Responses and Replies
// ============================================================================

/// A choice offered to the player after a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogReply {
    pub text: String,
    #[serde(default)]
    pub conditions: Vec<DialogCondition>,
    #[serde(default)]
    pub effects: Vec<DialogEffect>,
    /// How the NPC reacts; `None` returns to topic selection
    #[serde(default)]
    pub next_response: Option<Box<DialogResponse>>,
    /// Topic unlocked when the reply ends the exchange
    #[serde(default)]
    pub next_topic: Option<TopicId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogResponse {
    /// Only needed for memory tracking; required when `once` is set
    #[serde(default)]
    pub id: Option<ResponseId>,
    pub text: String,
    #[serde(default)]
    pub conditions: Vec<DialogCondition>,
    #[serde(default)]
    pub effects: Vec<DialogEffect>,
    /// Topics unlocked when this response plays
    #[serde(default)]
    pub next_topics: Vec<TopicId>,
    /// Ineligible once seen
    #[serde(default)]
    pub once: bool,
    #[serde(default)]
    pub replies: Vec<DialogReply>,
    #[serde(default)]
    pub action: Option<DialogAction>,
    #[serde(default)]
    pub next_response: Option<Box<DialogResponse>>,
    /// Conditional alternative to `next_response`; first match plays
    #[serde(default)]
    pub next_response_options: Vec<DialogResponse>,
}

impl DialogResponse {
    pub fn new(text: &str) -> Self {
        Self {
            id: None,
            text: text.to_string(),
            conditions: Vec::new(),
            effects: Vec::new(),
            next_topics: Vec::new(),
            once: false,
            replies: Vec::new(),
            action: None,
            next_response: None,
            next_response_options: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.once && self.id.as_ref().is_none_or(|id| id.is_empty()) {
            return Err("responses marked once must have an id".into());
        }
        if self.text.is_empty() {
            return Err("response text is empty".into());
        }
        for cond in &self.conditions {
            cond.validate()?;
        }
        for effect in &self.effects {
            effect.validate()?;
        }
        if self.next_topics.iter().any(|t| t.is_empty()) {
            return Err("response unlocks an empty topic id".into());
        }
        for reply in &self.replies {
            if reply.text.is_empty() {
                return Err("reply text is empty".into());
            }
            for cond in &reply.conditions {
                cond.validate()?;
            }
            for effect in &reply.effects {
                effect.validate()?;
            }
            if let Some(next) = &reply.next_response {
                next.validate()?;
            }
        }
        let chains = self.next_response.is_some() || !self.next_response_options.is_empty();
        if chains && !self.replies.is_empty() {
            return Err("has both a chained response and replies".into());
        }
        match &self.next_response {
            Some(next) => {
                if !self.next_response_options.is_empty() {
                    return Err("has next_response and next_response_options".into());
                }
                next.validate()?;
            }
            None => {
                for option in &self.next_response_options {
                    option.validate()?;
                }
            }
        }
        Ok(())
    }

    /// Every topic this response (or anything nested in it) can unlock.
    pub fn referenced_topics(&self, out: &mut Vec<TopicId>) {
        out.extend(self.next_topics.iter().cloned());
        for effect in &self.effects {
            if let DialogEffect::UnlockTopic { topic } = effect {
                out.push(topic.clone());
            }
        }
        for reply in &self.replies {
            out.extend(reply.next_topic.iter().cloned());
            for effect in &reply.effects {
                if let DialogEffect::UnlockTopic { topic } = effect {
                    out.push(topic.clone());
                }
            }
            if let Some(next) = &reply.next_response {
                next.referenced_topics(out);
            }
        }
        if let Some(next) = &self.next_response {
            next.referenced_topics(out);
        }
        for option in &self.next_response_options {
            option.referenced_topics(out);
        }
    }
}

// ============================================================================
// Topics and Profiles
// ============================================================================

/// A subject the player can raise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogTopic {
    pub id: TopicId,
    pub prompt: String,
    /// Whether the topic is offered; AND logic
    #[serde(default)]
    pub conditions: Vec<DialogCondition>,
    pub responses: Vec<DialogResponse>,
}

impl Definition for DialogTopic {
    type Id = TopicId;
    const KIND: &'static str = "dialog topic";

    fn id(&self) -> &TopicId {
        &self.id
    }

    fn validate(&self) -> CoreResult<()> {
        if self.id.as_str() == QUIT_TOPIC {
            return Err(CoreError::invalid(Self::KIND, &self.id, "QUIT is reserved"));
        }
        if self.prompt.is_empty() {
            return Err(CoreError::invalid(Self::KIND, &self.id, "prompt is empty"));
        }
        if self.responses.is_empty() {
            return Err(CoreError::invalid(Self::KIND, &self.id, "no responses"));
        }
        for cond in &self.conditions {
            cond.validate()
                .map_err(|reason| CoreError::invalid(Self::KIND, &self.id, reason))?;
        }
        for response in &self.responses {
            response
                .validate()
                .map_err(|reason| CoreError::invalid(Self::KIND, &self.id, reason))?;
        }
        Ok(())
    }
}

/// Greetings plus the topics an NPC can discuss. May be shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogProfileDef {
    pub id: DialogProfileId,
    pub greeting: Vec<DialogResponse>,
    #[serde(default)]
    pub topics: Vec<TopicId>,
}

impl Definition for DialogProfileDef {
    type Id = DialogProfileId;
    const KIND: &'static str = "dialog profile";

    fn id(&self) -> &DialogProfileId {
        &self.id
    }

    fn validate(&self) -> CoreResult<()> {
        if self.greeting.is_empty() {
            return Err(CoreError::invalid(Self::KIND, &self.id, "no greeting"));
        }
        for response in &self.greeting {
            response
                .validate()
                .map_err(|reason| CoreError::invalid(Self::KIND, &self.id, reason))?;
        }
        if self.topics.iter().any(|t| t.is_empty()) {
            return Err(CoreError::invalid(Self::KIND, &self.id, "empty topic id"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_once_requires_id() {
        let mut response = DialogResponse::new("Welcome back.");
        response.once = true;
        assert!(response.validate().is_err());
        response.id = Some(ResponseId::new("welcome_once"));
        assert!(response.validate().is_ok());
    }

    #[test]
    fn test_next_response_exclusive_with_options() {
        let mut response = DialogResponse::new("Listen.");
        response.next_response = Some(Box::new(DialogResponse::new("More.")));
        response.next_response_options.push(DialogResponse::new("Other."));
        assert!(response.validate().is_err());
    }

    #[test]
    fn test_chained_response_excludes_replies() {
        let reply = DialogReply {
            text: "Go on".into(),
            conditions: vec![],
            effects: vec![],
            next_response: None,
            next_topic: None,
        };

        let mut response = DialogResponse::new("Listen.");
        response.next_response = Some(Box::new(DialogResponse::new("More.")));
        response.replies.push(reply.clone());
        assert!(response.validate().is_err());

        let mut response = DialogResponse::new("Listen.");
        response.next_response_options.push(DialogResponse::new("Other."));
        response.replies.push(reply);
        assert!(response.validate().is_err());
    }

    #[test]
    fn test_topic_validation() {
        let topic = DialogTopic {
            id: TopicId::new("rumors"),
            prompt: String::new(),
            conditions: vec![],
            responses: vec![DialogResponse::new("Nothing new.")],
        };
        assert!(topic.validate().is_err());

        let quit = DialogTopic {
            id: TopicId::new(QUIT_TOPIC),
            prompt: "Bye".into(),
            conditions: vec![],
            responses: vec![DialogResponse::new("Bye.")],
        };
        assert!(quit.validate().is_err());
    }

    #[test]
    fn test_topic_from_toml() {
        let topic: DialogTopic = toml::from_str(
            r#"
id = "rumors"
prompt = "Any rumors?"
conditions = [{ type = "topic_seen", topic = "background" }]

[[responses]]
text = "They say the old mine is haunted."
next_topics = ["old_mine"]
effects = [{ type = "add_gold", amount = 5 }]

[[responses.replies]]
text = "Haunted?"
next_topic = "ghosts"
"#,
        )
        .unwrap();
        assert!(topic.validate().is_ok());
        assert_eq!(
            topic.conditions[0],
            DialogCondition::TopicSeen {
                topic: TopicId::new("background"),
                seen: true
            }
        );

        let mut refs = Vec::new();
        topic.responses[0].referenced_topics(&mut refs);
        assert_eq!(refs, vec![TopicId::new("old_mine"), TopicId::new("ghosts")]);
    }
}
