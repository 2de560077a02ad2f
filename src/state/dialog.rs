//! Dialog Profile State
//!
//! What one dialog profile remembers across conversations. Facts are held
//! in separate sets; the flat `PREFIX:<id>` boolean map only exists at the
//! import/export boundary.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ids::{DialogProfileId, ResponseId, TopicId};

const TOPIC_SEEN: &str = "TOPIC_SEEN";
const TOPIC_UNLOCKED: &str = "TOPIC_UNLOCKED";
const RESPONSE_SEEN: &str = "RESPONSE_SEEN";
const MEMORY: &str = "MEMORY";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogProfileState {
    pub profile_id: DialogProfileId,
    pub seen_topics: BTreeSet<TopicId>,
    pub unlocked_topics: BTreeSet<TopicId>,
    pub seen_responses: BTreeSet<ResponseId>,
    /// Free-form flags set by dialog effects
    pub memory: BTreeSet<String>,
}

impl DialogProfileState {
    pub fn new(profile_id: DialogProfileId) -> Self {
        Self {
            profile_id,
            ..Default::default()
        }
    }

    pub fn mark_topic_seen(&mut self, topic: &TopicId) {
        self.seen_topics.insert(topic.clone());
    }

    pub fn is_topic_seen(&self, topic: &TopicId) -> bool {
        self.seen_topics.contains(topic)
    }

    pub fn unlock_topic(&mut self, topic: &TopicId) {
        self.unlocked_topics.insert(topic.clone());
    }

    pub fn is_topic_unlocked(&self, topic: &TopicId) -> bool {
        self.unlocked_topics.contains(topic)
    }

    pub fn mark_response_seen(&mut self, response: &ResponseId) {
        self.seen_responses.insert(response.clone());
    }

    pub fn is_response_seen(&self, response: &ResponseId) -> bool {
        self.seen_responses.contains(response)
    }

    pub fn set_memory(&mut self, key: &str) {
        self.memory.insert(key.to_string());
    }

    pub fn has_memory(&self, key: &str) -> bool {
        self.memory.contains(key)
    }

    /// Import a flat memory map. Unknown prefixes and empty suffixes fail;
    /// `false` entries are validated but not recorded.
    pub fn from_memory_map(
        profile_id: DialogProfileId,
        map: &BTreeMap<String, bool>,
    ) -> CoreResult<Self> {
        let mut state = Self::new(profile_id);
        for (key, set) in map {
            let (prefix, rest) = key
                .split_once(':')
                .filter(|(_, rest)| !rest.is_empty())
                .ok_or_else(|| bad_key(&state.profile_id, key))?;
            if !set {
                if ![TOPIC_SEEN, TOPIC_UNLOCKED, RESPONSE_SEEN, MEMORY].contains(&prefix) {
                    return Err(bad_key(&state.profile_id, key));
                }
                continue;
            }
            match prefix {
                TOPIC_SEEN => state.mark_topic_seen(&TopicId::new(rest)),
                TOPIC_UNLOCKED => state.unlock_topic(&TopicId::new(rest)),
                RESPONSE_SEEN => state.mark_response_seen(&ResponseId::new(rest)),
                MEMORY => state.set_memory(rest),
                _ => return Err(bad_key(&state.profile_id, key)),
            }
        }
        Ok(state)
    }

    /// Export to the flat memory map.
    pub fn to_memory_map(&self) -> BTreeMap<String, bool> {
        let mut map = BTreeMap::new();
        for t in &self.seen_topics {
            map.insert(format!("{}:{}", TOPIC_SEEN, t), true);
        }
        for t in &self.unlocked_topics {
            map.insert(format!("{}:{}", TOPIC_UNLOCKED, t), true);
        }
        for r in &self.seen_responses {
            map.insert(format!("{}:{}", RESPONSE_SEEN, r), true);
        }
        for m in &self.memory {
            map.insert(format!("{}:{}", MEMORY, m), true);
        }
        map
    }
}

fn bad_key(profile_id: &DialogProfileId, key: &str) -> CoreError {
    CoreError::invalid(
        "dialog profile state",
        profile_id,
        format!("invalid memory key '{}'", key),
    )
}
