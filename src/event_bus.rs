//! Event Bus
//!
//! Synchronous, in-process publish/subscribe. `publish` runs every callback
//! registered for the event type, in registration order, on the calling
//! thread, then every subscribe-all callback. A callback may publish again;
//! the nested event is delivered depth-first before the outer call continues.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::ids::CharacterDefId;

// ============================================================================
// Event Types
// ============================================================================

/// Well-known event types.
pub mod event_types {
    /// Player enters a map
    pub const VISIT_MAP: &str = "visit_map";
    /// Fired once per in-game hour
    pub const TIME_PASS: &str = "time_pass";
    pub const QUEST_STARTED: &str = "quest_started";
    pub const QUEST_COMPLETED: &str = "quest_completed";
    pub const QUEST_FAILED: &str = "quest_failed";
    pub const QUEST_OBJECTIVE_COMPLETED: &str = "quest_objective_completed";
    pub const DIALOG_STARTED: &str = "dialog_started";
    pub const DIALOG_ENDED: &str = "dialog_ended";
    pub const KILL: &str = "kill";
    pub const ATTACK: &str = "attack";
    pub const TALK: &str = "talk";
    pub const GET_ITEM: &str = "get_item";
}

/// Payload keys shared by publishers and subscribers.
pub mod keys {
    pub const QUEST_ID: &str = "QUEST_ID";
    pub const OBJECTIVE_ID: &str = "OBJECTIVE_ID";
    pub const MAP_ID: &str = "MAP_ID";
    pub const HOUR: &str = "HOUR";
    pub const PROFILE_ID: &str = "profile_id";
    pub const TARGET: &str = "target";
    pub const COUNT: &str = "count";
    pub const TASK_DEF: &str = "task_def";
}

/// Event type used to hand a task to one specific NPC.
pub fn npc_assign_task_type(npc_id: &CharacterDefId) -> String {
    format!("NPC:{}:assign_task", npc_id)
}

// ============================================================================
// Event
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Map::new(),
        }
    }

    /// Builder-style payload insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(Value::as_u64)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.event_type, Value::Object(self.data.clone()))
    }
}

// ============================================================================
// Bus
// ============================================================================

type Callback = Rc<dyn Fn(&Event) -> CoreResult<()>>;

struct Subscription {
    subscriber_id: String,
    callback: Callback,
}

#[derive(Default)]
pub struct EventBus {
    /// Every subscriber id ever registered and not yet removed
    subscriber_ids: RefCell<HashSet<String>>,
    by_type: RefCell<HashMap<String, Vec<Subscription>>>,
    all: RefCell<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim_id(&self, subscriber_id: &str) -> CoreResult<()> {
        if subscriber_id.is_empty() {
            return Err(CoreError::EmptyId { kind: "subscriber" });
        }
        if !self.subscriber_ids.borrow_mut().insert(subscriber_id.to_string()) {
            return Err(CoreError::duplicate("subscriber", subscriber_id));
        }
        Ok(())
    }

    /// Register `callback` for one event type. Subscriber ids are unique
    /// across the whole bus; give each subscription its own id.
    pub fn subscribe<F>(&self, subscriber_id: &str, event_type: &str, callback: F) -> CoreResult<()>
    where
        F: Fn(&Event) -> CoreResult<()> + 'static,
    {
        if event_type.is_empty() {
            return Err(CoreError::EmptyId { kind: "event type" });
        }
        self.claim_id(subscriber_id)?;
        info!("{} subscribed to event type {}", subscriber_id, event_type);
        self.by_type
            .borrow_mut()
            .entry(event_type.to_string())
            .or_default()
            .push(Subscription {
                subscriber_id: subscriber_id.to_string(),
                callback: Rc::new(callback),
            });
        Ok(())
    }

    /// Register `callback` for every event, delivered after typed subscribers.
    pub fn subscribe_all<F>(&self, subscriber_id: &str, callback: F) -> CoreResult<()>
    where
        F: Fn(&Event) -> CoreResult<()> + 'static,
    {
        self.claim_id(subscriber_id)?;
        info!("{} subscribed to ALL event types", subscriber_id);
        self.all.borrow_mut().push(Subscription {
            subscriber_id: subscriber_id.to_string(),
            callback: Rc::new(callback),
        });
        Ok(())
    }

    /// Subscribe to the assign-task events of one NPC. Returns the derived
    /// subscriber id, needed later to unsubscribe.
    pub fn subscribe_npc_events<F>(
        &self,
        subscriber_id: &str,
        npc_id: &CharacterDefId,
        callback: F,
    ) -> CoreResult<String>
    where
        F: Fn(&Event) -> CoreResult<()> + 'static,
    {
        if npc_id.is_empty() {
            return Err(CoreError::EmptyId { kind: "npc" });
        }
        let sub_id = format!("{}_{}_assign_task", subscriber_id, npc_id);
        self.subscribe(&sub_id, &npc_assign_task_type(npc_id), callback)?;
        Ok(sub_id)
    }

    /// Remove a subscription. Returns false if the id was not registered.
    pub fn unsubscribe(&self, subscriber_id: &str) -> bool {
        if !self.subscriber_ids.borrow_mut().remove(subscriber_id) {
            return false;
        }
        for subs in self.by_type.borrow_mut().values_mut() {
            subs.retain(|s| s.subscriber_id != subscriber_id);
        }
        self.all.borrow_mut().retain(|s| s.subscriber_id != subscriber_id);
        debug!("{} unsubscribed", subscriber_id);
        true
    }

    pub fn is_subscribed(&self, subscriber_id: &str) -> bool {
        self.subscriber_ids.borrow().contains(subscriber_id)
    }

    /// Deliver `event` to its subscribers. Stops at the first callback error.
    pub fn publish(&self, event: Event) -> CoreResult<()> {
        debug!("EVENT {}", event);

        // Snapshot the callbacks so subscribers may (un)subscribe or publish
        // while this event is being delivered.
        let callbacks: Vec<Callback> = {
            let by_type = self.by_type.borrow();
            let all = self.all.borrow();
            by_type
                .get(&event.event_type)
                .into_iter()
                .flatten()
                .chain(all.iter())
                .map(|s| Rc::clone(&s.callback))
                .collect()
        };

        for callback in callbacks {
            callback(&event)?;
        }
        Ok(())
    }
}
