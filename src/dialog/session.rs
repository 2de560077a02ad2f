//! Dialog Session
//!
//! One conversation with one dialog profile, driven by the presentation
//! layer:
//!
//! ```text
//! Started -> TextDone -> UserReply -> (reply) -> Started | Finished
//!                     -> Finished  -> (topic) -> Started
//!                     -> (chain)   -> Started
//! ActionInProgress -> (complete_action) -> Started
//! ```
//!
//! The session never draws anything. Callers read `text()`, `replies()` and
//! `topic_options()` and feed choices back in.

use tracing::{debug, info};

use super::condition::conditions_hold;
use super::definition::{
    ActionScope, DialogAction, DialogEffect, DialogReply, DialogResponse, QUIT_PROMPT, QUIT_TOPIC,
    VAR_PLAYER_NAME,
};
use crate::error::{CoreError, CoreResult};
use crate::event_bus::{Event, event_types, keys};
use crate::ids::{DialogProfileId, TopicId};
use crate::world::GameContext;

const MACHINE: &str = "dialog session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogStatus {
    /// Response text is being shown
    Started,
    /// Text fully shown; waiting for `advance`
    TextDone,
    /// Waiting for `apply_reply`
    UserReply,
    /// Waiting for `set_topic`
    Finished,
    /// Waiting for `complete_action`
    ActionInProgress,
}

/// A topic the player may pick right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicOption {
    pub id: TopicId,
    pub prompt: String,
}

pub struct DialogSession<C: GameContext> {
    ctx: C,
    profile_id: DialogProfileId,
    status: DialogStatus,
    current_response: Option<DialogResponse>,
    current_topic: Option<TopicId>,
    text: String,
    /// Replies offered this turn, condition-filtered once on entry
    replies: Vec<DialogReply>,
    exit: bool,
}

impl<C: GameContext> DialogSession<C> {
    /// Open a conversation and play the first matching greeting.
    pub fn new(ctx: C, profile_id: DialogProfileId) -> CoreResult<Self> {
        let greeting = ctx.definitions().dialog_profile(&profile_id)?.greeting.clone();
        // creates the profile state on first conversation
        ctx.dialog_state(&profile_id)?;

        let mut session = Self {
            ctx,
            profile_id,
            status: DialogStatus::Finished,
            current_response: None,
            current_topic: None,
            text: String::new(),
            replies: Vec::new(),
            exit: false,
        };

        info!("Dialog started with {}", session.profile_id);
        session.ctx.broadcast(
            Event::new(event_types::DIALOG_STARTED)
                .with(keys::PROFILE_ID, session.profile_id.as_str()),
        )?;

        let response = session.select_response(&greeting, "greeting")?;
        session.apply_response(response)?;
        Ok(session)
    }

    pub fn profile_id(&self) -> &DialogProfileId {
        &self.profile_id
    }

    pub fn status(&self) -> DialogStatus {
        self.status
    }

    /// Text of the current response, with variables substituted.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn current_topic(&self) -> Option<&TopicId> {
        self.current_topic.as_ref()
    }

    /// Replies offered while in `UserReply`.
    pub fn replies(&self) -> &[DialogReply] {
        &self.replies
    }

    /// Pending action while in `ActionInProgress`.
    pub fn action(&self) -> Option<&DialogAction> {
        match self.status {
            DialogStatus::ActionInProgress => {
                self.current_response.as_ref().and_then(|r| r.action.as_ref())
            }
            _ => None,
        }
    }

    pub fn should_exit(&self) -> bool {
        self.exit
    }

    // ========================================================================
    // Topics
    // ========================================================================

    /// Visible topics: profile topics in order, then unlocked topics, each
    /// condition-filtered and deduplicated, then the quit topic.
    pub fn topic_options(&self) -> CoreResult<Vec<TopicOption>> {
        let defs = self.ctx.definitions();
        let profile = defs.dialog_profile(&self.profile_id)?;
        let memory = self.ctx.dialog_state(&self.profile_id)?;

        let mut ids: Vec<&TopicId> = profile.topics.iter().collect();
        for unlocked in &memory.unlocked_topics {
            if !ids.contains(&unlocked) {
                ids.push(unlocked);
            }
        }

        let mut options = Vec::with_capacity(ids.len() + 1);
        for id in ids {
            let topic = defs.dialog_topic(id)?;
            if conditions_hold(&self.ctx, &memory, &topic.conditions)? {
                options.push(TopicOption {
                    id: topic.id.clone(),
                    prompt: topic.prompt.clone(),
                });
            }
        }
        options.push(TopicOption {
            id: TopicId::new(QUIT_TOPIC),
            prompt: QUIT_PROMPT.to_string(),
        });
        Ok(options)
    }

    /// Pick a topic. Only valid once the previous exchange has finished.
    pub fn set_topic(&mut self, topic_id: &TopicId) -> CoreResult<()> {
        if self.exit {
            return Err(CoreError::misuse(MACHINE, "conversation already ended"));
        }
        if self.status != DialogStatus::Finished {
            return Err(CoreError::misuse(
                MACHINE,
                format!("set_topic({}) while {:?}", topic_id, self.status),
            ));
        }

        if topic_id.as_str() == QUIT_TOPIC {
            self.exit = true;
            info!("Dialog with {} ended", self.profile_id);
            return self.ctx.broadcast(
                Event::new(event_types::DIALOG_ENDED)
                    .with(keys::PROFILE_ID, self.profile_id.as_str()),
            );
        }

        if !self.topic_options()?.iter().any(|o| &o.id == topic_id) {
            return Err(CoreError::misuse(
                MACHINE,
                format!("topic {} is not currently available", topic_id),
            ));
        }

        // recorded before the response plays so it sticks even if that fails
        self.ctx
            .update_dialog_state(&self.profile_id, &mut |s| s.mark_topic_seen(topic_id))?;
        self.current_topic = Some(topic_id.clone());
        debug!("Dialog {} topic {}", self.profile_id, topic_id);

        let responses = self.ctx.definitions().dialog_topic(topic_id)?.responses.clone();
        let response = self.select_response(&responses, topic_id.as_str())?;
        self.apply_response(response)
    }

    // ========================================================================
    // Progression
    // ========================================================================

    /// Called once the current text has been fully shown (Started), and again
    /// when the player continues (TextDone). No-op in other states.
    pub fn advance(&mut self) -> CoreResult<()> {
        match self.status {
            DialogStatus::Started => {
                self.status = DialogStatus::TextDone;
                Ok(())
            }
            DialogStatus::TextDone => self.resolve_text_done(),
            _ => Ok(()),
        }
    }

    fn resolve_text_done(&mut self) -> CoreResult<()> {
        let response = self
            .current_response
            .clone()
            .ok_or_else(|| CoreError::invariant("dialog text done without a current response"))?;

        let chained = match &response.next_response {
            Some(next) => Some((**next).clone()),
            None if !response.next_response_options.is_empty() => {
                Some(self.select_response(&response.next_response_options, "next response options")?)
            }
            None => None,
        };

        if let Some(next) = chained {
            return self.apply_response(next);
        }

        if !response.replies.is_empty() {
            let memory = self.ctx.dialog_state(&self.profile_id)?;
            let mut visible = Vec::new();
            for reply in &response.replies {
                if conditions_hold(&self.ctx, &memory, &reply.conditions)? {
                    visible.push(reply.clone());
                }
            }
            if !visible.is_empty() {
                self.replies = visible;
                self.status = DialogStatus::UserReply;
                return Ok(());
            }
        }

        self.status = DialogStatus::Finished;
        Ok(())
    }

    /// Choose one of `replies()`.
    pub fn apply_reply(&mut self, index: usize) -> CoreResult<()> {
        if self.status != DialogStatus::UserReply {
            return Err(CoreError::misuse(
                MACHINE,
                format!("apply_reply while {:?}", self.status),
            ));
        }
        let reply = self.replies.get(index).cloned().ok_or_else(|| {
            CoreError::misuse(
                MACHINE,
                format!("reply index {} out of {}", index, self.replies.len()),
            )
        })?;
        self.replies.clear();

        self.apply_effects(&reply.effects)?;

        match reply.next_response {
            Some(next) => self.apply_response(*next),
            None => {
                if let Some(topic) = &reply.next_topic {
                    self.ctx
                        .update_dialog_state(&self.profile_id, &mut |s| s.unlock_topic(topic))?;
                }
                self.status = DialogStatus::Finished;
                Ok(())
            }
        }
    }

    /// Report the result of the pending action.
    pub fn complete_action(&mut self, input: &str) -> CoreResult<()> {
        if self.status != DialogStatus::ActionInProgress {
            return Err(CoreError::misuse(
                MACHINE,
                format!("complete_action while {:?}", self.status),
            ));
        }
        if input.is_empty() {
            return Err(CoreError::misuse(MACHINE, "action input is empty"));
        }
        let response = self
            .current_response
            .clone()
            .ok_or_else(|| CoreError::invariant("dialog action without a current response"))?;

        match &response.action {
            Some(DialogAction::GetUserInput {
                scope: ActionScope::PlayerName,
                ..
            }) => self.ctx.set_player_name(input)?,
            None => return Err(CoreError::invariant("dialog action state without an action")),
        }
        self.continue_response(response)
    }

    // ========================================================================
    // Responses
    // ========================================================================

    /// First candidate that is not a spent `once` and whose conditions hold.
    fn select_response(
        &self,
        candidates: &[DialogResponse],
        context: &str,
    ) -> CoreResult<DialogResponse> {
        let memory = self.ctx.dialog_state(&self.profile_id)?;
        for candidate in candidates {
            if candidate.once
                && candidate
                    .id
                    .as_ref()
                    .is_some_and(|id| memory.is_response_seen(id))
            {
                continue;
            }
            if conditions_hold(&self.ctx, &memory, &candidate.conditions)? {
                return Ok(candidate.clone());
            }
        }
        Err(CoreError::invalid(
            "dialog profile",
            &self.profile_id,
            format!("no response matched in {}", context),
        ))
    }

    fn apply_response(&mut self, response: DialogResponse) -> CoreResult<()> {
        if let Some(id) = &response.id {
            let memory = self.ctx.dialog_state(&self.profile_id)?;
            if response.once && memory.is_response_seen(id) {
                return Err(CoreError::misuse(
                    MACHINE,
                    format!("once response {} was already shown", id),
                ));
            }
            self.ctx
                .update_dialog_state(&self.profile_id, &mut |s| s.mark_response_seen(id))?;
        }

        if response.action.is_some() {
            self.text = self.substitute(&response.text);
            self.current_response = Some(response);
            self.status = DialogStatus::ActionInProgress;
            return Ok(());
        }
        self.continue_response(response)
    }

    fn continue_response(&mut self, response: DialogResponse) -> CoreResult<()> {
        let text = self.substitute(&response.text);
        if text.is_empty() {
            return Err(CoreError::invalid(
                "dialog response",
                self.response_label(&response),
                "text is empty",
            ));
        }

        for topic in &response.next_topics {
            self.ctx
                .update_dialog_state(&self.profile_id, &mut |s| s.unlock_topic(topic))?;
        }
        self.apply_effects(&response.effects)?;

        self.text = text;
        self.replies.clear();
        self.current_response = Some(response);
        self.status = DialogStatus::Started;
        Ok(())
    }

    fn apply_effects(&self, effects: &[DialogEffect]) -> CoreResult<()> {
        for effect in effects {
            match effect {
                DialogEffect::Broadcast { event_type, data } => {
                    self.ctx.broadcast(Event {
                        event_type: event_type.clone(),
                        data: data.clone(),
                    })?;
                }
                DialogEffect::AddGold { amount } => self.ctx.add_gold(*amount)?,
                DialogEffect::SetMemory { key } => {
                    self.ctx
                        .update_dialog_state(&self.profile_id, &mut |s| s.set_memory(key))?;
                }
                DialogEffect::UnlockTopic { topic } => {
                    self.ctx
                        .update_dialog_state(&self.profile_id, &mut |s| s.unlock_topic(topic))?;
                }
            }
        }
        Ok(())
    }

    fn substitute(&self, text: &str) -> String {
        if text.contains(VAR_PLAYER_NAME) {
            text.replace(VAR_PLAYER_NAME, &self.ctx.player_info().player_name)
        } else {
            text.to_string()
        }
    }

    fn response_label(&self, response: &DialogResponse) -> String {
        match &response.id {
            Some(id) => id.to_string(),
            None => format!("{}/{:?}", self.profile_id, response.text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::defs::CharacterDef;
    use crate::error::ErrorCategory;
    use crate::dialog::{DialogCondition, DialogProfileDef, DialogTopic};
    use crate::ids::{CharacterDefId, ResponseId};
    use crate::registry::DefinitionRegistry;
    use crate::world::{PlayerInfo, World};
    use std::sync::Arc;

    fn topic(id: &str, prompt: &str, responses: Vec<DialogResponse>) -> DialogTopic {
        DialogTopic {
            id: TopicId::new(id),
            prompt: prompt.into(),
            conditions: vec![],
            responses,
        }
    }

    fn world_with(profile: DialogProfileDef, topics: Vec<DialogTopic>) -> World {
        let mut defs = DefinitionRegistry::new();
        defs.load_character(CharacterDef::new("player", "Player", true)).unwrap();
        defs.load_dialog_profile(profile).unwrap();
        for t in topics {
            defs.load_dialog_topic(t).unwrap();
        }
        World::new(
            Arc::new(defs),
            CoreConfig::default(),
            &CharacterDefId::new("player"),
            PlayerInfo {
                player_name: "Aria".into(),
                player_culture: None,
            },
        )
        .unwrap()
    }

    fn innkeeper(topics: &[&str]) -> DialogProfileDef {
        DialogProfileDef {
            id: DialogProfileId::new("innkeeper"),
            greeting: vec![DialogResponse::new("Hello")],
            topics: topics.iter().map(|t| TopicId::new(*t)).collect(),
        }
    }

    fn option_ids(session: &DialogSession<World>) -> Vec<String> {
        session
            .topic_options()
            .unwrap()
            .into_iter()
            .map(|o| o.id.to_string())
            .collect()
    }

    #[test]
    fn test_greeting_topics_and_quit() {
        let world = world_with(
            innkeeper(&["rooms"]),
            vec![topic("rooms", "Any rooms?", vec![DialogResponse::new("Five coins a night.")])],
        );
        let mut session = DialogSession::new(world.clone(), DialogProfileId::new("innkeeper")).unwrap();

        assert_eq!(session.text(), "Hello");
        assert_eq!(session.status(), DialogStatus::Started);
        assert_eq!(option_ids(&session), vec!["rooms", QUIT_TOPIC]);

        session.advance().unwrap();
        session.advance().unwrap();
        assert_eq!(session.status(), DialogStatus::Finished);

        let before = world.dialog_state(session.profile_id()).unwrap();
        session.set_topic(&TopicId::new(QUIT_TOPIC)).unwrap();
        assert!(session.should_exit());
        assert_eq!(world.dialog_state(session.profile_id()).unwrap(), before);
        assert!(session.set_topic(&TopicId::new("rooms")).is_err());
    }

    #[test]
    fn test_topic_hidden_until_unlocked() {
        let mut secret = topic("secret", "The cellar?", vec![DialogResponse::new("Hush.")]);
        secret.conditions.push(DialogCondition::TopicUnlocked {
            topic: TopicId::new("secret"),
            unlocked: true,
        });
        let mut rumor = DialogResponse::new("There is a cellar.");
        rumor.next_topics.push(TopicId::new("secret"));

        let world = world_with(
            innkeeper(&["rumors", "secret"]),
            vec![topic("rumors", "Rumors?", vec![rumor]), secret],
        );
        let mut session = DialogSession::new(world, DialogProfileId::new("innkeeper")).unwrap();
        assert_eq!(option_ids(&session), vec!["rumors", QUIT_TOPIC]);

        session.advance().unwrap();
        session.advance().unwrap();
        session.set_topic(&TopicId::new("rumors")).unwrap();
        assert_eq!(session.text(), "There is a cellar.");
        assert_eq!(option_ids(&session), vec!["rumors", "secret", QUIT_TOPIC]);
    }

    #[test]
    fn test_chain_with_replies_is_rejected() {
        let mut greeting = DialogResponse::new("Well met.");
        greeting.next_response = Some(Box::new(DialogResponse::new("Anything else?")));
        greeting.replies.push(DialogReply {
            text: "Yes".into(),
            conditions: vec![],
            effects: vec![],
            next_response: None,
            next_topic: None,
        });
        let profile = DialogProfileDef {
            id: DialogProfileId::new("innkeeper"),
            greeting: vec![greeting],
            topics: vec![],
        };
        let mut defs = DefinitionRegistry::new();
        let err = defs.load_dialog_profile(profile).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Authoring);
        assert!(err.to_string().contains("both a chained response and replies"));
        assert!(!defs.contains_dialog_profile(&DialogProfileId::new("innkeeper")));
    }

    #[test]
    fn test_replies_chain_and_state_misuse() {
        let mut greeting = DialogResponse::new("Need a room?");
        greeting.replies.push(DialogReply {
            text: "Yes please".into(),
            conditions: vec![],
            effects: vec![DialogEffect::SetMemory { key: "rented".into() }],
            next_response: Some(Box::new(DialogResponse::new("Upstairs, {player_name}."))),
            next_topic: None,
        });
        greeting.replies.push(DialogReply {
            text: "Only if it's free".into(),
            conditions: vec![DialogCondition::Memory {
                key: "haggler".into(),
                set: true,
            }],
            effects: vec![],
            next_response: None,
            next_topic: None,
        });
        let profile = DialogProfileDef {
            id: DialogProfileId::new("innkeeper"),
            greeting: vec![greeting],
            topics: vec![],
        };
        let world = world_with(profile, vec![]);
        let mut session = DialogSession::new(world.clone(), DialogProfileId::new("innkeeper")).unwrap();

        assert!(session.apply_reply(0).is_err());
        assert!(session.set_topic(&TopicId::new(QUIT_TOPIC)).is_err());

        session.advance().unwrap();
        session.advance().unwrap();
        assert_eq!(session.status(), DialogStatus::UserReply);
        assert_eq!(session.replies().len(), 1);
        assert!(session.apply_reply(1).is_err());

        session.apply_reply(0).unwrap();
        assert_eq!(session.text(), "Upstairs, Aria.");
        assert!(world
            .dialog_state(&DialogProfileId::new("innkeeper"))
            .unwrap()
            .has_memory("rented"));
    }

    #[test]
    fn test_once_greeting_then_fallback() {
        let mut first = DialogResponse::new("First time here?");
        first.id = Some(ResponseId::new("first_visit"));
        first.once = true;
        let profile = DialogProfileDef {
            id: DialogProfileId::new("innkeeper"),
            greeting: vec![first, DialogResponse::new("Welcome back.")],
            topics: vec![],
        };
        let world = world_with(profile, vec![]);

        let session = DialogSession::new(world.clone(), DialogProfileId::new("innkeeper")).unwrap();
        assert_eq!(session.text(), "First time here?");
        let session = DialogSession::new(world, DialogProfileId::new("innkeeper")).unwrap();
        assert_eq!(session.text(), "Welcome back.");
    }

    #[test]
    fn test_player_name_action() {
        let mut ask = DialogResponse::new("What do they call you?");
        ask.action = Some(DialogAction::GetUserInput {
            scope: ActionScope::PlayerName,
            title: "Your name".into(),
        });
        ask.next_response = Some(Box::new(DialogResponse::new("Welcome, {player_name}.")));
        let profile = DialogProfileDef {
            id: DialogProfileId::new("innkeeper"),
            greeting: vec![ask],
            topics: vec![],
        };
        let world = world_with(profile, vec![]);
        let mut session = DialogSession::new(world.clone(), DialogProfileId::new("innkeeper")).unwrap();

        assert_eq!(session.status(), DialogStatus::ActionInProgress);
        assert!(session.action().is_some());
        assert!(session.advance().is_ok());
        assert_eq!(session.status(), DialogStatus::ActionInProgress);
        assert!(session.complete_action("").is_err());

        session.complete_action("Brannoc").unwrap();
        assert_eq!(world.player_info().player_name, "Brannoc");
        session.advance().unwrap();
        session.advance().unwrap();
        assert_eq!(session.text(), "Welcome, Brannoc.");
    }

    #[test]
    fn test_no_matching_response_fails() {
        let mut gated = DialogResponse::new("Psst.");
        gated.conditions.push(DialogCondition::Memory {
            key: "trusted".into(),
            set: true,
        });
        let profile = DialogProfileDef {
            id: DialogProfileId::new("innkeeper"),
            greeting: vec![gated],
            topics: vec![],
        };
        let world = world_with(profile, vec![]);
        assert!(DialogSession::new(world, DialogProfileId::new("innkeeper")).is_err());
    }
}
