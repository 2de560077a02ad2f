//! Dialog System
//!
//! Branching conversations: a profile greets, the player picks topics, the
//! NPC responds, the player replies. Memory of what was said lives in the
//! profile's state so it persists between conversations.

mod condition;
pub mod definition;
mod session;

pub use condition::conditions_hold;
pub use definition::{
    ActionScope, DialogAction, DialogCondition, DialogEffect, DialogProfileDef, DialogReply,
    DialogResponse, DialogTopic, QUIT_PROMPT, QUIT_TOPIC,
};
pub use session::{DialogSession, DialogStatus, TopicOption};
