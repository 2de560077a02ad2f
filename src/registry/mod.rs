//! Definition and state registries.
//!
//! Both are plain values constructed by the caller and passed to whatever
//! needs them; nothing here is global.

mod catalog;
mod definitions;
mod states;

pub use catalog::{Catalog, Definition};
pub use definitions::DefinitionRegistry;
pub use states::{StateRegistry, StateSnapshot};
