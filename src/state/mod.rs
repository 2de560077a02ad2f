//! Mutable per-playthrough state objects. They are owned by the
//! [`StateRegistry`](crate::registry::StateRegistry).

mod character;
mod dialog;
mod map;
mod shop;

pub use character::CharacterState;
pub use dialog::DialogProfileState;
pub use map::MapState;
pub use shop::ShopkeeperState;
