//! Handlers 模块

pub mod assets;
pub mod connections;
pub mod events;
pub mod health;
pub mod token;

pub use assets::*;
pub use connections::*;
pub use events::*;
pub use health::*;
pub use token::*;
