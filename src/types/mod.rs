//! # Types Module
//!
//! Core data types shared by the drivers, the response pipeline and the session.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Conversation entry with role and text content |
//! | [`MessageRole`] | Entry role (system, user, assistant) |
//! | [`StreamingEvent`] | Normalized event decoded from a provider stream |
//!
//! ## Example
//!
//! ```rust
//! use intelisys::types::{Message, MessageRole};
//!
//! let system = Message::system("You are a helpful assistant");
//! let user = Message::user("What's the weather?");
//! assert!(matches!(system.role, MessageRole::System));
//! assert_eq!(user.word_count(), 3);
//! ```

pub mod events;
pub mod message;

pub use events::StreamingEvent;
pub use message::{Message, MessageRole};
