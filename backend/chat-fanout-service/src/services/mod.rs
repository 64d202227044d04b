pub mod conversation_locks;
pub mod conversation_service;
pub mod media_storage;
pub mod message_service;
pub mod user_service;

pub use conversation_locks::ConversationLocks;
pub use conversation_service::{ConversationStore, ConversationView};
pub use media_storage::{LocalMediaStorage, MediaStorage};
pub use message_service::{MessageLifecycle, MessagePage, ReactionRemoval};
pub use user_service::{ProfileUpdate, UserDirectory};
