pub mod conversation;
pub mod message;
pub mod session;
pub mod user;

pub use conversation::{Conversation, ConversationKind};
pub use message::{Message, MessageDraft, MessageKind, MessageStatus, ReactionKind};
pub use session::{Session, SessionId};
pub use user::User;
