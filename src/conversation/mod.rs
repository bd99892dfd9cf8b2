//! Conversation threads and their persistence

pub mod attachments;
pub mod models;
pub mod retention;
pub mod store;

pub use attachments::{AttachmentResolver, DetectedType, DEFAULT_MAX_FILE_BYTES};
pub use models::{
    Attachment, AttachmentBody, ReasoningEffort, Role, Thread, ThreadSummary, Turn, TurnContent,
};
pub use retention::{prune_threads, Combined, KeepAll, MaxAge, MaxCount, RetentionPolicy};
pub use store::{ConversationStore, FileConversationStore, InMemoryConversationStore};
