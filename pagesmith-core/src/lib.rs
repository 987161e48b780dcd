//! Pagesmith Core - document model and version history for the Pagesmith visual HTML editor
//!
//! This crate owns everything that does not need a rendering surface: the
//! structured DOM, the Artifact Store with its snapshots, the Conversation Log,
//! the Generation Client boundary, and the typed event bus that connects them
//! to the editor.

pub mod artifact;
pub mod attachment;
pub mod config;
pub mod conversation;
pub mod dom;
pub mod error;
pub mod event;
pub mod generation;
pub mod language;
pub mod style;


// Re-export commonly used types
pub use artifact::{ArtifactStore, Restored, Snapshot};
pub use attachment::{export_download, export_text, Attachment, Download};
pub use config::{
    Config, CredentialStatus, GenerationConfig, PreviewConfig, ServerConfig, ValidationResult,
};
pub use conversation::{ConversationLog, Deletion, Resubmission, Role, Turn};
pub use dom::{Dom, NodeData, NodeId, NodePath, SerializeOptions};
pub use error::{ErrorSeverity, GenerationError, PagesmithError, Result};
pub use event::{
    DocumentSource, EditorEvent, EventBus, EventFilter, EventHandler, InMemoryEventBus,
    RecordingHandler, SubscriptionId,
};
pub use generation::{
    classify_edit, clean_response, ContextTurn, EditScope, GenerationClient, GenerationRequest,
    GenerationResult, RequestShape, ScriptedClient, TimedClient, UnconfiguredClient,
    FALLBACK_DOCUMENT,
};
pub use language::{Language, Message};
pub use style::InlineStyle;
