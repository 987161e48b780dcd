//! Visual editing engine for Pagesmith
//!
//! Loads generated Documents into a headless rendering surface, tracks hover
//! and selection, runs inline text edits and style mutations against the
//! structured DOM, and reconciles those edits with the conversation-driven
//! version history through [`EditorSession`].

use pagesmith_core::{GenerationError, PagesmithError};

pub mod color;
pub mod inline_edit;
pub mod mutator;
pub mod selection;
pub mod session;
pub mod surface;
pub mod sync;
pub mod typewriter;
pub mod viewport;

pub use color::{ColorTarget, GradientPicker, Hsl, Rgb};
pub use inline_edit::{InlineEditEnd, InlineEditOverlay, InlineEditor, InlineKey, InlineStyleProbe, LayoutProbe, Rect};
pub use mutator::{
    Dimension, ImageInfo, ImageSize, ImageSource, MutatorPanel, PanelView, TypographyProperty,
};
pub use selection::{ElementSummary, SelectedElement, SelectionEngine};
pub use session::{EditorSession, GenerationOutcome, GenerationStart, PendingGeneration};
pub use surface::{RenderingSurface, SurfaceState};
pub use sync::SyncBridge;
pub use typewriter::{Presentation, TypewriterFrames};
pub use viewport::{FrameSize, ViewportMode};

pub type EditorResult<T> = std::result::Result<T, EditorError>;

/// Editor-specific errors
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("No element is selected")]
    NoSelection,

    #[error("Selected element no longer exists in the preview")]
    StaleReference,

    #[error("Preview surface is closed")]
    SurfaceClosed,

    #[error("Element has no text to edit")]
    NotEditable,

    #[error("Invalid hex color '{0}': expected exactly 6 hex digits")]
    InvalidHexColor(String),

    #[error("No image at index {0} in the selected element")]
    ImageNotFound(usize),

    #[error("Image search is not available")]
    ImageSearchUnavailable,

    #[error("Turn not found at position {0}")]
    TurnNotFound(usize),

    #[error("Turn at position {0} is not a user turn")]
    NotAUserTurn(usize),

    #[error(transparent)]
    Core(#[from] PagesmithError),
}

impl From<GenerationError> for EditorError {
    fn from(err: GenerationError) -> Self {
        EditorError::Core(PagesmithError::Generation(err))
    }
}

impl From<EditorError> for PagesmithError {
    fn from(err: EditorError) -> Self {
        match err {
            EditorError::Core(inner) => inner,
            other => PagesmithError::State(other.to_string()),
        }
    }
}

impl EditorError {
    /// Misuse of editor state as opposed to a failure underneath it
    pub fn is_user_error(&self) -> bool {
        !matches!(self, EditorError::Core(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_editor_error_conversion() {
        let err: PagesmithError = EditorError::NoSelection.into();
        assert!(matches!(err, PagesmithError::State(_)));

        let err: EditorError = GenerationError::Busy.into();
        assert!(!err.is_user_error());
        let core: PagesmithError = err.into();
        assert!(matches!(core, PagesmithError::Generation(GenerationError::Busy)));
    }
}
