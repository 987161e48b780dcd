//! Headless rendering surface
//!
//! Holds the live DOM of the preview. Loading always replaces the whole tree
//! (open/write/close semantics) and bumps a generation counter so references
//! taken against an earlier load can be recognised as stale.

use pagesmith_core::{Dom, NodeId, PreviewConfig, SerializeOptions};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::viewport::{FrameSize, ViewportMode};
use crate::{EditorError, EditorResult};

pub const HOVER_CLASS: &str = "editor-hover";
pub const SELECTED_CLASS: &str = "editor-selected";
pub const SELECTABLE_CLASS: &str = "editor-selectable";

/// Marks the injected baseline stylesheet
pub const BASELINE_ATTR: &str = "data-pagesmith-baseline";

pub const MARKER_CLASSES: &[&str] = &[HOVER_CLASS, SELECTED_CLASS, SELECTABLE_CLASS];

const BASELINE_CSS: &str = "*, *::before, *::after { box-sizing: border-box; } \
html, body { margin: 0; padding: 0; } \
body { font-family: system-ui, -apple-system, 'Segoe UI', Roboto, sans-serif; line-height: 1.5; } \
.editor-hover { outline: 2px dashed #3b82f6; outline-offset: 2px; cursor: pointer; } \
.editor-selected { outline: 2px solid #2563eb; outline-offset: 2px; }";

fn inject_baseline(dom: &mut Dom, head: NodeId) -> pagesmith_core::Result<()> {
    let style = dom.create_element("style", &[(BASELINE_ATTR, "")]);
    let css = dom.create_text(BASELINE_CSS);
    dom.append_child(style, css)?;
    dom.prepend_child(head, style)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "viewport", rename_all = "lowercase")]
pub enum SurfaceState {
    Closed,
    Open(ViewportMode),
    Fullscreen,
}

impl SurfaceState {
    pub fn label(&self) -> String {
        match self {
            SurfaceState::Closed => "closed".to_string(),
            SurfaceState::Open(mode) => format!("open-{}", mode),
            SurfaceState::Fullscreen => "fullscreen".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderingSurface {
    state: SurfaceState,
    dom: Dom,
    generation: u64,
    config: PreviewConfig,
}

impl RenderingSurface {
    pub fn new(config: PreviewConfig) -> Self {
        Self {
            state: SurfaceState::Closed,
            dom: Dom::new(),
            generation: 0,
            config,
        }
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != SurfaceState::Closed
    }

    pub fn viewport(&self) -> Option<ViewportMode> {
        match self.state {
            SurfaceState::Open(mode) => Some(mode),
            _ => None,
        }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut Dom {
        &mut self.dom
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the surface content with a freshly parsed Document and inject
    /// the baseline stylesheet. Returns the new generation.
    pub fn load(&mut self, document: &str) -> u64 {
        let mut dom = Dom::parse(document);
        if let Some(head) = dom.head() {
            if let Err(e) = inject_baseline(&mut dom, head) {
                warn!("Baseline stylesheet not injected: {}", e);
            }
        }
        self.dom = dom;
        self.generation += 1;
        debug!(
            "Surface loaded generation {} ({} bytes)",
            self.generation,
            document.len()
        );
        self.generation
    }

    pub fn open(&mut self, mode: ViewportMode) {
        info!("Preview {} -> open-{}", self.state.label(), mode);
        self.state = SurfaceState::Open(mode);
    }

    pub fn close(&mut self) {
        info!("Preview {} -> closed", self.state.label());
        self.state = SurfaceState::Closed;
    }

    /// Move between `open-*` states. Fullscreen must be exited first.
    pub fn set_viewport(&mut self, mode: ViewportMode) -> EditorResult<()> {
        match self.state {
            SurfaceState::Open(_) => {
                self.state = SurfaceState::Open(mode);
                Ok(())
            }
            SurfaceState::Closed | SurfaceState::Fullscreen => Err(EditorError::SurfaceClosed),
        }
    }

    pub fn enter_fullscreen(&mut self) -> EditorResult<()> {
        if !self.is_open() {
            return Err(EditorError::SurfaceClosed);
        }
        self.state = SurfaceState::Fullscreen;
        Ok(())
    }

    /// Leaving fullscreen always lands on desktop
    pub fn exit_fullscreen(&mut self) -> EditorResult<()> {
        match self.state {
            SurfaceState::Fullscreen => {
                self.state = SurfaceState::Open(ViewportMode::Desktop);
                Ok(())
            }
            SurfaceState::Closed => Err(EditorError::SurfaceClosed),
            SurfaceState::Open(_) => Ok(()),
        }
    }

    /// Frame dimensions for the current state, `None` while closed
    pub fn frame_size(&self, available_width: u32, panel_open: bool) -> Option<FrameSize> {
        match self.state {
            SurfaceState::Closed => None,
            SurfaceState::Fullscreen => Some(FrameSize {
                width: available_width,
                height: None,
            }),
            SurfaceState::Open(mode) => {
                Some(mode.frame_size(available_width, panel_open, &self.config))
            }
        }
    }

    /// Options that drop every editor-only artifact from serialization
    pub fn clean_options() -> SerializeOptions {
        SerializeOptions {
            strip_classes: MARKER_CLASSES.iter().map(|c| c.to_string()).collect(),
            strip_attributes: Vec::new(),
            skip_elements_with: vec![BASELINE_ATTR.to_string()],
        }
    }

    /// Full markup as displayed, editor artifacts included
    pub fn rendered_html(&self) -> String {
        self.dom.serialize()
    }

    /// Whether a node belongs to the current load and is still in the tree
    pub fn is_live(&self, node: NodeId) -> bool {
        self.dom.contains(node) && self.dom.is_attached(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_injects_baseline_and_bumps_generation() {
        let mut surface = RenderingSurface::new(PreviewConfig::default());
        assert_eq!(surface.load("<h1>Hi</h1>"), 1);

        let dom = surface.dom();
        let baseline = dom.elements_with_attr(BASELINE_ATTR);
        assert_eq!(baseline.len(), 1);
        assert_eq!(dom.parent(baseline[0]), dom.head());
        assert!(dom.text_content(baseline[0]).contains("box-sizing"));

        assert_eq!(surface.load("<h2>Again</h2>"), 2);
        assert!(surface.dom().find_first("h1").is_none());
    }

    #[test]
    fn test_clean_serialization_drops_baseline() {
        let mut surface = RenderingSurface::new(PreviewConfig::default());
        surface.load("<p class=\"lead\">x</p>");
        let p = surface.dom().find_first("p").unwrap();
        surface.dom_mut().add_class(p, SELECTED_CLASS).unwrap();

        let clean = surface.dom().serialize_with(&RenderingSurface::clean_options());
        assert_eq!(
            clean,
            "<html><head></head><body><p class=\"lead\">x</p></body></html>"
        );
    }

    #[test]
    fn test_state_machine() {
        let mut surface = RenderingSurface::new(PreviewConfig::default());
        assert!(surface.set_viewport(ViewportMode::Mobile).is_err());
        assert!(surface.enter_fullscreen().is_err());

        surface.open(ViewportMode::Desktop);
        surface.set_viewport(ViewportMode::Tablet).unwrap();
        assert_eq!(surface.state().label(), "open-tablet");

        surface.enter_fullscreen().unwrap();
        assert!(surface.set_viewport(ViewportMode::Mobile).is_err());
        assert_eq!(surface.frame_size(1200, true), Some(FrameSize { width: 1200, height: None }));

        surface.exit_fullscreen().unwrap();
        assert_eq!(surface.state(), SurfaceState::Open(ViewportMode::Desktop));

        surface.close();
        assert_eq!(surface.frame_size(1200, false), None);
    }
}
