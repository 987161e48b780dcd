//! Select mode: hover tracking and single-element selection

use pagesmith_core::{NodeId, NodePath, PreviewConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::surface::{RenderingSurface, HOVER_CLASS, MARKER_CLASSES, SELECTABLE_CLASS, SELECTED_CLASS};
use crate::{EditorError, EditorResult};

/// Elements that never take part in select mode
pub const EXCLUDED_TAGS: &[&str] = &["html", "head", "body", "script", "style", "meta", "title"];

/// Back-reference into the live DOM of one surface load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedElement {
    pub node: NodeId,
    pub generation: u64,
}

impl SelectedElement {
    /// The node, if the reference is still valid for the surface's current load
    pub fn resolve(&self, surface: &RenderingSurface) -> EditorResult<NodeId> {
        if self.generation == surface.generation() && surface.is_live(self.node) {
            Ok(self.node)
        } else {
            Err(EditorError::StaleReference)
        }
    }
}

/// Display information for the selected element, computed on demand from
/// the live node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSummary {
    pub tag_name: String,
    pub class_name: String,
    pub text_preview: String,
    pub html_preview: String,
}

impl ElementSummary {
    pub fn of(surface: &RenderingSurface, node: NodeId, config: &PreviewConfig) -> Option<Self> {
        let dom = surface.dom();
        let element = dom.element(node)?;
        let class_name = element
            .classes()
            .filter(|c| !MARKER_CLASSES.contains(c))
            .collect::<Vec<_>>()
            .join(" ");
        let text = dom.text_content(node);

        Some(Self {
            tag_name: element.name.clone(),
            class_name,
            text_preview: truncate(text.trim(), config.text_preview_chars),
            html_preview: truncate(&dom.outer_html(node), config.html_preview_chars),
        })
    }

    /// `<tag class="...">` shorthand used to scope AI instructions
    pub fn descriptor(&self) -> String {
        if self.class_name.is_empty() {
            format!("<{}>", self.tag_name)
        } else {
            format!("<{} class=\"{}\">", self.tag_name, self.class_name)
        }
    }
}

fn set_marker(surface: &mut RenderingSurface, node: NodeId, class: &str, on: bool) {
    let dom = surface.dom_mut();
    let result = if on {
        dom.add_class(node, class)
    } else {
        dom.remove_class(node, class)
    };
    if let Err(e) = result {
        warn!("Marker {} not updated on {:?}: {}", class, node, e);
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[derive(Debug, Clone, Default)]
pub struct SelectionEngine {
    active: bool,
    hovered: Option<NodeId>,
    selected: Option<SelectedElement>,
}

impl SelectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn hovered(&self) -> Option<NodeId> {
        self.hovered
    }

    pub fn selected(&self) -> Option<SelectedElement> {
        self.selected
    }

    pub fn is_eligible(surface: &RenderingSurface, node: NodeId) -> bool {
        surface
            .dom()
            .tag_name(node)
            .map(|name| !EXCLUDED_TAGS.contains(&name))
            .unwrap_or(false)
            && surface.is_live(node)
    }

    /// Enter select mode and mark every eligible element selectable
    pub fn activate(&mut self, surface: &mut RenderingSurface) {
        self.active = true;
        self.mark_selectable(surface);
    }

    fn mark_selectable(&self, surface: &mut RenderingSurface) {
        let eligible: Vec<NodeId> = surface
            .dom()
            .elements()
            .into_iter()
            .filter(|&node| Self::is_eligible(surface, node))
            .collect();
        let count = eligible.len();
        for node in eligible {
            set_marker(surface, node, SELECTABLE_CLASS, true);
        }
        debug!("Select mode covers {} element(s)", count);
    }

    /// Leave select mode, stripping every marker from the live DOM
    pub fn deactivate(&mut self, surface: &mut RenderingSurface) {
        self.active = false;
        self.hovered = None;
        self.selected = None;
        Self::strip_markers(surface);
    }

    pub fn strip_markers(surface: &mut RenderingSurface) {
        for node in surface.dom().elements() {
            for class in MARKER_CLASSES {
                set_marker(surface, node, class, false);
            }
        }
    }

    /// Pointer entered an element. Returns whether the hover marker moved.
    pub fn pointer_enter(&mut self, surface: &mut RenderingSurface, node: NodeId) -> bool {
        if !self.active || !Self::is_eligible(surface, node) {
            return false;
        }
        if let Some(previous) = self.hovered.take() {
            set_marker(surface, previous, HOVER_CLASS, false);
        }
        set_marker(surface, node, HOVER_CLASS, true);
        self.hovered = Some(node);
        true
    }

    pub fn pointer_leave(&mut self, surface: &mut RenderingSurface, node: NodeId) {
        if self.hovered == Some(node) {
            set_marker(surface, node, HOVER_CLASS, false);
            self.hovered = None;
        }
    }

    /// Select an element. Returns `None` when select mode is off or the
    /// element is excluded. Clicking the selected element again re-selects it.
    pub fn click(&mut self, surface: &mut RenderingSurface, node: NodeId) -> Option<SelectedElement> {
        if !self.active || !Self::is_eligible(surface, node) {
            return None;
        }
        self.clear_selected_markers(surface);
        set_marker(surface, node, SELECTED_CLASS, true);

        let selected = SelectedElement {
            node,
            generation: surface.generation(),
        };
        self.selected = Some(selected);
        debug!("Selected {:?} <{}>", node, surface.dom().tag_name(node).unwrap_or("?"));
        Some(selected)
    }

    fn clear_selected_markers(&self, surface: &mut RenderingSurface) {
        let marked: Vec<NodeId> = surface
            .dom()
            .elements()
            .into_iter()
            .filter(|&n| surface.dom().has_class(n, SELECTED_CLASS))
            .collect();
        for node in marked {
            set_marker(surface, node, SELECTED_CLASS, false);
        }
    }

    /// Resolve the current selection against the live DOM
    pub fn target(&self, surface: &RenderingSurface) -> EditorResult<NodeId> {
        self.selected
            .ok_or(EditorError::NoSelection)?
            .resolve(surface)
    }

    /// Location of the selection, for re-finding it after a reload
    pub fn selected_path(&self, surface: &RenderingSurface) -> Option<NodePath> {
        let node = self.target(surface).ok()?;
        surface.dom().path_of(node)
    }

    /// Re-establish select mode on a freshly loaded surface: markers are
    /// re-applied and the element at `path` becomes selected again.
    pub fn rebind(&mut self, surface: &mut RenderingSurface, path: Option<&[usize]>) -> Option<SelectedElement> {
        self.hovered = None;
        self.selected = None;
        if !self.active {
            return None;
        }
        self.mark_selectable(surface);
        let node = surface.dom().node_at_path(path?)?;
        self.click(surface, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_with(html: &str) -> RenderingSurface {
        let mut surface = RenderingSurface::new(PreviewConfig::default());
        surface.load(html);
        surface
    }

    fn hovered_count(surface: &RenderingSurface) -> usize {
        surface
            .dom()
            .elements()
            .into_iter()
            .filter(|&n| surface.dom().has_class(n, HOVER_CLASS))
            .count()
    }

    #[test]
    fn test_single_hover_marker() {
        let mut surface = surface_with("<h1>X</h1><p>Y</p>");
        let mut engine = SelectionEngine::new();
        engine.activate(&mut surface);
        let x = surface.dom().find_first("h1").unwrap();
        let y = surface.dom().find_first("p").unwrap();

        assert!(engine.pointer_enter(&mut surface, x));
        assert_eq!(hovered_count(&surface), 1);

        assert!(engine.pointer_enter(&mut surface, y));
        assert_eq!(hovered_count(&surface), 1);
        assert!(surface.dom().has_class(y, HOVER_CLASS));
        assert!(!surface.dom().has_class(x, HOVER_CLASS));

        engine.pointer_leave(&mut surface, y);
        assert_eq!(hovered_count(&surface), 0);
    }

    #[test]
    fn test_marker_on_text_node_leaves_dom_untouched() {
        let mut surface = surface_with("<p>Plain</p>");
        let p = surface.dom().find_first("p").unwrap();
        let text = surface.dom().children(p)[0];
        let before = surface.dom().serialize();

        set_marker(&mut surface, text, HOVER_CLASS, true);
        set_marker(&mut surface, text, SELECTED_CLASS, false);
        assert_eq!(surface.dom().serialize(), before);
    }

    #[test]
    fn test_inactive_and_excluded_elements_are_ignored() {
        let mut surface = surface_with("<p>Y</p>");
        let mut engine = SelectionEngine::new();
        let p = surface.dom().find_first("p").unwrap();
        assert!(engine.click(&mut surface, p).is_none());

        engine.activate(&mut surface);
        let body = surface.dom().body().unwrap();
        assert!(!engine.pointer_enter(&mut surface, body));
        assert!(engine.click(&mut surface, body).is_none());
        assert!(!surface.dom().has_class(body, SELECTABLE_CLASS));
        assert!(surface.dom().has_class(p, SELECTABLE_CLASS));
    }

    #[test]
    fn test_click_moves_selection() {
        let mut surface = surface_with("<h1>X</h1><p>Y</p>");
        let mut engine = SelectionEngine::new();
        engine.activate(&mut surface);
        let x = surface.dom().find_first("h1").unwrap();
        let y = surface.dom().find_first("p").unwrap();

        engine.click(&mut surface, x).unwrap();
        engine.click(&mut surface, y).unwrap();
        engine.click(&mut surface, y).unwrap();
        assert!(!surface.dom().has_class(x, SELECTED_CLASS));
        assert!(surface.dom().has_class(y, SELECTED_CLASS));
        assert_eq!(engine.target(&surface).unwrap(), y);
    }

    #[test]
    fn test_deactivate_strips_everything() {
        let mut surface = surface_with("<h1>X</h1>");
        let mut engine = SelectionEngine::new();
        engine.activate(&mut surface);
        let x = surface.dom().find_first("h1").unwrap();
        engine.pointer_enter(&mut surface, x);
        engine.click(&mut surface, x);

        engine.deactivate(&mut surface);
        assert!(engine.selected().is_none());
        assert!(matches!(engine.target(&surface), Err(EditorError::NoSelection)));
        assert_eq!(surface.dom().attr(x, "class"), None);
    }

    #[test]
    fn test_reload_makes_reference_stale() {
        let mut surface = surface_with("<h1>X</h1>");
        let mut engine = SelectionEngine::new();
        engine.activate(&mut surface);
        let x = surface.dom().find_first("h1").unwrap();
        engine.click(&mut surface, x);

        surface.load("<h1>X</h1>");
        assert!(matches!(engine.target(&surface), Err(EditorError::StaleReference)));
    }

    #[test]
    fn test_summary_is_derived_from_live_node() {
        let mut surface = surface_with("<p class=\"lead\">Hello world</p>");
        let mut engine = SelectionEngine::new();
        engine.activate(&mut surface);
        let p = surface.dom().find_first("p").unwrap();
        engine.click(&mut surface, p);

        let config = PreviewConfig {
            text_preview_chars: 5,
            ..PreviewConfig::default()
        };
        let summary = ElementSummary::of(&surface, p, &config).unwrap();
        assert_eq!(summary.tag_name, "p");
        assert_eq!(summary.class_name, "lead");
        assert_eq!(summary.text_preview, "Hello...");
        assert_eq!(summary.descriptor(), "<p class=\"lead\">");

        surface.dom_mut().set_text_content(p, "Bye").unwrap();
        let summary = ElementSummary::of(&surface, p, &config).unwrap();
        assert_eq!(summary.text_preview, "Bye");
    }
}
