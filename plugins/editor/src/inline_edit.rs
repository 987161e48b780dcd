//! Inline text editing through a transient overlay input

use pagesmith_core::{Dom, NodeId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::surface::RenderingSurface;
use crate::{EditorError, EditorResult};

/// On-screen box of an element, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Layout information the host renderer provides.
///
/// A browser host answers from real layout; [`InlineStyleProbe`] answers from
/// inline styles and the cascade of inherited properties.
pub trait LayoutProbe: Send + Sync {
    fn bounding_box(&self, dom: &Dom, node: NodeId) -> Rect;

    fn computed_style(&self, dom: &Dom, node: NodeId, property: &str) -> String;
}

/// Properties copied onto the overlay so it looks like the element it covers
pub const OVERLAY_FONT_PROPERTIES: &[&str] = &[
    "font-family",
    "font-size",
    "font-weight",
    "font-style",
    "line-height",
    "letter-spacing",
    "text-align",
    "text-transform",
    "color",
    "padding",
];

const INHERITED: &[&str] = &[
    "color",
    "font-family",
    "font-size",
    "font-style",
    "font-weight",
    "letter-spacing",
    "line-height",
    "text-align",
    "text-transform",
];

fn initial_value(property: &str) -> &'static str {
    match property {
        "font-family" => "system-ui, -apple-system, 'Segoe UI', Roboto, sans-serif",
        "font-size" => "16px",
        "font-weight" => "400",
        "font-style" | "line-height" | "letter-spacing" | "text-transform" => "normal",
        "text-align" => "start",
        "text-decoration" => "none",
        "color" => "rgb(0, 0, 0)",
        "background-color" => "rgba(0, 0, 0, 0)",
        "padding" | "margin" => "0px",
        _ => "",
    }
}

fn px(value: &str) -> Option<f64> {
    value.trim().strip_suffix("px").unwrap_or(value.trim()).trim().parse().ok()
}

/// Layout answers derived from the DOM alone
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineStyleProbe;

impl LayoutProbe for InlineStyleProbe {
    fn bounding_box(&self, dom: &Dom, node: NodeId) -> Rect {
        let style = dom.inline_style(node);
        let dimension = |name: &str| {
            style
                .get(name)
                .and_then(px)
                .or_else(|| dom.attr(node, name).and_then(px))
                .unwrap_or(0.0)
        };
        Rect {
            x: style.get("left").and_then(px).unwrap_or(0.0),
            y: style.get("top").and_then(px).unwrap_or(0.0),
            width: dimension("width"),
            height: dimension("height"),
        }
    }

    fn computed_style(&self, dom: &Dom, node: NodeId, property: &str) -> String {
        let inherited = INHERITED.contains(&property);
        let mut current = Some(node);
        while let Some(id) = current {
            if dom.element(id).is_none() {
                break;
            }
            if let Some(value) = dom.style_property(id, property) {
                return value;
            }
            if !inherited {
                break;
            }
            current = dom.parent(id);
        }
        initial_value(property).to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InlineKey {
    Enter,
    Escape,
}

/// The floating input covering an element being edited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineEditOverlay {
    pub target: NodeId,
    pub rect: Rect,
    pub font: Vec<(String, String)>,
    pub value: String,
    pub original_text: String,
    pub focused: bool,
    previous_visibility: Option<String>,
}

/// Outcome of finishing an inline edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineEditEnd {
    Committed { node: NodeId, changed: bool },
    Cancelled { node: NodeId },
}

/// At most one element is mid-edit at a time
#[derive(Debug, Clone, Default)]
pub struct InlineEditor {
    active: Option<InlineEditOverlay>,
}

impl InlineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_editing(&self) -> bool {
        self.active.is_some()
    }

    pub fn overlay(&self) -> Option<&InlineEditOverlay> {
        self.active.as_ref()
    }

    /// Start editing `node`. An edit already in progress elsewhere is
    /// committed first and returned.
    pub fn begin(
        &mut self,
        surface: &mut RenderingSurface,
        node: NodeId,
        probe: &dyn LayoutProbe,
    ) -> EditorResult<Option<InlineEditEnd>> {
        let text = surface.dom().text_content(node);
        if surface.dom().element(node).is_none() || text.trim().is_empty() {
            return Err(EditorError::NotEditable);
        }

        let previous = match self.active.as_ref().map(|o| o.target == node) {
            Some(true) => return Ok(None),
            Some(false) => self.commit(surface)?,
            None => None,
        };

        let dom = surface.dom();
        let rect = probe.bounding_box(dom, node);
        let font = OVERLAY_FONT_PROPERTIES
            .iter()
            .map(|p| (p.to_string(), probe.computed_style(dom, node, p)))
            .collect();
        let previous_visibility = dom.style_property(node, "visibility");

        surface
            .dom_mut()
            .set_style_property(node, "visibility", "hidden")?;

        debug!("Inline edit started on {:?}", node);
        self.active = Some(InlineEditOverlay {
            target: node,
            rect,
            font,
            value: text.clone(),
            original_text: text,
            focused: true,
            previous_visibility,
        });
        Ok(previous)
    }

    pub fn input(&mut self, value: impl Into<String>) {
        if let Some(overlay) = self.active.as_mut() {
            overlay.value = value.into();
        }
    }

    pub fn key(&mut self, surface: &mut RenderingSurface, key: InlineKey) -> EditorResult<Option<InlineEditEnd>> {
        match key {
            InlineKey::Enter => self.commit(surface),
            InlineKey::Escape => self.cancel(surface),
        }
    }

    /// Losing focus commits
    pub fn blur(&mut self, surface: &mut RenderingSurface) -> EditorResult<Option<InlineEditEnd>> {
        self.commit(surface)
    }

    /// Write the overlay value into the element and show it again
    pub fn commit(&mut self, surface: &mut RenderingSurface) -> EditorResult<Option<InlineEditEnd>> {
        let Some(overlay) = self.active.take() else {
            return Ok(None);
        };
        let changed = overlay.value != overlay.original_text;
        if surface.is_live(overlay.target) {
            if changed {
                surface
                    .dom_mut()
                    .set_text_content(overlay.target, &overlay.value)?;
            }
            restore_visibility(surface, &overlay)?;
        }
        debug!("Inline edit committed on {:?} (changed: {})", overlay.target, changed);
        Ok(Some(InlineEditEnd::Committed {
            node: overlay.target,
            changed,
        }))
    }

    /// Drop the overlay value; the element keeps its original text
    pub fn cancel(&mut self, surface: &mut RenderingSurface) -> EditorResult<Option<InlineEditEnd>> {
        let Some(overlay) = self.active.take() else {
            return Ok(None);
        };
        if surface.is_live(overlay.target) {
            restore_visibility(surface, &overlay)?;
        }
        Ok(Some(InlineEditEnd::Cancelled {
            node: overlay.target,
        }))
    }

    /// Forget an edit whose surface was reloaded underneath it
    pub fn abandon(&mut self) {
        self.active = None;
    }
}

fn restore_visibility(surface: &mut RenderingSurface, overlay: &InlineEditOverlay) -> EditorResult<()> {
    let dom = surface.dom_mut();
    match &overlay.previous_visibility {
        Some(value) => dom.set_style_property(overlay.target, "visibility", value)?,
        None => {
            dom.remove_style_property(overlay.target, "visibility")?;
        }
    }
    Ok(())
}
