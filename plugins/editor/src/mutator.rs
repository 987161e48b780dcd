//! Style/attribute mutator bound to the selected element
//!
//! Every operation writes to the live DOM immediately; there is no apply step.

use pagesmith_core::{Attachment, NodeId, PagesmithError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::color::{ColorTarget, GradientPicker, Hsl, Rgb};
use crate::inline_edit::LayoutProbe;
use crate::selection::ElementSummary;
use crate::surface::RenderingSurface;
use crate::{EditorError, EditorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Width,
    Height,
}

impl Dimension {
    pub fn css_property(&self) -> &'static str {
        match self {
            Dimension::Width => "width",
            Dimension::Height => "height",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypographyProperty {
    FontSize,
    FontWeight,
    FontStyle,
    TextAlign,
    TextDecoration,
    LineHeight,
    LetterSpacing,
}

impl TypographyProperty {
    pub const ALL: [TypographyProperty; 7] = [
        TypographyProperty::FontSize,
        TypographyProperty::FontWeight,
        TypographyProperty::FontStyle,
        TypographyProperty::TextAlign,
        TypographyProperty::TextDecoration,
        TypographyProperty::LineHeight,
        TypographyProperty::LetterSpacing,
    ];

    pub fn css_property(&self) -> &'static str {
        match self {
            TypographyProperty::FontSize => "font-size",
            TypographyProperty::FontWeight => "font-weight",
            TypographyProperty::FontStyle => "font-style",
            TypographyProperty::TextAlign => "text-align",
            TypographyProperty::TextDecoration => "text-decoration",
            TypographyProperty::LineHeight => "line-height",
            TypographyProperty::LetterSpacing => "letter-spacing",
        }
    }
}

/// An `img` found under the selected element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub index: usize,
    pub node: NodeId,
    pub src: String,
    pub alt: String,
}

/// Where a replacement or new image comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ImageSource {
    Upload(Attachment),
    Url(String),
    Search(String),
}

impl ImageSource {
    fn resolve(&self) -> EditorResult<String> {
        match self {
            ImageSource::Upload(attachment) => Ok(attachment.data_url.clone()),
            ImageSource::Url(url) => {
                let url = url.trim();
                if url.is_empty() {
                    Err(PagesmithError::attachment("image URL is empty").into())
                } else {
                    Ok(url.to_string())
                }
            }
            ImageSource::Search(_) => Err(EditorError::ImageSearchUnavailable),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ImageSize {
    Explicit {
        width: Option<u32>,
        height: Option<u32>,
    },
    FillContainer,
    Natural,
}

/// Initial values of every panel group, read when the panel opens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelView {
    pub summary: ElementSummary,
    pub width: f64,
    pub height: f64,
    pub typography: Vec<(TypographyProperty, String)>,
    pub text_color: String,
    pub background_color: String,
    /// Same colours as `hsl(...)`, for the picker readouts
    pub text_color_hsl: String,
    pub background_color_hsl: String,
    pub images: Vec<ImageInfo>,
}

/// State of the open mutator panel: the colour pickers remember their HSL
/// position between interactions.
#[derive(Debug, Clone, PartialEq)]
pub struct MutatorPanel {
    text_color: Hsl,
    background_color: Hsl,
}

impl MutatorPanel {
    pub fn open(surface: &RenderingSurface, node: NodeId, probe: &dyn LayoutProbe) -> Self {
        let dom = surface.dom();
        let read = |property: &str, fallback: Rgb| {
            Rgb::parse_css(&probe.computed_style(dom, node, property))
                .unwrap_or(fallback)
                .to_hsl()
        };
        Self {
            text_color: read(ColorTarget::Text.css_property(), Rgb::BLACK),
            background_color: read(ColorTarget::Background.css_property(), Rgb::WHITE),
        }
    }

    pub fn color(&self, target: ColorTarget) -> Hsl {
        match target {
            ColorTarget::Text => self.text_color,
            ColorTarget::Background => self.background_color,
        }
    }

    /// Panel contents for the element, computed from the live node
    pub fn view(
        &self,
        surface: &RenderingSurface,
        node: NodeId,
        probe: &dyn LayoutProbe,
    ) -> Option<PanelView> {
        let summary = ElementSummary::of(surface, node, surface.config())?;
        let dom = surface.dom();
        let rect = probe.bounding_box(dom, node);
        let typography = TypographyProperty::ALL
            .iter()
            .map(|p| (*p, probe.computed_style(dom, node, p.css_property())))
            .collect();

        Some(PanelView {
            summary,
            width: rect.width,
            height: rect.height,
            typography,
            text_color: self.text_color.to_hex(),
            background_color: self.background_color.to_hex(),
            text_color_hsl: self.text_color.to_css(),
            background_color_hsl: self.background_color.to_css(),
            images: Self::images(surface, node),
        })
    }

    pub fn set_dimension(
        &self,
        surface: &mut RenderingSurface,
        node: NodeId,
        dimension: Dimension,
        pixels: f64,
    ) -> EditorResult<()> {
        let value = format!("{}px", pixels.max(0.0));
        surface
            .dom_mut()
            .set_style_property(node, dimension.css_property(), &value)?;
        debug!("Set {} of {:?} to {}", dimension.css_property(), node, value);
        Ok(())
    }

    /// An empty value removes the declaration
    pub fn set_typography(
        &self,
        surface: &mut RenderingSurface,
        node: NodeId,
        property: TypographyProperty,
        value: &str,
    ) -> EditorResult<()> {
        surface
            .dom_mut()
            .set_style_property(node, property.css_property(), value)?;
        Ok(())
    }

    /// Manual hex entry. Nothing is written unless the value is valid.
    pub fn set_color_hex(
        &mut self,
        surface: &mut RenderingSurface,
        node: NodeId,
        target: ColorTarget,
        hex: &str,
    ) -> EditorResult<String> {
        let rgb = Rgb::from_hex(hex)?;
        self.apply_color(surface, node, target, rgb.to_hsl())
    }

    pub fn pick_gradient(
        &mut self,
        surface: &mut RenderingSurface,
        node: NodeId,
        target: ColorTarget,
        x: f64,
        y: f64,
    ) -> EditorResult<String> {
        let hsl = GradientPicker::pick(self.color(target), x, y);
        self.apply_color(surface, node, target, hsl)
    }

    pub fn pick_hue(
        &mut self,
        surface: &mut RenderingSurface,
        node: NodeId,
        target: ColorTarget,
        t: f64,
    ) -> EditorResult<String> {
        let hsl = GradientPicker::pick_hue(self.color(target), t);
        self.apply_color(surface, node, target, hsl)
    }

    fn apply_color(
        &mut self,
        surface: &mut RenderingSurface,
        node: NodeId,
        target: ColorTarget,
        hsl: Hsl,
    ) -> EditorResult<String> {
        let hex = hsl.to_hex();
        surface
            .dom_mut()
            .set_style_property(node, target.css_property(), &hex)?;
        match target {
            ColorTarget::Text => self.text_color = hsl,
            ColorTarget::Background => self.background_color = hsl,
        }
        Ok(hex)
    }

    /// The element itself when it is an image, then every descendant image
    pub fn images(surface: &RenderingSurface, node: NodeId) -> Vec<ImageInfo> {
        let dom = surface.dom();
        let mut nodes = Vec::new();
        if dom.tag_name(node) == Some("img") {
            nodes.push(node);
        }
        nodes.extend(dom.descendants_named(node, "img"));

        nodes
            .into_iter()
            .enumerate()
            .map(|(index, img)| ImageInfo {
                index,
                node: img,
                src: dom.attr(img, "src").unwrap_or_default().to_string(),
                alt: dom.attr(img, "alt").unwrap_or_default().to_string(),
            })
            .collect()
    }

    fn image_at(surface: &RenderingSurface, node: NodeId, index: usize) -> EditorResult<NodeId> {
        Self::images(surface, node)
            .get(index)
            .map(|info| info.node)
            .ok_or(EditorError::ImageNotFound(index))
    }

    pub fn replace_image(
        &self,
        surface: &mut RenderingSurface,
        node: NodeId,
        index: usize,
        source: &ImageSource,
    ) -> EditorResult<()> {
        let img = Self::image_at(surface, node, index)?;
        let src = source.resolve()?;
        surface.dom_mut().set_attr(img, "src", &src)?;
        debug!("Replaced image {} under {:?}", index, node);
        Ok(())
    }

    /// Append a new image as the last child of the element
    pub fn insert_image(
        &self,
        surface: &mut RenderingSurface,
        node: NodeId,
        source: &ImageSource,
        alt: &str,
    ) -> EditorResult<NodeId> {
        let src = source.resolve()?;
        let dom = surface.dom_mut();
        let img = dom.create_element("img", &[("src", src.as_str()), ("alt", alt)]);
        dom.set_style_property(img, "max-width", "100%")?;
        dom.append_child(node, img)?;
        Ok(img)
    }

    pub fn resize_image(
        &self,
        surface: &mut RenderingSurface,
        node: NodeId,
        index: usize,
        size: ImageSize,
    ) -> EditorResult<()> {
        let img = Self::image_at(surface, node, index)?;
        let dom = surface.dom_mut();
        match size {
            ImageSize::Explicit { width, height } => {
                for (property, value) in [("width", width), ("height", height)] {
                    match value {
                        Some(px) => dom.set_style_property(img, property, &format!("{}px", px))?,
                        None => {
                            dom.remove_style_property(img, property)?;
                        }
                    }
                }
            }
            ImageSize::FillContainer => {
                dom.set_style_property(img, "width", "100%")?;
                dom.set_style_property(img, "height", "auto")?;
                dom.set_style_property(img, "object-fit", "cover")?;
            }
            ImageSize::Natural => {
                for property in ["width", "height", "max-width", "object-fit"] {
                    dom.remove_style_property(img, property)?;
                }
                dom.remove_attr(img, "width")?;
                dom.remove_attr(img, "height")?;
            }
        }
        Ok(())
    }

    /// Instruction text for the AI-assisted edit, optionally scoped to the
    /// selected element
    pub fn scoped_instruction(summary: &ElementSummary, instruction: &str, scoped: bool) -> String {
        if scoped {
            format!(
                "Apply this change only to the section {}: {}",
                summary.descriptor(),
                instruction.trim()
            )
        } else {
            instruction.trim().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inline_edit::InlineStyleProbe;
    use pagesmith_core::PreviewConfig;

    fn setup(html: &str, tag: &str) -> (RenderingSurface, NodeId, MutatorPanel) {
        let mut surface = RenderingSurface::new(PreviewConfig::default());
        surface.load(html);
        let node = surface.dom().find_first(tag).unwrap();
        let panel = MutatorPanel::open(&surface, node, &InlineStyleProbe);
        (surface, node, panel)
    }

    #[test]
    fn test_view_reads_initial_values() {
        let (surface, node, panel) = setup(
            "<section style=\"width: 640px; height: 200px; color: #ff0000; font-size: 18px\">Hi<img src=\"a.png\" alt=\"A\"></section>",
            "section",
        );
        let view = panel.view(&surface, node, &InlineStyleProbe).unwrap();
        assert_eq!(view.width, 640.0);
        assert_eq!(view.height, 200.0);
        assert_eq!(view.text_color, "#ff0000");
        assert_eq!(view.background_color, "#ffffff");
        assert_eq!(view.text_color_hsl, "hsl(0, 100%, 50%)");
        assert_eq!(view.background_color_hsl, "hsl(0, 0%, 100%)");
        assert!(view
            .typography
            .contains(&(TypographyProperty::FontSize, "18px".to_string())));
        assert_eq!(view.images.len(), 1);
        assert_eq!(view.images[0].alt, "A");
    }

    #[test]
    fn test_dimensions_and_typography_apply_immediately() {
        let (mut surface, node, panel) = setup("<div>x</div>", "div");
        panel
            .set_dimension(&mut surface, node, Dimension::Width, 240.0)
            .unwrap();
        panel
            .set_typography(&mut surface, node, TypographyProperty::TextAlign, "center")
            .unwrap();
        assert_eq!(
            surface.dom().attr(node, "style"),
            Some("width: 240px; text-align: center;")
        );

        panel
            .set_typography(&mut surface, node, TypographyProperty::TextAlign, "")
            .unwrap();
        assert_eq!(surface.dom().attr(node, "style"), Some("width: 240px;"));
    }

    #[test]
    fn test_invalid_hex_leaves_element_untouched() {
        let (mut surface, node, mut panel) = setup("<p>x</p>", "p");
        let err = panel
            .set_color_hex(&mut surface, node, ColorTarget::Text, "#12")
            .unwrap_err();
        assert!(matches!(err, EditorError::InvalidHexColor(_)));
        assert_eq!(surface.dom().attr(node, "style"), None);

        let hex = panel
            .set_color_hex(&mut surface, node, ColorTarget::Background, "#00FF00")
            .unwrap();
        assert_eq!(hex, "#00ff00");
        assert_eq!(
            surface.dom().style_property(node, "background-color"),
            Some("#00ff00".to_string())
        );
    }

    #[test]
    fn test_pickers_write_through() {
        let (mut surface, node, mut panel) = setup("<p>x</p>", "p");
        panel
            .set_color_hex(&mut surface, node, ColorTarget::Text, "ff0000")
            .unwrap();
        let hex = panel
            .pick_hue(&mut surface, node, ColorTarget::Text, 2.0 / 3.0)
            .unwrap();
        assert_eq!(hex, "#0000ff");
        let hex = panel
            .pick_gradient(&mut surface, node, ColorTarget::Text, 0.0, 1.0)
            .unwrap();
        assert_eq!(hex, "#000000");
        assert_eq!(surface.dom().style_property(node, "color"), Some(hex));
    }

    #[test]
    fn test_image_operations() {
        let (mut surface, node, panel) =
            setup("<figure><img src=\"old.png\" width=\"50\"></figure>", "figure");

        panel
            .replace_image(&mut surface, node, 0, &ImageSource::Url("new.png".into()))
            .unwrap();
        assert!(matches!(
            panel.replace_image(&mut surface, node, 3, &ImageSource::Url("x.png".into())),
            Err(EditorError::ImageNotFound(3))
        ));
        assert!(matches!(
            panel.replace_image(&mut surface, node, 0, &ImageSource::Search("cats".into())),
            Err(EditorError::ImageSearchUnavailable)
        ));

        let upload = Attachment::from_bytes("image/gif", &[1, 2], "dot.gif");
        panel
            .insert_image(&mut surface, node, &ImageSource::Upload(upload), "Dot")
            .unwrap();
        let images = MutatorPanel::images(&surface, node);
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].src, "new.png");
        assert!(images[1].src.starts_with("data:image/gif;base64,"));

        panel
            .resize_image(&mut surface, node, 0, ImageSize::FillContainer)
            .unwrap();
        assert_eq!(
            surface.dom().style_property(images[0].node, "width"),
            Some("100%".to_string())
        );
        panel
            .resize_image(&mut surface, node, 0, ImageSize::Natural)
            .unwrap();
        assert_eq!(surface.dom().attr(images[0].node, "style"), None);
        assert_eq!(surface.dom().attr(images[0].node, "width"), None);

        panel
            .resize_image(
                &mut surface,
                node,
                1,
                ImageSize::Explicit { width: Some(120), height: None },
            )
            .unwrap();
        assert_eq!(
            surface.dom().attr(images[1].node, "style"),
            Some("max-width: 100%; width: 120px;")
        );
    }

    #[test]
    fn test_scoped_instruction() {
        let summary = ElementSummary {
            tag_name: "header".into(),
            class_name: "hero".into(),
            text_preview: String::new(),
            html_preview: String::new(),
        };
        assert_eq!(
            MutatorPanel::scoped_instruction(&summary, " make it taller ", true),
            "Apply this change only to the section <header class=\"hero\">: make it taller"
        );
        assert_eq!(
            MutatorPanel::scoped_instruction(&summary, "make it taller", false),
            "make it taller"
        );
    }
}
