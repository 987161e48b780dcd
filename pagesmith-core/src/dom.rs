//! Structured, mutable document model
//!
//! A `Dom` is an arena of nodes addressed by [`NodeId`]. It is the in-memory
//! representation every direct-manipulation edit goes through; the Document
//! string is derived from it by [`Dom::serialize_with`].

use serde::{Deserialize, Serialize};

use crate::error::{PagesmithError, Result};
use crate::style::InlineStyle;

/// Elements that never have children or a closing tag
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Elements whose text children are serialized verbatim
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

/// Handle to a node inside one [`Dom`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

/// Child-index path from the document root, stable across a re-parse of the
/// same markup
pub type NodePath = Vec<usize>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Doctype { name: String },
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub name: String,
    pub attrs: Vec<(String, String)>,
}

impl ElementData {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }

    fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self.attrs.iter().position(|(n, _)| n == name)?;
        Some(self.attrs.remove(index).1)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_ascii_whitespace()
    }
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// What to leave out when turning the tree back into markup
#[derive(Debug, Clone, Default)]
pub struct SerializeOptions {
    /// Class names dropped from every `class` attribute
    pub strip_classes: Vec<String>,
    /// Attributes dropped from every element
    pub strip_attributes: Vec<String>,
    /// Elements carrying any of these attributes are omitted with their subtree
    pub skip_elements_with: Vec<String>,
}

impl SerializeOptions {
    fn keeps_element(&self, element: &ElementData) -> bool {
        !self
            .skip_elements_with
            .iter()
            .any(|marker| element.attr(marker).is_some())
    }
}

/// Arena-backed HTML tree
#[derive(Debug, Clone)]
pub struct Dom {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom {
    /// An empty document with no children
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
            root: NodeId(0),
        }
    }

    /// Parse a Document string the way a browser would on `document.write`:
    /// fragments are wrapped into `html`/`head`/`body`.
    pub fn parse(source: &str) -> Self {
        let html = scraper::Html::parse_document(source);
        let mut dom = Dom::new();

        let mut stack = vec![(html.tree.root(), dom.root)];
        while let Some((node, parent)) = stack.pop() {
            for child in node.children().rev() {
                let data = match child.value() {
                    scraper::Node::Doctype(doctype) => NodeData::Doctype {
                        name: doctype.name().to_string(),
                    },
                    scraper::Node::Comment(comment) => {
                        NodeData::Comment(comment.comment.to_string())
                    }
                    scraper::Node::Text(text) => NodeData::Text(text.text.to_string()),
                    scraper::Node::Element(element) => {
                        // Source order; scraper keeps it with the `deterministic` feature
                        let attrs: Vec<(String, String)> = element
                            .attrs()
                            .map(|(name, value)| (name.to_string(), value.to_string()))
                            .collect();
                        NodeData::Element(ElementData {
                            name: element.name().to_string(),
                            attrs,
                        })
                    }
                    _ => continue,
                };
                let id = dom.push(data);
                dom.prepend_raw(parent, id);
                stack.push((child, id));
            }
        }

        dom
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    // Children are visited in reverse during parsing, so prepend keeps order.
    fn prepend_raw(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(0, child);
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| PagesmithError::dom(format!("unknown node {:?}", id)))
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.data) {
            Some(NodeData::Element(element)) => Ok(element),
            Some(_) => Err(PagesmithError::dom(format!("{:?} is not an element", id))),
            None => Err(PagesmithError::dom(format!("unknown node {:?}", id))),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0).map(|n| &n.data)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Whether the node is reachable from the document root
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.root {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.data(id) {
            Some(NodeData::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.name.as_str())
    }

    /// The `<html>` element
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root)
            .iter()
            .copied()
            .find(|&child| self.element(child).is_some())
    }

    pub fn head(&self) -> Option<NodeId> {
        self.child_named(self.document_element()?, "head")
    }

    pub fn body(&self) -> Option<NodeId> {
        self.child_named(self.document_element()?, "body")
    }

    fn child_named(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&child| self.tag_name(child) == Some(name))
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        self.element_mut(id)?.set_attr(&name.to_ascii_lowercase(), value);
        Ok(())
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Result<Option<String>> {
        Ok(self.element_mut(id)?.remove_attr(&name.to_ascii_lowercase()))
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id)
            .map(|e| e.classes().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<()> {
        let element = self.element_mut(id)?;
        if element.classes().any(|c| c == class) {
            return Ok(());
        }
        let value = match element.attr("class") {
            Some(existing) if !existing.trim().is_empty() => {
                format!("{} {}", existing.trim(), class)
            }
            _ => class.to_string(),
        };
        element.set_attr("class", &value);
        Ok(())
    }

    /// Remove a class; an emptied `class` attribute is dropped entirely
    pub fn remove_class(&mut self, id: NodeId, class: &str) -> Result<()> {
        let element = self.element_mut(id)?;
        if !element.classes().any(|c| c == class) {
            return Ok(());
        }
        let remaining: Vec<&str> = element.classes().filter(|c| *c != class).collect();
        if remaining.is_empty() {
            element.remove_attr("class");
        } else {
            let value = remaining.join(" ");
            element.set_attr("class", &value);
        }
        Ok(())
    }

    pub fn inline_style(&self, id: NodeId) -> InlineStyle {
        self.attr(id, "style")
            .map(InlineStyle::parse)
            .unwrap_or_default()
    }

    pub fn style_property(&self, id: NodeId, property: &str) -> Option<String> {
        self.inline_style(id).get(property).map(str::to_string)
    }

    pub fn set_style_property(&mut self, id: NodeId, property: &str, value: &str) -> Result<()> {
        let mut style = self.inline_style(id);
        style.set(property, value);
        self.write_style(id, style)
    }

    pub fn remove_style_property(&mut self, id: NodeId, property: &str) -> Result<Option<String>> {
        let mut style = self.inline_style(id);
        let removed = style.remove(property);
        self.write_style(id, style)?;
        Ok(removed)
    }

    fn write_style(&mut self, id: NodeId, style: InlineStyle) -> Result<()> {
        if style.is_empty() {
            self.remove_attr(id, "style")?;
            Ok(())
        } else {
            self.set_attr(id, "style", &style.to_string())
        }
    }

    /// Concatenated text of every descendant text node
    pub fn text_content(&self, id: NodeId) -> String {
        let mut text = String::new();
        if let Some(NodeData::Text(own)) = self.data(id) {
            text.push_str(own);
        }
        for node in self.descendants(id) {
            if let Some(NodeData::Text(value)) = self.data(node) {
                text.push_str(value);
            }
        }
        text
    }

    /// Replace all children with a single text node
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> Result<()> {
        self.element_mut(id)?;
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
        if !text.is_empty() {
            let text_node = self.push(NodeData::Text(text.to_string()));
            self.append_child(id, text_node)?;
        }
        Ok(())
    }

    /// Create a detached element
    pub fn create_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        let mut element = ElementData::new(name);
        for (attr, value) in attrs {
            element.set_attr(&attr.to_ascii_lowercase(), value);
        }
        self.push(NodeData::Element(element))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    /// Append `child` as the last child of `parent`, detaching it first
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check_insertion(parent, child)?;
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    /// Insert `child` as the first child of `parent`, detaching it first
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check_insertion(parent, child)?;
        self.detach(child);
        self.prepend_raw(parent, child);
        Ok(())
    }

    fn check_insertion(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.node(parent)?;
        self.node(child)?;
        if let Some(element) = self.element(parent) {
            if VOID_ELEMENTS.contains(&element.name.as_str()) {
                return Err(PagesmithError::dom(format!(
                    "<{}> cannot have children",
                    element.name
                )));
            }
        }
        let mut ancestor = Some(parent);
        while let Some(node) = ancestor {
            if node == child {
                return Err(PagesmithError::dom("cannot insert a node into itself"));
            }
            ancestor = self.parent(node);
        }
        Ok(())
    }

    /// Detach a node (and its subtree) from its parent
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.parent(id) {
            self.nodes[parent.0].children.retain(|&c| c != id);
            self.nodes[id.0].parent = None;
        }
    }

    /// Pre-order descendants, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// Every attached element in document order
    pub fn elements(&self) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|&id| self.element(id).is_some())
            .collect()
    }

    pub fn descendants_named(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&node| self.tag_name(node) == Some(name))
            .collect()
    }

    /// First attached element with the given tag name
    pub fn find_first(&self, name: &str) -> Option<NodeId> {
        self.elements()
            .into_iter()
            .find(|&id| self.tag_name(id) == Some(name))
    }

    /// Elements that carry an attribute
    pub fn elements_with_attr(&self, attr: &str) -> Vec<NodeId> {
        self.elements()
            .into_iter()
            .filter(|&id| self.attr(id, attr).is_some())
            .collect()
    }

    pub fn path_of(&self, id: NodeId) -> Option<NodePath> {
        let mut path = Vec::new();
        let mut current = id;
        while current != self.root {
            let parent = self.parent(current)?;
            let index = self.children(parent).iter().position(|&c| c == current)?;
            path.push(index);
            current = parent;
        }
        path.reverse();
        Some(path)
    }

    pub fn node_at_path(&self, path: &[usize]) -> Option<NodeId> {
        let mut current = self.root;
        for &index in path {
            current = *self.children(current).get(index)?;
        }
        Some(current)
    }

    /// Serialize the whole document, doctype included
    pub fn serialize(&self) -> String {
        self.serialize_with(&SerializeOptions::default())
    }

    pub fn serialize_with(&self, options: &SerializeOptions) -> String {
        let mut out = String::new();
        for &child in self.children(self.root) {
            self.write_node(child, options, &mut out);
        }
        out
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &SerializeOptions::default(), &mut out);
        out
    }

    fn write_node(&self, id: NodeId, options: &SerializeOptions, out: &mut String) {
        let Some(data) = self.data(id) else {
            return;
        };
        match data {
            NodeData::Document => {
                for &child in self.children(id) {
                    self.write_node(child, options, out);
                }
            }
            NodeData::Doctype { name } => {
                out.push_str("<!DOCTYPE ");
                out.push_str(name);
                out.push('>');
            }
            NodeData::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeData::Text(text) => {
                let raw = self
                    .parent(id)
                    .and_then(|p| self.tag_name(p))
                    .map(|name| RAW_TEXT_ELEMENTS.contains(&name))
                    .unwrap_or(false);
                if raw {
                    out.push_str(text);
                } else {
                    out.push_str(&html_escape::encode_text(text));
                }
            }
            NodeData::Element(element) => {
                if !options.keeps_element(element) {
                    return;
                }
                out.push('<');
                out.push_str(&element.name);
                for (name, value) in &element.attrs {
                    if options.strip_attributes.iter().any(|a| a == name) {
                        continue;
                    }
                    let value = if name == "class" && !options.strip_classes.is_empty() {
                        let kept: Vec<&str> = value
                            .split_ascii_whitespace()
                            .filter(|c| !options.strip_classes.iter().any(|s| s == c))
                            .collect();
                        if kept.is_empty() {
                            continue;
                        }
                        kept.join(" ")
                    } else {
                        value.clone()
                    };
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&html_escape::encode_double_quoted_attribute(&value));
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&element.name.as_str()) {
                    return;
                }
                for &child in self.children(id) {
                    self.write_node(child, options, out);
                }
                out.push_str("</");
                out.push_str(&element.name);
                out.push('>');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_is_wrapped_like_a_browser_document() {
        let dom = Dom::parse("<p>hi</p>");
        assert_eq!(
            dom.serialize(),
            "<html><head></head><body><p>hi</p></body></html>"
        );
        assert!(dom.head().is_some());
        assert!(dom.body().is_some());
    }

    #[test]
    fn test_doctype_and_void_elements_round_trip() {
        let source = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head><body><img src=\"a.png\"><br></body></html>";
        let dom = Dom::parse(source);
        assert_eq!(dom.serialize(), source);
    }

    #[test]
    fn test_attribute_order_is_preserved() {
        let source = "<html><head></head><body><a title=\"t\" href=\"/x\" class=\"btn\" data-id=\"7\">Go</a></body></html>";
        let dom = Dom::parse(source);
        assert_eq!(dom.serialize(), source);
    }

    #[test]
    fn test_text_is_escaped_but_style_is_raw() {
        let dom = Dom::parse("<style>a > b { color: red; }</style><p>1 &lt; 2 &amp; 3</p>");
        let html = dom.serialize();
        assert!(html.contains("<style>a > b { color: red; }</style>"));
        assert!(html.contains("<p>1 &lt; 2 &amp; 3</p>"));
    }

    #[test]
    fn test_class_list_operations() {
        let mut dom = Dom::parse("<div class=\"card\">x</div>");
        let div = dom.find_first("div").unwrap();

        dom.add_class(div, "hovered").unwrap();
        dom.add_class(div, "hovered").unwrap();
        assert_eq!(dom.attr(div, "class"), Some("card hovered"));

        dom.remove_class(div, "card").unwrap();
        dom.remove_class(div, "hovered").unwrap();
        assert_eq!(dom.attr(div, "class"), None);
    }

    #[test]
    fn test_inline_style_mutation() {
        let mut dom = Dom::parse("<h1 style=\"color: blue\">Title</h1>");
        let h1 = dom.find_first("h1").unwrap();

        dom.set_style_property(h1, "font-size", "32px").unwrap();
        assert_eq!(dom.attr(h1, "style"), Some("color: blue; font-size: 32px;"));

        dom.remove_style_property(h1, "color").unwrap();
        dom.remove_style_property(h1, "font-size").unwrap();
        assert_eq!(dom.attr(h1, "style"), None);
    }

    #[test]
    fn test_text_content_replacement() {
        let mut dom = Dom::parse("<p>Hello <b>big</b> world</p>");
        let p = dom.find_first("p").unwrap();
        assert_eq!(dom.text_content(p), "Hello big world");

        dom.set_text_content(p, "Bye").unwrap();
        assert_eq!(dom.outer_html(p), "<p>Bye</p>");
        assert!(dom.find_first("b").is_none());
    }

    #[test]
    fn test_append_and_reject_void_parent() {
        let mut dom = Dom::parse("<div><img src=\"a.png\"></div>");
        let div = dom.find_first("div").unwrap();
        let img = dom.find_first("img").unwrap();

        let new_img = dom.create_element("img", &[("src", "b.png"), ("alt", "B")]);
        dom.append_child(div, new_img).unwrap();
        assert_eq!(dom.descendants_named(div, "img").len(), 2);

        let span = dom.create_element("span", &[]);
        assert!(dom.append_child(img, span).is_err());
        assert!(dom.append_child(div, div).is_err());
    }

    #[test]
    fn test_paths_survive_reparse() {
        let source = "<main><section><h2>A</h2><p>B</p></section></main>";
        let dom = Dom::parse(source);
        let p = dom.find_first("p").unwrap();
        let path = dom.path_of(p).unwrap();

        let reparsed = Dom::parse(&dom.serialize());
        let found = reparsed.node_at_path(&path).unwrap();
        assert_eq!(reparsed.tag_name(found), Some("p"));
        assert_eq!(reparsed.text_content(found), "B");
    }

    #[test]
    fn test_serialize_with_filters() {
        let mut dom = Dom::parse("<div class=\"a editor-hover\" data-x=\"1\">t</div>");
        let head = dom.head().unwrap();
        let style = dom.create_element("style", &[("data-baseline", "")]);
        dom.prepend_child(head, style).unwrap();

        let options = SerializeOptions {
            strip_classes: vec!["editor-hover".to_string()],
            strip_attributes: vec!["data-x".to_string()],
            skip_elements_with: vec!["data-baseline".to_string()],
        };
        assert_eq!(
            dom.serialize_with(&options),
            "<html><head></head><body><div class=\"a\">t</div></body></html>"
        );
        // The tree itself is untouched
        assert!(dom.serialize().contains("editor-hover"));
    }
}
