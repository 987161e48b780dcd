//! Presentation of a new Document: typed out for small edits, instant otherwise

use pagesmith_core::EditScope;
use serde::{Deserialize, Serialize};

/// Successive prefixes of a document, `chunk` characters at a time, ending
/// with the whole document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypewriterFrames {
    document: String,
    chunk: usize,
    position: usize,
    done: bool,
}

impl TypewriterFrames {
    pub fn new(document: impl Into<String>, chunk: usize) -> Self {
        Self {
            document: document.into(),
            chunk: chunk.max(1),
            position: 0,
            done: false,
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn frame_count(&self) -> usize {
        let chars = self.document.chars().count();
        chars.div_ceil(self.chunk).max(1)
    }
}

impl Iterator for TypewriterFrames {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        let rest = &self.document[self.position..];
        let advance = rest
            .char_indices()
            .nth(self.chunk)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        self.position += advance;
        if self.position >= self.document.len() {
            self.done = true;
        }
        Some(self.document[..self.position].to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Presentation {
    Instant,
    Typewriter { frames: TypewriterFrames },
}

impl Presentation {
    pub fn for_scope(scope: EditScope, document: &str, chunk: usize) -> Self {
        match scope {
            EditScope::Small => Presentation::Typewriter {
                frames: TypewriterFrames::new(document, chunk),
            },
            EditScope::Large => Presentation::Instant,
        }
    }

    pub fn is_typewriter(&self) -> bool {
        matches!(self, Presentation::Typewriter { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_growing_prefixes() {
        let frames: Vec<String> = TypewriterFrames::new("<p>hello</p>", 5).collect();
        assert_eq!(frames, vec!["<p>he", "<p>hello</", "<p>hello</p>"]);
        assert_eq!(TypewriterFrames::new("<p>hello</p>", 5).frame_count(), 3);
    }

    #[test]
    fn test_frames_respect_char_boundaries() {
        let frames: Vec<String> = TypewriterFrames::new("héllo wörld", 4).collect();
        assert_eq!(frames.last().map(String::as_str), Some("héllo wörld"));
        assert_eq!(frames[0], "héll");
    }

    #[test]
    fn test_empty_document_yields_one_frame() {
        let frames: Vec<String> = TypewriterFrames::new("", 8).collect();
        assert_eq!(frames, vec![String::new()]);
    }

    #[test]
    fn test_scope_selects_presentation() {
        assert!(Presentation::for_scope(EditScope::Small, "<p>x</p>", 4).is_typewriter());
        assert_eq!(
            Presentation::for_scope(EditScope::Large, "<p>x</p>", 4),
            Presentation::Instant
        );
    }
}
