//! Inline `style` attribute model

use std::fmt;

/// Ordered list of CSS declarations from a `style` attribute.
///
/// Splitting respects parentheses and quotes, so values such as
/// `url(data:image/png;base64,...)` survive a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStyle {
    declarations: Vec<(String, String)>,
}

impl InlineStyle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the value of a `style` attribute
    pub fn parse(source: &str) -> Self {
        let mut declarations: Vec<(String, String)> = Vec::new();

        for chunk in split_declarations(source) {
            let Some((name, value)) = chunk.split_once(':') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            if name.is_empty() || value.is_empty() {
                continue;
            }
            match declarations.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = value.to_string(),
                None => declarations.push((name, value.to_string())),
            }
        }

        Self { declarations }
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        let property = property.to_ascii_lowercase();
        self.declarations
            .iter()
            .find(|(name, _)| *name == property)
            .map(|(_, value)| value.as_str())
    }

    /// Set a property, keeping its position if already present
    pub fn set(&mut self, property: &str, value: &str) {
        let property = property.trim().to_ascii_lowercase();
        let value = value.trim();
        if value.is_empty() {
            self.remove(&property);
            return;
        }
        match self.declarations.iter_mut().find(|(name, _)| *name == property) {
            Some(existing) => existing.1 = value.to_string(),
            None => self.declarations.push((property, value.to_string())),
        }
    }

    pub fn remove(&mut self, property: &str) -> Option<String> {
        let property = property.to_ascii_lowercase();
        let index = self
            .declarations
            .iter()
            .position(|(name, _)| *name == property)?;
        Some(self.declarations.remove(index).1)
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.declarations
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl fmt::Display for InlineStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.declarations.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}: {};", name, value)?;
        }
        Ok(())
    }
}

fn split_declarations(source: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in source.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                chunks.push(&source[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    chunks.push(&source[start..]);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let style = InlineStyle::parse("color: red;  Width:10px ;;bogus; height:");
        assert_eq!(style.len(), 2);
        assert_eq!(style.get("width"), Some("10px"));
        assert_eq!(style.to_string(), "color: red; width: 10px;");
    }

    #[test]
    fn test_data_url_values_survive() {
        let source = "background-image: url(data:image/png;base64,AAAA); color: blue";
        let style = InlineStyle::parse(source);
        assert_eq!(
            style.get("background-image"),
            Some("url(data:image/png;base64,AAAA)")
        );
        assert_eq!(style.get("color"), Some("blue"));
    }

    #[test]
    fn test_set_keeps_position_and_empty_removes() {
        let mut style = InlineStyle::parse("color: red; width: 10px");
        style.set("color", "#00ff00");
        assert_eq!(style.to_string(), "color: #00ff00; width: 10px;");

        style.set("width", "");
        assert_eq!(style.get("width"), None);
        assert_eq!(style.remove("color"), Some("#00ff00".to_string()));
        assert!(style.is_empty());
    }
}
