//! File input, clipboard and download boundaries

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::dom::Dom;
use crate::error::{PagesmithError, Result};

/// An image attached to a conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub mime_type: String,
    pub data_url: String,
    pub filename: String,
}

impl Attachment {
    /// Read an image file and encode it as a data URL.
    ///
    /// Anything that does not look like `image/*` is rejected here so it never
    /// reaches the generation client.
    pub async fn from_file(path: &Path) -> Result<Self> {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let mime_type = mime.essence_str().to_string();
        ensure_image(&mime_type)?;

        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        debug!("Loaded attachment {} ({}, {} bytes)", filename, mime_type, bytes.len());
        Ok(Self::from_bytes(&mime_type, &bytes, filename))
    }

    pub fn from_bytes(mime_type: &str, bytes: &[u8], filename: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data_url: format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes)),
            filename: filename.into(),
        }
    }

    /// Accept an already-encoded image data URL (uploads from the browser)
    pub fn from_data_url(data_url: &str, filename: impl Into<String>) -> Result<Self> {
        let (mime_type, payload) = split_data_url(data_url)?;
        ensure_image(mime_type)?;
        STANDARD
            .decode(payload)
            .map_err(|e| PagesmithError::attachment(format!("invalid base64 payload: {}", e)))?;

        Ok(Self {
            mime_type: mime_type.to_string(),
            data_url: data_url.to_string(),
            filename: filename.into(),
        })
    }

    /// The base64 part of the data URL
    pub fn base64_payload(&self) -> &str {
        split_data_url(&self.data_url)
            .map(|(_, payload)| payload)
            .unwrap_or("")
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.base64_payload())
            .map_err(|e| PagesmithError::attachment(format!("invalid base64 payload: {}", e)))
    }
}

fn ensure_image(mime_type: &str) -> Result<()> {
    if mime_type.starts_with("image/") {
        Ok(())
    } else {
        warn!("Rejected non-image attachment of type {}", mime_type);
        Err(PagesmithError::attachment(format!(
            "only image files are accepted, got {}",
            mime_type
        )))
    }
}

fn split_data_url(data_url: &str) -> Result<(&str, &str)> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| PagesmithError::attachment("not a data URL"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| PagesmithError::attachment("data URL has no payload"))?;
    let mime_type = meta
        .strip_suffix(";base64")
        .ok_or_else(|| PagesmithError::attachment("data URL is not base64 encoded"))?;
    Ok((mime_type, payload))
}

/// A Document packaged as a downloadable file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Download {
    pub filename: String,
    pub content_type: String,
    pub body: String,
}

/// Clipboard export: the Document verbatim
pub fn export_text(document: &str) -> String {
    document.to_string()
}

/// Download export, named after the document `<title>` when it has one
pub fn export_download(document: &str) -> Download {
    let dom = Dom::parse(document);
    let title = dom
        .find_first("title")
        .map(|t| dom.text_content(t))
        .unwrap_or_default();

    Download {
        filename: format!("{}.html", slugify(&title)),
        content_type: "text/html; charset=utf-8".to_string(),
        body: document.to_string(),
    }
}

fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "page".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_from_file_encodes_images() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(&[0x89, b'P', b'N', b'G']).unwrap();

        let attachment = Attachment::from_file(file.path()).await.unwrap();
        assert_eq!(attachment.mime_type, "image/png");
        assert!(attachment.data_url.starts_with("data:image/png;base64,"));
        assert_eq!(attachment.decode().unwrap(), vec![0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn test_from_file_rejects_non_images() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(b"hello").unwrap();

        let err = Attachment::from_file(file.path()).await.unwrap_err();
        assert!(matches!(err, PagesmithError::Attachment(_)));
    }

    #[test]
    fn test_from_data_url_validation() {
        let ok = Attachment::from_data_url("data:image/jpeg;base64,AAEC", "a.jpg").unwrap();
        assert_eq!(ok.mime_type, "image/jpeg");
        assert_eq!(ok.base64_payload(), "AAEC");

        assert!(Attachment::from_data_url("data:text/plain;base64,AAEC", "a.txt").is_err());
        assert!(Attachment::from_data_url("data:image/png,raw", "a.png").is_err());
        assert!(Attachment::from_data_url("data:image/png;base64,!!!", "a.png").is_err());
        assert!(Attachment::from_data_url("https://example.com/a.png", "a.png").is_err());
    }

    #[test]
    fn test_export_download_naming() {
        let download = export_download(
            "<html><head><title>My Portfolio — 2024!</title></head><body></body></html>",
        );
        assert_eq!(download.filename, "my-portfolio-2024.html");
        assert_eq!(download.content_type, "text/html; charset=utf-8");

        assert_eq!(export_download("<p>x</p>").filename, "page.html");
        assert_eq!(export_text("<p>x</p>"), "<p>x</p>");
    }
}
