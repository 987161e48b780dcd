//! Viewport simulation

use pagesmith_core::PreviewConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewportMode {
    #[default]
    Desktop,
    Tablet,
    Mobile,
}

impl std::fmt::Display for ViewportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewportMode::Desktop => write!(f, "desktop"),
            ViewportMode::Tablet => write!(f, "tablet"),
            ViewportMode::Mobile => write!(f, "mobile"),
        }
    }
}

impl FromStr for ViewportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desktop" => Ok(ViewportMode::Desktop),
            "tablet" => Ok(ViewportMode::Tablet),
            "mobile" => Ok(ViewportMode::Mobile),
            other => Err(format!("unknown viewport '{}'", other)),
        }
    }
}

/// Pixel box the Document is rendered into. `height: None` means the frame
/// grows with the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: Option<u32>,
}

impl ViewportMode {
    /// Desktop is fluid and gives up room to an open side panel; tablet and
    /// mobile are fixed boxes.
    pub fn frame_size(&self, available_width: u32, panel_open: bool, config: &PreviewConfig) -> FrameSize {
        match self {
            ViewportMode::Desktop => {
                let panel = if panel_open { config.side_panel_width } else { 0 };
                FrameSize {
                    width: available_width.saturating_sub(panel),
                    height: None,
                }
            }
            ViewportMode::Tablet => FrameSize {
                width: config.tablet_width,
                height: Some(config.tablet_height),
            },
            ViewportMode::Mobile => FrameSize {
                width: config.mobile_width,
                height: Some(config.mobile_height),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sizes() {
        let config = PreviewConfig::default();
        assert_eq!(
            ViewportMode::Desktop.frame_size(1440, false, &config),
            FrameSize { width: 1440, height: None }
        );
        assert_eq!(
            ViewportMode::Desktop.frame_size(1440, true, &config).width,
            1440 - config.side_panel_width
        );
        assert_eq!(
            ViewportMode::Tablet.frame_size(1440, true, &config),
            FrameSize { width: 768, height: Some(1024) }
        );
        assert_eq!(
            ViewportMode::Mobile.frame_size(200, false, &config),
            FrameSize { width: 375, height: Some(667) }
        );
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("Mobile".parse::<ViewportMode>(), Ok(ViewportMode::Mobile));
        assert!("watch".parse::<ViewportMode>().is_err());
        assert_eq!(ViewportMode::Tablet.to_string(), "tablet");
    }
}
