//! Serialization & sync bridge between the live DOM and the Artifact Store

use pagesmith_core::ArtifactStore;
use tracing::{debug, info};

use crate::selection::SelectionEngine;
use crate::surface::RenderingSurface;

pub struct SyncBridge;

impl SyncBridge {
    /// Markup of the live DOM without any editor-only artifact. The tree is
    /// not modified.
    pub fn serialize_clean(surface: &RenderingSurface) -> String {
        surface
            .dom()
            .serialize_with(&RenderingSurface::clean_options())
    }

    /// Record pending direct edits as the store's working copy, so a reload
    /// shows them even before they are synced
    pub fn write_working(surface: &RenderingSurface, store: &mut ArtifactStore) {
        let working = Self::serialize_clean(surface);
        debug!("Working copy updated ({} bytes)", working.len());
        store.set_working(working);
    }

    /// Panel-close path: strip every marker class from the live DOM,
    /// serialize it and make it the Document.
    pub fn sync(surface: &mut RenderingSurface, store: &mut ArtifactStore) -> String {
        SelectionEngine::strip_markers(surface);
        let document = Self::serialize_clean(surface);
        store.set_document(document.clone());
        info!("Synced live DOM into the document ({} bytes)", document.len());
        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SELECTED_CLASS;
    use pagesmith_core::PreviewConfig;

    #[test]
    fn test_working_copy_survives_reload() {
        let mut store = ArtifactStore::new();
        store.set_document("<h1>Blue</h1>");
        let mut surface = RenderingSurface::new(PreviewConfig::default());
        surface.load(store.effective());

        let h1 = surface.dom().find_first("h1").unwrap();
        surface.dom_mut().set_text_content(h1, "Red").unwrap();
        SyncBridge::write_working(&surface, &mut store);
        assert_eq!(store.document(), "<h1>Blue</h1>");

        surface.load(store.effective());
        let h1 = surface.dom().find_first("h1").unwrap();
        assert_eq!(surface.dom().text_content(h1), "Red");
    }

    #[test]
    fn test_sync_strips_markers_and_replaces_document() {
        let mut store = ArtifactStore::new();
        let mut surface = RenderingSurface::new(PreviewConfig::default());
        surface.load("<p class=\"intro\">x</p>");
        let p = surface.dom().find_first("p").unwrap();
        surface.dom_mut().add_class(p, SELECTED_CLASS).unwrap();
        SyncBridge::write_working(&surface, &mut store);

        let document = SyncBridge::sync(&mut surface, &mut store);
        assert_eq!(
            document,
            "<html><head></head><body><p class=\"intro\">x</p></body></html>"
        );
        assert_eq!(store.document(), document);
        assert!(store.working().is_none());
        assert!(!surface.dom().has_class(p, SELECTED_CLASS));
    }
}
