//! Typed event bus for decoupled communication between editor components
//!
//! Components never signal through ambient globals: every producer and consumer
//! is handed an `Arc<dyn EventBus>` explicitly, and subscriptions are dropped by
//! id so their lifetime is visible at the call site.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// Event serialization utilities for persistence and debugging
pub mod serialization {
    use super::*;

    /// Serialize an event to JSON string
    pub fn serialize_event(event: &EditorEvent) -> Result<String> {
        serde_json::to_string(event).map_err(crate::error::PagesmithError::Json)
    }

    /// Deserialize an event from JSON string
    pub fn deserialize_event(json: &str) -> Result<EditorEvent> {
        serde_json::from_str(json).map_err(crate::error::PagesmithError::Json)
    }

    /// Format event for logging with timestamp
    pub fn format_event_for_log(event: &EditorEvent) -> String {
        let timestamp = event
            .timestamp()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        format!(
            "[{}] {}: {}",
            timestamp,
            event.event_type().to_uppercase(),
            event.description()
        )
    }
}

/// Where a new Document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentSource {
    /// Wholesale replacement by a generation response
    Generation,
    /// Direct-manipulation edits serialized back from the surface
    Serialization,
    /// Rollback triggered by a turn edit or delete
    Rollback,
    /// Loaded from outside (file, paste)
    Import,
}

/// Events emitted by the editor components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EditorEvent {
    DocumentReplaced {
        source: DocumentSource,
        length: usize,
        timestamp: SystemTime,
    },
    PreviewUpdated {
        surface_generation: u64,
        timestamp: SystemTime,
    },
    SnapshotRecorded {
        turn_index: usize,
        timestamp: SystemTime,
    },
    SnapshotsTruncated {
        from_turn_index: usize,
        discarded: usize,
        timestamp: SystemTime,
    },
    TurnAppended {
        turn_id: Uuid,
        position: usize,
        timestamp: SystemTime,
    },
    TurnResolved {
        turn_id: Uuid,
        position: usize,
        timestamp: SystemTime,
    },
    TurnDeleted {
        position: usize,
        removed: usize,
        timestamp: SystemTime,
    },
    TurnEdited {
        position: usize,
        timestamp: SystemTime,
    },
    SelectionChanged {
        tag_name: Option<String>,
        timestamp: SystemTime,
    },
    PanelOpened {
        tag_name: String,
        timestamp: SystemTime,
    },
    PanelClosed {
        synced: bool,
        timestamp: SystemTime,
    },
    ViewportChanged {
        viewport: String,
        timestamp: SystemTime,
    },
    FullscreenEntered {
        timestamp: SystemTime,
    },
    FullscreenExited {
        timestamp: SystemTime,
    },
    SwitchToCodeView {
        document: String,
        timestamp: SystemTime,
    },
    GenerationFailed {
        reason: String,
        timestamp: SystemTime,
    },
}

impl EditorEvent {
    pub fn document_replaced(source: DocumentSource, length: usize) -> Self {
        Self::DocumentReplaced {
            source,
            length,
            timestamp: SystemTime::now(),
        }
    }

    pub fn preview_updated(surface_generation: u64) -> Self {
        Self::PreviewUpdated {
            surface_generation,
            timestamp: SystemTime::now(),
        }
    }

    pub fn snapshot_recorded(turn_index: usize) -> Self {
        Self::SnapshotRecorded {
            turn_index,
            timestamp: SystemTime::now(),
        }
    }

    pub fn snapshots_truncated(from_turn_index: usize, discarded: usize) -> Self {
        Self::SnapshotsTruncated {
            from_turn_index,
            discarded,
            timestamp: SystemTime::now(),
        }
    }

    pub fn turn_appended(turn_id: Uuid, position: usize) -> Self {
        Self::TurnAppended {
            turn_id,
            position,
            timestamp: SystemTime::now(),
        }
    }

    pub fn turn_resolved(turn_id: Uuid, position: usize) -> Self {
        Self::TurnResolved {
            turn_id,
            position,
            timestamp: SystemTime::now(),
        }
    }

    pub fn turn_deleted(position: usize, removed: usize) -> Self {
        Self::TurnDeleted {
            position,
            removed,
            timestamp: SystemTime::now(),
        }
    }

    pub fn turn_edited(position: usize) -> Self {
        Self::TurnEdited {
            position,
            timestamp: SystemTime::now(),
        }
    }

    pub fn selection_changed(tag_name: Option<String>) -> Self {
        Self::SelectionChanged {
            tag_name,
            timestamp: SystemTime::now(),
        }
    }

    pub fn panel_opened(tag_name: String) -> Self {
        Self::PanelOpened {
            tag_name,
            timestamp: SystemTime::now(),
        }
    }

    pub fn panel_closed(synced: bool) -> Self {
        Self::PanelClosed {
            synced,
            timestamp: SystemTime::now(),
        }
    }

    pub fn viewport_changed(viewport: impl Into<String>) -> Self {
        Self::ViewportChanged {
            viewport: viewport.into(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn fullscreen_entered() -> Self {
        Self::FullscreenEntered {
            timestamp: SystemTime::now(),
        }
    }

    pub fn fullscreen_exited() -> Self {
        Self::FullscreenExited {
            timestamp: SystemTime::now(),
        }
    }

    pub fn switch_to_code_view(document: String) -> Self {
        Self::SwitchToCodeView {
            document,
            timestamp: SystemTime::now(),
        }
    }

    pub fn generation_failed(reason: impl Into<String>) -> Self {
        Self::GenerationFailed {
            reason: reason.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// Get the event type identifier
    pub fn event_type(&self) -> &'static str {
        match self {
            EditorEvent::DocumentReplaced { .. } => "document_replaced",
            EditorEvent::PreviewUpdated { .. } => "preview_updated",
            EditorEvent::SnapshotRecorded { .. } => "snapshot_recorded",
            EditorEvent::SnapshotsTruncated { .. } => "snapshots_truncated",
            EditorEvent::TurnAppended { .. } => "turn_appended",
            EditorEvent::TurnResolved { .. } => "turn_resolved",
            EditorEvent::TurnDeleted { .. } => "turn_deleted",
            EditorEvent::TurnEdited { .. } => "turn_edited",
            EditorEvent::SelectionChanged { .. } => "selection_changed",
            EditorEvent::PanelOpened { .. } => "panel_opened",
            EditorEvent::PanelClosed { .. } => "panel_closed",
            EditorEvent::ViewportChanged { .. } => "viewport_changed",
            EditorEvent::FullscreenEntered { .. } => "fullscreen_entered",
            EditorEvent::FullscreenExited { .. } => "fullscreen_exited",
            EditorEvent::SwitchToCodeView { .. } => "switch_to_code_view",
            EditorEvent::GenerationFailed { .. } => "generation_failed",
        }
    }

    /// Get the event timestamp
    pub fn timestamp(&self) -> SystemTime {
        match self {
            EditorEvent::DocumentReplaced { timestamp, .. }
            | EditorEvent::PreviewUpdated { timestamp, .. }
            | EditorEvent::SnapshotRecorded { timestamp, .. }
            | EditorEvent::SnapshotsTruncated { timestamp, .. }
            | EditorEvent::TurnAppended { timestamp, .. }
            | EditorEvent::TurnResolved { timestamp, .. }
            | EditorEvent::TurnDeleted { timestamp, .. }
            | EditorEvent::TurnEdited { timestamp, .. }
            | EditorEvent::SelectionChanged { timestamp, .. }
            | EditorEvent::PanelOpened { timestamp, .. }
            | EditorEvent::PanelClosed { timestamp, .. }
            | EditorEvent::ViewportChanged { timestamp, .. }
            | EditorEvent::FullscreenEntered { timestamp }
            | EditorEvent::FullscreenExited { timestamp }
            | EditorEvent::SwitchToCodeView { timestamp, .. }
            | EditorEvent::GenerationFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Get event metadata
    pub fn metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();

        match self {
            EditorEvent::DocumentReplaced { source, length, .. } => {
                metadata.insert("source".to_string(), format!("{:?}", source));
                metadata.insert("length".to_string(), length.to_string());
            }
            EditorEvent::PreviewUpdated {
                surface_generation, ..
            } => {
                metadata.insert(
                    "surface_generation".to_string(),
                    surface_generation.to_string(),
                );
            }
            EditorEvent::SnapshotRecorded { turn_index, .. } => {
                metadata.insert("turn_index".to_string(), turn_index.to_string());
            }
            EditorEvent::SnapshotsTruncated {
                from_turn_index,
                discarded,
                ..
            } => {
                metadata.insert("from_turn_index".to_string(), from_turn_index.to_string());
                metadata.insert("discarded".to_string(), discarded.to_string());
            }
            EditorEvent::TurnAppended {
                turn_id, position, ..
            }
            | EditorEvent::TurnResolved {
                turn_id, position, ..
            } => {
                metadata.insert("turn_id".to_string(), turn_id.to_string());
                metadata.insert("position".to_string(), position.to_string());
            }
            EditorEvent::TurnDeleted {
                position, removed, ..
            } => {
                metadata.insert("position".to_string(), position.to_string());
                metadata.insert("removed".to_string(), removed.to_string());
            }
            EditorEvent::TurnEdited { position, .. } => {
                metadata.insert("position".to_string(), position.to_string());
            }
            EditorEvent::SelectionChanged { tag_name, .. } => {
                if let Some(tag_name) = tag_name {
                    metadata.insert("tag_name".to_string(), tag_name.clone());
                }
            }
            EditorEvent::PanelOpened { tag_name, .. } => {
                metadata.insert("tag_name".to_string(), tag_name.clone());
            }
            EditorEvent::PanelClosed { synced, .. } => {
                metadata.insert("synced".to_string(), synced.to_string());
            }
            EditorEvent::ViewportChanged { viewport, .. } => {
                metadata.insert("viewport".to_string(), viewport.clone());
            }
            EditorEvent::SwitchToCodeView { document, .. } => {
                metadata.insert("length".to_string(), document.len().to_string());
            }
            EditorEvent::GenerationFailed { reason, .. } => {
                metadata.insert("reason".to_string(), reason.clone());
            }
            EditorEvent::FullscreenEntered { .. } | EditorEvent::FullscreenExited { .. } => {}
        }

        metadata
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            EditorEvent::DocumentReplaced { source, length, .. } => {
                format!("Document replaced by {:?} ({} bytes)", source, length)
            }
            EditorEvent::PreviewUpdated {
                surface_generation, ..
            } => format!("Preview reloaded (generation {})", surface_generation),
            EditorEvent::SnapshotRecorded { turn_index, .. } => {
                format!("Snapshot recorded for turn {}", turn_index)
            }
            EditorEvent::SnapshotsTruncated {
                from_turn_index,
                discarded,
                ..
            } => format!(
                "Discarded {} snapshots from turn {} onwards",
                discarded, from_turn_index
            ),
            EditorEvent::TurnAppended { position, .. } => {
                format!("Turn appended at {}", position)
            }
            EditorEvent::TurnResolved { position, .. } => {
                format!("Turn {} resolved", position)
            }
            EditorEvent::TurnDeleted {
                position, removed, ..
            } => format!("Deleted {} turns at {}", removed, position),
            EditorEvent::TurnEdited { position, .. } => format!("Turn {} edited", position),
            EditorEvent::SelectionChanged { tag_name, .. } => match tag_name {
                Some(tag_name) => format!("Selected <{}>", tag_name),
                None => "Selection cleared".to_string(),
            },
            EditorEvent::PanelOpened { tag_name, .. } => {
                format!("Edit panel opened for <{}>", tag_name)
            }
            EditorEvent::PanelClosed { synced, .. } => {
                format!("Edit panel closed (synced: {})", synced)
            }
            EditorEvent::ViewportChanged { viewport, .. } => {
                format!("Viewport switched to {}", viewport)
            }
            EditorEvent::FullscreenEntered { .. } => "Entered fullscreen".to_string(),
            EditorEvent::FullscreenExited { .. } => "Exited fullscreen".to_string(),
            EditorEvent::SwitchToCodeView { .. } => "Switched to code view".to_string(),
            EditorEvent::GenerationFailed { reason, .. } => {
                format!("Generation failed: {}", reason)
            }
        }
    }

    /// Check if this is a conversation event
    pub fn is_turn_event(&self) -> bool {
        matches!(
            self,
            EditorEvent::TurnAppended { .. }
                | EditorEvent::TurnResolved { .. }
                | EditorEvent::TurnDeleted { .. }
                | EditorEvent::TurnEdited { .. }
        )
    }

    /// Check if this is a version-history event
    pub fn is_history_event(&self) -> bool {
        matches!(
            self,
            EditorEvent::SnapshotRecorded { .. } | EditorEvent::SnapshotsTruncated { .. }
        )
    }
}

/// Handler for processing events
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an incoming event
    async fn handle_event(&self, event: &EditorEvent) -> Result<()>;

    /// Get handler name for debugging
    fn handler_name(&self) -> &str {
        "UnnamedHandler"
    }
}

/// Filter for events to determine if they should be delivered to a handler
pub trait EventFilter: Send + Sync {
    /// Check if the event should be delivered to the handler
    fn should_handle(&self, event: &EditorEvent) -> bool;
}

impl<F> EventFilter for F
where
    F: Fn(&EditorEvent) -> bool + Send + Sync,
{
    fn should_handle(&self, event: &EditorEvent) -> bool {
        self(event)
    }
}

/// Event bus for publishing and subscribing to events
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event to all subscribers
    async fn publish(&self, event: EditorEvent) -> Result<()>;

    /// Subscribe to events with optional filtering
    async fn subscribe(
        &self,
        handler: Arc<dyn EventHandler>,
        filter: Option<Box<dyn EventFilter>>,
    ) -> Result<SubscriptionId>;

    /// Unsubscribe from events
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;

    /// Get the number of active subscriptions
    async fn subscription_count(&self) -> usize;
}

/// Unique identifier for event subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub Uuid);

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
    filter: Option<Box<dyn EventFilter>>,
}

/// In-memory implementation of the event bus
///
/// Handlers run in subscription order. A failing handler is logged and
/// skipped; the publisher never sees its error.
pub struct InMemoryEventBus {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl InMemoryEventBus {
    /// Create a new in-memory event bus
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: EditorEvent) -> Result<()> {
        tracing::debug!("Publishing event: {}", event.event_type());

        let subscriptions = self.subscriptions.read().await;
        if subscriptions.is_empty() {
            tracing::trace!("No subscribers for event: {}", event.event_type());
            return Ok(());
        }

        let mut handlers_called = 0;
        for subscription in subscriptions.iter() {
            let should_handle = subscription
                .filter
                .as_ref()
                .map_or(true, |filter| filter.should_handle(&event));
            if !should_handle {
                continue;
            }

            if let Err(e) = subscription.handler.handle_event(&event).await {
                tracing::error!(
                    "Handler {} failed to process event {}: {}",
                    subscription.handler.handler_name(),
                    event.event_type(),
                    e
                );
            } else {
                handlers_called += 1;
                tracing::trace!(
                    "Handler {} processed event {}",
                    subscription.handler.handler_name(),
                    event.event_type()
                );
            }
        }

        tracing::debug!(
            "Routed event {} to {} handlers",
            event.event_type(),
            handlers_called
        );
        Ok(())
    }

    async fn subscribe(
        &self,
        handler: Arc<dyn EventHandler>,
        filter: Option<Box<dyn EventFilter>>,
    ) -> Result<SubscriptionId> {
        let id = SubscriptionId::new();
        tracing::debug!(
            "Created subscription {:?} for handler {}",
            id,
            handler.handler_name()
        );
        self.subscriptions.write().await.push(Subscription {
            id,
            handler,
            filter,
        });
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);

        if subscriptions.len() == before {
            tracing::warn!("Attempted to remove non-existent subscription: {:?}", id);
        } else {
            tracing::debug!("Removed subscription: {:?}", id);
        }
        Ok(())
    }

    async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}

/// Handler that keeps the events it receives, in order. A bounded recorder
/// drops the oldest event once it is full.
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<VecDeque<EditorEvent>>,
    capacity: Option<usize>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` recent events
    pub fn bounded(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
        }
    }

    /// Snapshot of the recorded events
    pub fn events(&self) -> Vec<EditorEvent> {
        self.events
            .lock()
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Recorded event types, in delivery order
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.event_type()).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle_event(&self, event: &EditorEvent) -> Result<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| crate::error::PagesmithError::event_bus("recorder poisoned"))?;
        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                return Ok(());
            }
            while events.len() >= capacity {
                events.pop_front();
            }
        }
        events.push_back(event.clone());
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "recording-handler"
    }
}
