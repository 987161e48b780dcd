//! Editor session: one Document, its conversation and its preview
//!
//! The session is the only writer of the Artifact Store. Generation is split
//! into `begin_*` and [`EditorSession::complete_submission`] so a host can
//! run the remote call without holding the session; the `is_generating` flag
//! rejects a second overlapping request, and any panel write, with
//! [`GenerationError::Busy`].

use pagesmith_core::{
    clean_response, classify_edit, export_download, export_text, ArtifactStore, Attachment,
    Config, ConversationLog, CredentialStatus, Deletion, DocumentSource, Download, EditScope,
    EditorEvent, EventBus, GenerationClient, GenerationError, GenerationRequest,
    GenerationResult, Language, Message, NodeId, PagesmithError, PreviewConfig, Role, Turn,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::color::ColorTarget;
use crate::inline_edit::{InlineEditEnd, InlineEditOverlay, InlineEditor, InlineKey, InlineStyleProbe, LayoutProbe};
use crate::mutator::{Dimension, ImageInfo, ImageSize, ImageSource, MutatorPanel, PanelView, TypographyProperty};
use crate::selection::{ElementSummary, SelectionEngine};
use crate::surface::RenderingSurface;
use crate::sync::SyncBridge;
use crate::typewriter::Presentation;
use crate::viewport::{FrameSize, ViewportMode};
use crate::{EditorError, EditorResult};

/// Settled turns sent along as conversation context
const CONTEXT_TURNS: usize = 6;

/// A generation request that has been registered with the session and is
/// waiting for the remote answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingGeneration {
    pub request: GenerationRequest,
    /// Snapshot key for the resulting Document
    pub exchange_index: usize,
    pub language: Language,
    pub scope: EditScope,
    had_document: bool,
}

/// How a generation is started. Owned, so a host can move it into a task.
#[derive(Debug, Clone)]
pub enum GenerationStart {
    /// A new user turn
    Submit {
        instruction: String,
        attachments: Vec<Attachment>,
    },
    /// Rewrite the user turn at `position` and regenerate from it
    EditTurn {
        position: usize,
        instruction: String,
        attachments: Vec<Attachment>,
    },
    /// Instruction typed into the mutator panel
    AiEdit {
        instruction: String,
        scoped: bool,
        image: Option<Attachment>,
    },
}

/// Keeps the session consistent when a generation future is dropped before
/// it completes
struct InFlight<'a> {
    session: &'a mut EditorSession,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.session.abandon_generation();
        }
    }
}

/// What a finished generation did to the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub success: bool,
    pub message: Message,
    pub reply: String,
    pub turn_position: usize,
    pub snapshot_turn_index: Option<usize>,
    pub presentation: Option<Presentation>,
}

pub struct EditorSession {
    id: Uuid,
    config: PreviewConfig,
    credential: CredentialStatus,
    store: ArtifactStore,
    log: ConversationLog,
    surface: RenderingSurface,
    selection: SelectionEngine,
    inline: InlineEditor,
    panel: Option<MutatorPanel>,
    probe: Box<dyn LayoutProbe>,
    event_bus: Arc<dyn EventBus>,
    is_generating: bool,
    created_at: SystemTime,
}

impl EditorSession {
    /// A session with an empty Document and a closed preview
    pub fn new(config: &Config, event_bus: Arc<dyn EventBus>) -> Self {
        let credential = config.credential_status();
        if credential == CredentialStatus::Missing {
            warn!("No API credential configured; generation is disabled");
        }
        Self {
            id: Uuid::new_v4(),
            config: config.preview.clone(),
            credential,
            store: ArtifactStore::new(),
            log: ConversationLog::new(),
            surface: RenderingSurface::new(config.preview.clone()),
            selection: SelectionEngine::new(),
            inline: InlineEditor::new(),
            panel: None,
            probe: Box::new(InlineStyleProbe),
            event_bus,
            is_generating: false,
            created_at: SystemTime::now(),
        }
    }

    /// Use host-provided layout information
    pub fn with_probe(mut self, probe: Box<dyn LayoutProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn document(&self) -> &str {
        self.store.document()
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn surface(&self) -> &RenderingSurface {
        &self.surface
    }

    pub fn selection(&self) -> &SelectionEngine {
        &self.selection
    }

    pub fn inline_overlay(&self) -> Option<&InlineEditOverlay> {
        self.inline.overlay()
    }

    pub fn is_generating(&self) -> bool {
        self.is_generating
    }

    pub fn is_panel_open(&self) -> bool {
        self.panel.is_some()
    }

    pub fn credential_status(&self) -> CredentialStatus {
        self.credential
    }

    /// Persistent notice shown while no credential is configured
    pub fn banner(&self) -> Option<&'static str> {
        match self.credential {
            CredentialStatus::Configured => None,
            CredentialStatus::Missing => Some(Message::NotConfigured.localize(Language::En)),
        }
    }

    async fn publish(&self, event: EditorEvent) {
        if let Err(e) = self.event_bus.publish(event).await {
            warn!("Failed to publish editor event: {}", e);
        }
    }

    // ----- Rendering surface -------------------------------------------------

    pub async fn open_preview(&mut self, mode: ViewportMode) -> EditorResult<u64> {
        self.surface.open(mode);
        let generation = self.reload_fresh();
        self.publish(EditorEvent::preview_updated(generation)).await;
        Ok(generation)
    }

    pub async fn close_preview(&mut self) -> EditorResult<()> {
        if self.panel.is_some() {
            self.close_panel().await?;
        }
        self.commit_inline_edit()?;
        self.selection.deactivate(&mut self.surface);
        self.surface.close();
        Ok(())
    }

    pub async fn set_viewport(&mut self, mode: ViewportMode) -> EditorResult<()> {
        self.surface.set_viewport(mode)?;
        let generation = self.reload_preserving_selection()?;
        info!("Viewport switched to {}", mode);
        self.publish(EditorEvent::viewport_changed(mode.to_string())).await;
        self.publish(EditorEvent::preview_updated(generation)).await;
        Ok(())
    }

    pub async fn enter_fullscreen(&mut self) -> EditorResult<()> {
        self.surface.enter_fullscreen()?;
        self.reload_preserving_selection()?;
        self.publish(EditorEvent::fullscreen_entered()).await;
        Ok(())
    }

    pub async fn exit_fullscreen(&mut self) -> EditorResult<()> {
        self.surface.exit_fullscreen()?;
        self.reload_preserving_selection()?;
        self.publish(EditorEvent::fullscreen_exited()).await;
        Ok(())
    }

    /// Frame for the current surface state; the side panel only takes room
    /// in the `open-*` states
    pub fn frame_size(&self, available_width: u32) -> Option<FrameSize> {
        self.surface.frame_size(available_width, self.panel.is_some())
    }

    /// Leave the preview for the code view. The preview is discarded
    /// without serializing: an unfinished inline edit is dropped and the
    /// Document stays as it is. Direct edits already applied live on in
    /// the working copy, which is what the code view shows.
    pub async fn show_code_view(&mut self) -> EditorResult<String> {
        self.inline.abandon();
        self.selection.deactivate(&mut self.surface);
        let had_panel = self.panel.take().is_some();
        self.surface.close();
        if had_panel {
            self.publish(EditorEvent::panel_closed(false)).await;
        }

        let document = self.store.effective().to_string();
        self.publish(EditorEvent::switch_to_code_view(document.clone()))
            .await;
        Ok(document)
    }

    /// Reload for a new Document: selection and panel do not carry over
    fn reload_fresh(&mut self) -> u64 {
        self.inline.abandon();
        self.panel = None;
        let generation = self.surface.load(self.store.effective());
        self.selection.rebind(&mut self.surface, None);
        generation
    }

    /// Reload the same Document (viewport/fullscreen switch). Pending edits
    /// come from the working copy and the selected element is re-selected.
    fn reload_preserving_selection(&mut self) -> EditorResult<u64> {
        self.commit_inline_edit()?;
        let path = self.selection.selected_path(&self.surface);
        let generation = self.surface.load(self.store.effective());
        let reselected = self.selection.rebind(&mut self.surface, path.as_deref());
        if reselected.is_none() && self.panel.is_some() {
            debug!("Selection lost on reload, closing panel");
            self.panel = None;
        }
        Ok(generation)
    }

    // ----- Selection & inline edit -------------------------------------------

    pub fn enable_select_mode(&mut self) -> EditorResult<()> {
        if !self.surface.is_open() {
            return Err(EditorError::SurfaceClosed);
        }
        self.selection.activate(&mut self.surface);
        Ok(())
    }

    /// Leaving select mode closes (and syncs) an open panel
    pub async fn disable_select_mode(&mut self) -> EditorResult<()> {
        if self.panel.is_some() {
            self.close_panel().await?;
        } else {
            self.commit_inline_edit()?;
            self.selection.deactivate(&mut self.surface);
        }
        self.publish(EditorEvent::selection_changed(None)).await;
        Ok(())
    }

    pub fn hover(&mut self, node: NodeId) -> bool {
        self.selection.pointer_enter(&mut self.surface, node)
    }

    pub fn leave(&mut self, node: NodeId) {
        self.selection.pointer_leave(&mut self.surface, node)
    }

    /// Select an element and open the mutator panel on it. Returns `None`
    /// when select mode is off or the element is excluded.
    pub async fn click(&mut self, node: NodeId) -> EditorResult<Option<PanelView>> {
        self.commit_inline_edit()?;
        if self.selection.click(&mut self.surface, node).is_none() {
            return Ok(None);
        }
        let panel = MutatorPanel::open(&self.surface, node, self.probe.as_ref());
        let view = panel.view(&self.surface, node, self.probe.as_ref());
        self.panel = Some(panel);

        let tag = self.surface.dom().tag_name(node).unwrap_or_default().to_string();
        self.publish(EditorEvent::selection_changed(Some(tag.clone())))
            .await;
        self.publish(EditorEvent::panel_opened(tag)).await;
        Ok(view)
    }

    /// Start an inline edit on an element with text
    pub fn double_click(&mut self, node: NodeId) -> EditorResult<Option<InlineEditOverlay>> {
        self.ensure_idle()?;
        if !self.selection.is_active() || !SelectionEngine::is_eligible(&self.surface, node) {
            return Ok(None);
        }
        let previous = self
            .inline
            .begin(&mut self.surface, node, self.probe.as_ref())?;
        self.after_inline_end(previous);
        Ok(self.inline.overlay().cloned())
    }

    pub fn inline_input(&mut self, value: impl Into<String>) {
        self.inline.input(value);
    }

    pub fn inline_key(&mut self, key: InlineKey) -> EditorResult<()> {
        let end = self.inline.key(&mut self.surface, key)?;
        self.after_inline_end(end);
        Ok(())
    }

    pub fn inline_blur(&mut self) -> EditorResult<()> {
        let end = self.inline.blur(&mut self.surface)?;
        self.after_inline_end(end);
        Ok(())
    }

    fn commit_inline_edit(&mut self) -> EditorResult<()> {
        let end = self.inline.commit(&mut self.surface)?;
        self.after_inline_end(end);
        Ok(())
    }

    fn after_inline_end(&mut self, end: Option<InlineEditEnd>) {
        if let Some(InlineEditEnd::Committed { changed: true, .. }) = end {
            SyncBridge::write_working(&self.surface, &mut self.store);
        }
    }

    /// Display info for the selection, derived from the live node
    pub fn selected_summary(&self) -> Option<ElementSummary> {
        let node = self.selection.target(&self.surface).ok()?;
        ElementSummary::of(&self.surface, node, &self.config)
    }

    // ----- Style mutator -----------------------------------------------------

    pub fn panel_view(&self) -> EditorResult<PanelView> {
        let panel = self.panel.as_ref().ok_or(EditorError::NoSelection)?;
        let node = self.selection.target(&self.surface)?;
        panel
            .view(&self.surface, node, self.probe.as_ref())
            .ok_or(EditorError::StaleReference)
    }

    /// Run a mutation against the selected element and record the result in
    /// the working copy
    fn mutate<T>(
        &mut self,
        op: impl FnOnce(&mut MutatorPanel, &mut RenderingSurface, NodeId) -> EditorResult<T>,
    ) -> EditorResult<T> {
        self.ensure_idle()?;
        let node = self.selection.target(&self.surface)?;
        let panel = self.panel.as_mut().ok_or(EditorError::NoSelection)?;
        let result = op(panel, &mut self.surface, node)?;
        SyncBridge::write_working(&self.surface, &mut self.store);
        Ok(result)
    }

    pub fn set_dimension(&mut self, dimension: Dimension, pixels: f64) -> EditorResult<()> {
        self.mutate(|panel, surface, node| panel.set_dimension(surface, node, dimension, pixels))
    }

    pub fn set_typography(&mut self, property: TypographyProperty, value: &str) -> EditorResult<()> {
        self.mutate(|panel, surface, node| panel.set_typography(surface, node, property, value))
    }

    pub fn set_color_hex(&mut self, target: ColorTarget, hex: &str) -> EditorResult<String> {
        self.mutate(|panel, surface, node| panel.set_color_hex(surface, node, target, hex))
    }

    pub fn pick_gradient(&mut self, target: ColorTarget, x: f64, y: f64) -> EditorResult<String> {
        self.mutate(|panel, surface, node| panel.pick_gradient(surface, node, target, x, y))
    }

    pub fn pick_hue(&mut self, target: ColorTarget, t: f64) -> EditorResult<String> {
        self.mutate(|panel, surface, node| panel.pick_hue(surface, node, target, t))
    }

    pub fn images(&self) -> EditorResult<Vec<ImageInfo>> {
        let node = self.selection.target(&self.surface)?;
        Ok(MutatorPanel::images(&self.surface, node))
    }

    pub fn replace_image(&mut self, index: usize, source: &ImageSource) -> EditorResult<()> {
        self.mutate(|panel, surface, node| panel.replace_image(surface, node, index, source))
    }

    pub fn insert_image(&mut self, source: &ImageSource, alt: &str) -> EditorResult<NodeId> {
        self.mutate(|panel, surface, node| panel.insert_image(surface, node, source, alt))
    }

    pub fn resize_image(&mut self, index: usize, size: ImageSize) -> EditorResult<()> {
        self.mutate(|panel, surface, node| panel.resize_image(surface, node, index, size))
    }

    /// Save/Update: serialize direct edits into the Document, keep editing
    pub async fn save_panel(&mut self) -> EditorResult<String> {
        self.ensure_idle()?;
        self.commit_inline_edit()?;
        let path = self.selection.selected_path(&self.surface);
        let document = SyncBridge::sync(&mut self.surface, &mut self.store);
        self.selection.rebind(&mut self.surface, path.as_deref());
        self.publish(EditorEvent::document_replaced(
            DocumentSource::Serialization,
            document.len(),
        ))
        .await;
        Ok(document)
    }

    /// Close the panel: markers are stripped, the live DOM becomes the
    /// Document, and select mode ends. Refused while a generation is
    /// pending, since its answer would overwrite the Document.
    pub async fn close_panel(&mut self) -> EditorResult<String> {
        self.ensure_idle()?;
        self.commit_inline_edit()?;
        let document = SyncBridge::sync(&mut self.surface, &mut self.store);
        self.selection.deactivate(&mut self.surface);
        self.panel = None;
        self.publish(EditorEvent::document_replaced(
            DocumentSource::Serialization,
            document.len(),
        ))
        .await;
        self.publish(EditorEvent::panel_closed(true)).await;
        Ok(document)
    }

    // ----- Conversation ------------------------------------------------------

    fn ensure_idle(&self) -> EditorResult<()> {
        if self.is_generating {
            warn!("Session busy generating; request rejected");
            return Err(GenerationError::Busy.into());
        }
        Ok(())
    }

    /// Register the request described by `start`
    pub async fn begin(&mut self, start: GenerationStart) -> EditorResult<PendingGeneration> {
        match start {
            GenerationStart::Submit {
                instruction,
                attachments,
            } => self.begin_submission(&instruction, attachments).await,
            GenerationStart::EditTurn {
                position,
                instruction,
                attachments,
            } => self.begin_edit_turn(position, &instruction, attachments).await,
            GenerationStart::AiEdit {
                instruction,
                scoped,
                image,
            } => self.begin_ai_edit(&instruction, scoped, image).await,
        }
    }

    /// Give up on the outstanding generation. The pending turn is resolved
    /// with the generic error reply and the Document is left as it was.
    pub fn abandon_generation(&mut self) {
        self.is_generating = false;
        if let Some(position) = self.log.pending_index() {
            let language = position
                .checked_sub(1)
                .and_then(|p| self.log.get(p))
                .map(|turn| Language::detect(&turn.content))
                .unwrap_or_default();
            self.log
                .resolve_pending_turn(Message::GenericError.localize(language));
            warn!("Generation abandoned; turn {} resolved with an error", position);
        }
    }

    /// Begin, call the client and complete in one future. If the future is
    /// dropped midway the generation is abandoned.
    async fn run_generation(
        &mut self,
        client: &dyn GenerationClient,
        start: GenerationStart,
    ) -> EditorResult<GenerationOutcome> {
        let mut in_flight = InFlight {
            session: self,
            armed: true,
        };
        let pending = match in_flight.session.begin(start).await {
            Ok(pending) => pending,
            Err(e) => {
                in_flight.armed = false;
                return Err(e);
            }
        };
        let result = client.generate(&pending.request).await;
        in_flight.armed = false;
        in_flight.session.complete_submission(pending, result).await
    }

    /// Register a new user turn and build its generation request
    pub async fn begin_submission(
        &mut self,
        instruction: &str,
        attachments: Vec<Attachment>,
    ) -> EditorResult<PendingGeneration> {
        let language = Language::detect(instruction);
        let scope = classify_edit(instruction);
        self.start_exchange(instruction.trim().to_string(), language, scope, attachments)
            .await
    }

    async fn start_exchange(
        &mut self,
        instruction: String,
        language: Language,
        scope: EditScope,
        attachments: Vec<Attachment>,
    ) -> EditorResult<PendingGeneration> {
        self.ensure_idle()?;
        if instruction.is_empty() {
            return Err(PagesmithError::conversation("instruction is empty").into());
        }

        let image = attachments.first().cloned();
        let context: Vec<Turn> = self
            .log
            .context_window(CONTEXT_TURNS)
            .into_iter()
            .cloned()
            .collect();
        let request = GenerationRequest::new(instruction.clone())
            .with_prior_document(self.store.document())
            .with_context(&context)
            .with_image(image);

        let turn = Turn::user(instruction, attachments);
        let turn_id = turn.id;
        let position = self.log.append_turn(turn);
        let exchange_index = self.log.exchange_index(position);
        self.is_generating = true;

        info!(
            "Generation started for exchange {} ({:?}, {:?})",
            exchange_index,
            request.shape(),
            scope
        );
        self.publish(EditorEvent::turn_appended(turn_id, position)).await;

        Ok(PendingGeneration {
            had_document: request.prior_document.is_some(),
            request,
            exchange_index,
            language,
            scope,
        })
    }

    /// Apply the remote answer (or failure) of a pending generation
    pub async fn complete_submission(
        &mut self,
        pending: PendingGeneration,
        result: GenerationResult,
    ) -> EditorResult<GenerationOutcome> {
        self.is_generating = false;

        let outcome = match result {
            Ok(raw) => {
                let document = clean_response(&raw);
                self.store.set_document(document.clone());
                let snapshot_turn_index = match self
                    .store
                    .record_snapshot(document.clone(), pending.exchange_index)
                {
                    Ok(()) => Some(pending.exchange_index),
                    Err(e) => {
                        warn!("Snapshot not recorded: {}", e);
                        None
                    }
                };

                let message = if pending.had_document {
                    Message::CodeModified
                } else {
                    Message::CodeGenerated
                };
                let reply = message.localize(pending.language).to_string();
                let turn_position = self.log.resolve_pending_turn(reply.clone());
                let presentation =
                    Presentation::for_scope(pending.scope, &document, self.config.typewriter_chunk_chars);

                info!(
                    "Generation completed for exchange {} ({} bytes)",
                    pending.exchange_index,
                    document.len()
                );
                self.publish(EditorEvent::document_replaced(
                    DocumentSource::Generation,
                    document.len(),
                ))
                .await;
                if let Some(index) = snapshot_turn_index {
                    self.publish(EditorEvent::snapshot_recorded(index)).await;
                }

                GenerationOutcome {
                    success: true,
                    message,
                    reply,
                    turn_position,
                    snapshot_turn_index,
                    presentation: Some(presentation),
                }
            }
            Err(error) => {
                let message = Message::for_generation_error(&error);
                let reply = message.localize(pending.language).to_string();
                let turn_position = self.log.resolve_pending_turn(reply.clone());
                warn!("Generation failed for exchange {}: {}", pending.exchange_index, error);
                self.publish(EditorEvent::generation_failed(error.to_string()))
                    .await;

                GenerationOutcome {
                    success: false,
                    message,
                    reply,
                    turn_position,
                    snapshot_turn_index: None,
                    presentation: None,
                }
            }
        };

        if let Some(turn) = self.log.get(outcome.turn_position) {
            self.publish(EditorEvent::turn_resolved(turn.id, outcome.turn_position))
                .await;
        }
        if outcome.success && self.surface.is_open() {
            let generation = self.reload_fresh();
            self.publish(EditorEvent::preview_updated(generation)).await;
        }
        Ok(outcome)
    }

    /// New user turn, generated end to end
    pub async fn submit(
        &mut self,
        client: &dyn GenerationClient,
        instruction: &str,
        attachments: Vec<Attachment>,
    ) -> EditorResult<GenerationOutcome> {
        let start = GenerationStart::Submit {
            instruction: instruction.to_string(),
            attachments,
        };
        self.run_generation(client, start).await
    }

    /// Delete a turn (cascading to its reply) and roll the Document back
    pub async fn delete_turn(&mut self, position: usize) -> EditorResult<Deletion> {
        self.ensure_idle()?;
        if position >= self.log.len() {
            return Err(EditorError::TurnNotFound(position));
        }
        let deletion = self.log.delete_turn(position, &mut self.store)?;
        self.publish(EditorEvent::turn_deleted(position, deletion.removed))
            .await;

        if let (Some(exchange), Some(restored)) = (deletion.exchange, &deletion.restored) {
            self.after_rollback(exchange, restored.discarded).await;
        }
        Ok(deletion)
    }

    async fn after_rollback(&mut self, from_turn_index: usize, discarded: usize) {
        if discarded > 0 {
            self.publish(EditorEvent::snapshots_truncated(from_turn_index, discarded))
                .await;
        }
        self.publish(EditorEvent::document_replaced(
            DocumentSource::Rollback,
            self.store.document().len(),
        ))
        .await;
        if self.surface.is_open() {
            let generation = self.reload_fresh();
            self.publish(EditorEvent::preview_updated(generation)).await;
        }
    }

    /// Edit a user turn in place: roll back, then regenerate from it
    pub async fn begin_edit_turn(
        &mut self,
        position: usize,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> EditorResult<PendingGeneration> {
        self.ensure_idle()?;
        let turn = self.log.get(position).ok_or(EditorError::TurnNotFound(position))?;
        if turn.role != Role::User {
            return Err(EditorError::NotAUserTurn(position));
        }
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(PagesmithError::conversation("instruction is empty").into());
        }

        let context: Vec<Turn> = self
            .log
            .context_before(position, CONTEXT_TURNS)
            .into_iter()
            .cloned()
            .collect();
        let image = attachments.first().cloned();
        let resubmission = self
            .log
            .edit_turn(position, content.clone(), attachments, &mut self.store)?;
        self.is_generating = true;
        self.publish(EditorEvent::turn_edited(position)).await;
        self.after_rollback(
            resubmission.exchange_index,
            resubmission.restored.discarded,
        )
        .await;

        let request = GenerationRequest::new(content.clone())
            .with_prior_document(self.store.document())
            .with_context(&context)
            .with_image(image);

        Ok(PendingGeneration {
            had_document: request.prior_document.is_some(),
            request,
            exchange_index: resubmission.exchange_index,
            language: Language::detect(&content),
            scope: classify_edit(&content),
        })
    }

    pub async fn edit_turn(
        &mut self,
        client: &dyn GenerationClient,
        position: usize,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> EditorResult<GenerationOutcome> {
        let start = GenerationStart::EditTurn {
            position,
            instruction: content.to_string(),
            attachments,
        };
        self.run_generation(client, start).await
    }

    /// AI-assisted edit from the panel. Direct edits are synced first so the
    /// model sees them; `scoped` prefixes the selected element's context.
    pub async fn begin_ai_edit(
        &mut self,
        instruction: &str,
        scoped: bool,
        image: Option<Attachment>,
    ) -> EditorResult<PendingGeneration> {
        self.ensure_idle()?;
        let summary = if scoped {
            Some(self.selected_summary().ok_or(EditorError::NoSelection)?)
        } else {
            None
        };
        if self.panel.is_some() || self.store.working().is_some() {
            self.save_panel().await?;
        }

        let text = match &summary {
            Some(summary) => MutatorPanel::scoped_instruction(summary, instruction, true),
            None => instruction.trim().to_string(),
        };
        self.start_exchange(
            text,
            Language::detect(instruction),
            classify_edit(instruction),
            image.into_iter().collect(),
        )
        .await
    }

    pub async fn ai_edit(
        &mut self,
        client: &dyn GenerationClient,
        instruction: &str,
        scoped: bool,
        image: Option<Attachment>,
    ) -> EditorResult<GenerationOutcome> {
        let start = GenerationStart::AiEdit {
            instruction: instruction.to_string(),
            scoped,
            image,
        };
        self.run_generation(client, start).await
    }

    /// Load an image for a turn. Non-images are refused with a notice in the
    /// conversation and never reach the generation client.
    pub async fn attach_file(&mut self, path: &Path) -> EditorResult<Attachment> {
        match Attachment::from_file(path).await {
            Ok(attachment) => Ok(attachment),
            Err(PagesmithError::Attachment(reason)) => {
                self.log
                    .append_turn(Turn::system(Message::InvalidImage.localize(Language::En)));
                Err(PagesmithError::Attachment(reason).into())
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Replace the Document with externally supplied markup (a file, or the
    /// code view). Snapshots are left alone; the next generation records
    /// on top of it.
    pub async fn import_document(&mut self, document: &str) -> EditorResult<()> {
        self.ensure_idle()?;
        self.store.set_document(document.to_string());
        info!("Imported document ({} bytes)", document.len());
        self.publish(EditorEvent::document_replaced(
            DocumentSource::Import,
            document.len(),
        ))
        .await;
        if self.surface.is_open() {
            let generation = self.reload_fresh();
            self.publish(EditorEvent::preview_updated(generation)).await;
        }
        Ok(())
    }

    // ----- Export --------------------------------------------------------------

    pub fn export_text(&self) -> String {
        export_text(self.store.document())
    }

    pub fn export_download(&self) -> Download {
        export_download(self.store.document())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SurfaceState;
    use pagesmith_core::{InMemoryEventBus, RecordingHandler, ScriptedClient};
    use std::time::Duration;

    async fn session_with_recorder() -> (EditorSession, Arc<RecordingHandler>) {
        let bus = Arc::new(InMemoryEventBus::new());
        let recorder = Arc::new(RecordingHandler::new());
        bus.subscribe(recorder.clone(), None).await.unwrap();
        let mut config = Config::default();
        config.generation.api_key = Some("test-key".to_string());
        (EditorSession::new(&config, bus), recorder)
    }

    #[tokio::test]
    async fn test_second_request_is_rejected_while_generating() {
        let (mut session, _) = session_with_recorder().await;
        let pending = session.begin_submission("Create a landing page", vec![]).await.unwrap();

        let err = session.begin_submission("Another one", vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            EditorError::Core(PagesmithError::Generation(GenerationError::Busy))
        ));
        assert!(matches!(
            session.delete_turn(0).await,
            Err(EditorError::Core(PagesmithError::Generation(GenerationError::Busy)))
        ));

        session
            .complete_submission(pending, Ok("<p>ok</p>".to_string()))
            .await
            .unwrap();
        assert!(!session.is_generating());
        assert_eq!(session.log().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_localized_and_document_untouched() {
        let (mut session, recorder) = session_with_recorder().await;
        let client = ScriptedClient::with_responses([
            Ok("<h1>Bonjour</h1>".to_string()),
            Err(GenerationError::RateLimited),
        ]);
        session
            .submit(&client, "Crée une page avec un titre", vec![])
            .await
            .unwrap();

        let outcome = session
            .submit(&client, "Change la couleur du titre en rouge", vec![])
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, Message::RateLimited);
        assert_eq!(outcome.reply, Message::RateLimited.localize(Language::Fr));
        assert_eq!(session.document(), "<h1>Bonjour</h1>");
        assert_eq!(session.store().snapshot_indices(), vec![0]);
        assert!(session.log().pending_index().is_none());
        assert!(recorder.event_types().contains(&"generation_failed"));
    }

    #[tokio::test]
    async fn test_request_carries_prior_document_and_context() {
        let (mut session, _) = session_with_recorder().await;
        let client = ScriptedClient::with_responses([
            Ok("<p>one</p>".to_string()),
            Ok("<p>two</p>".to_string()),
        ]);
        session.submit(&client, "Make a page", vec![]).await.unwrap();
        session.submit(&client, "Add a footer", vec![]).await.unwrap();

        let requests = client.requests();
        assert_eq!(requests[0].prior_document, None);
        assert!(requests[0].context.is_empty());
        assert_eq!(requests[1].prior_document.as_deref(), Some("<p>one</p>"));
        assert_eq!(requests[1].context.len(), 2);
    }

    #[tokio::test]
    async fn test_edit_turn_regenerates_at_same_position() {
        let (mut session, _) = session_with_recorder().await;
        let client = ScriptedClient::with_responses([
            Ok("<p>v1</p>".to_string()),
            Ok("<p>v2</p>".to_string()),
            Ok("<p>v2 edited</p>".to_string()),
        ]);
        session.submit(&client, "Make a page", vec![]).await.unwrap();
        session.submit(&client, "Add a footer", vec![]).await.unwrap();

        let outcome = session
            .edit_turn(&client, 2, "Add a header instead", vec![])
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.turn_position, 3);
        assert_eq!(session.document(), "<p>v2 edited</p>");
        assert_eq!(session.store().snapshot_indices(), vec![0, 1]);
        assert_eq!(client.requests()[2].prior_document.as_deref(), Some("<p>v1</p>"));

        assert!(matches!(
            session.edit_turn(&client, 1, "x", vec![]).await,
            Err(EditorError::NotAUserTurn(1))
        ));
        assert!(matches!(
            session.edit_turn(&client, 9, "x", vec![]).await,
            Err(EditorError::TurnNotFound(9))
        ));
    }

    #[tokio::test]
    async fn test_imported_document_is_sent_as_prior_code() {
        let (mut session, recorder) = session_with_recorder().await;
        session.import_document("<p>from disk</p>").await.unwrap();
        assert_eq!(session.document(), "<p>from disk</p>");
        assert!(recorder.events().iter().any(|e| matches!(
            e,
            EditorEvent::DocumentReplaced {
                source: DocumentSource::Import,
                ..
            }
        )));

        let client = ScriptedClient::with_responses([Ok("<p>updated</p>".to_string())]);
        let outcome = session.submit(&client, "Add a title", vec![]).await.unwrap();
        assert_eq!(outcome.message, Message::CodeModified);
        assert_eq!(
            client.requests()[0].prior_document.as_deref(),
            Some("<p>from disk</p>")
        );
    }

    fn is_busy<T>(result: &EditorResult<T>) -> bool {
        matches!(
            result,
            Err(EditorError::Core(PagesmithError::Generation(GenerationError::Busy)))
        )
    }

    #[tokio::test]
    async fn test_dropped_generation_releases_the_session() {
        let (mut session, _) = session_with_recorder().await;
        let client = ScriptedClient::with_responses([
            Ok("<p>late</p>".to_string()),
            Ok("<p>unused</p>".to_string()),
        ])
        .with_delay(Duration::from_millis(100));

        let dropped = tokio::time::timeout(
            Duration::from_millis(20),
            session.submit(&client, "Make a page", vec![]),
        )
        .await;
        assert!(dropped.is_err());
        assert!(!session.is_generating());
        assert!(session.log().pending_index().is_none());
        assert_eq!(
            session.log().get(1).unwrap().content,
            Message::GenericError.localize(Language::En)
        );
        assert_eq!(session.document(), "");

        // The session takes the next request; the dropped call never consumed its answer
        let outcome = session.submit(&client, "Make a page", vec![]).await.unwrap();
        assert!(outcome.success);
        assert_eq!(session.document(), "<p>late</p>");
        assert_eq!(session.store().snapshot_indices(), vec![1]);

        let dropped = tokio::time::timeout(
            Duration::from_millis(20),
            session.edit_turn(&client, 2, "Make a longer page", vec![]),
        )
        .await;
        assert!(dropped.is_err());
        assert!(!session.is_generating());
        assert!(session.log().pending_index().is_none());
        assert_eq!(session.log().len(), 4);
        assert!(session.store().snapshot_indices().is_empty());
        assert!(session.delete_turn(2).await.is_ok());
    }

    #[tokio::test]
    async fn test_panel_writes_are_refused_while_generating() {
        let (mut session, _) = session_with_recorder().await;
        let client = ScriptedClient::with_responses([Ok("<h1>v1</h1>".to_string())]);
        session.submit(&client, "Make a page", vec![]).await.unwrap();
        session.open_preview(ViewportMode::Desktop).await.unwrap();
        session.enable_select_mode().unwrap();
        let h1 = session.surface().dom().find_first("h1").unwrap();
        session.click(h1).await.unwrap();

        let pending = session
            .begin_submission("Rewrite the title", vec![])
            .await
            .unwrap();
        assert!(is_busy(&session.set_color_hex(ColorTarget::Text, "#ff0000")));
        assert!(is_busy(&session.double_click(h1)));
        assert!(is_busy(&session.save_panel().await));
        assert!(is_busy(&session.close_panel().await));
        assert_eq!(session.document(), "<h1>v1</h1>");
        assert!(session.store().working().is_none());

        let outcome = session
            .complete_submission(pending, Ok("<h1>v2</h1>".to_string()))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(session.document(), "<h1>v2</h1>");
        assert!(!session.is_panel_open());
    }

    #[tokio::test]
    async fn test_code_view_discards_preview_without_syncing() {
        let (mut session, recorder) = session_with_recorder().await;
        let page = "<h1>Title</h1><p>Body</p>";
        let client = ScriptedClient::with_responses([Ok(page.to_string())]);
        session.submit(&client, "Make a page", vec![]).await.unwrap();
        session.open_preview(ViewportMode::Desktop).await.unwrap();
        session.enable_select_mode().unwrap();

        let h1 = session.surface().dom().find_first("h1").unwrap();
        session.click(h1).await.unwrap();
        session.set_color_hex(ColorTarget::Text, "#00ff00").unwrap();
        let p = session.surface().dom().find_first("p").unwrap();
        assert!(session.double_click(p).unwrap().is_some());
        session.inline_input("Draft text");

        let markup = session.show_code_view().await.unwrap();
        assert_eq!(session.surface().state(), SurfaceState::Closed);
        assert_eq!(session.document(), page);
        assert!(markup.contains("color: #00ff00"));
        assert!(markup.contains("<p>Body</p>"));
        assert!(!markup.contains("Draft text"));
        assert!(session.inline_overlay().is_none());
        assert!(!session.is_panel_open());
        assert!(!session.selection().is_active());

        let types = recorder.event_types();
        assert!(types.contains(&"panel_closed"));
        assert_eq!(types.last(), Some(&"switch_to_code_view"));
    }

    #[tokio::test]
    async fn test_missing_credential_shows_banner() {
        let bus = Arc::new(InMemoryEventBus::new());
        let session = EditorSession::new(&Config::default(), bus);
        assert_eq!(session.credential_status(), CredentialStatus::Missing);
        assert!(session.banner().is_some());
    }
}
