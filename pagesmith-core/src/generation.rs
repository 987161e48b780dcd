//! Generation Client boundary
//!
//! The remote model is an opaque text-in/text-out service. This module owns
//! the request shapes, the response cleaning contract, the small/large edit
//! heuristic and the timeout ceiling; concrete clients live elsewhere.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::attachment::Attachment;
use crate::conversation::{Role, Turn};
use crate::error::GenerationError;

/// Substituted whenever the model answers with nothing usable
pub const FALLBACK_DOCUMENT: &str = "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n<title>New page</title>\n</head>\n<body>\n<main>\n<h1>Your page</h1>\n<p>The generator returned an empty result. Describe your page again to try once more.</p>\n</main>\n</body>\n</html>";

pub type GenerationResult = std::result::Result<String, GenerationError>;

/// A prior turn passed to the model as conversation context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextTurn {
    pub role: Role,
    pub content: String,
}

impl From<&Turn> for ContextTurn {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestShape {
    TextOnly,
    TextWithImage,
    TextWithPriorCode,
    TextWithPriorCodeAndImage,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub instruction: String,
    pub prior_document: Option<String>,
    pub context: Vec<ContextTurn>,
    pub image: Option<Attachment>,
}

impl GenerationRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            ..Default::default()
        }
    }

    /// Attach the current Document; a blank one is not sent
    pub fn with_prior_document(mut self, document: &str) -> Self {
        self.prior_document = if document.trim().is_empty() {
            None
        } else {
            Some(document.to_string())
        };
        self
    }

    pub fn with_context<'a>(mut self, turns: impl IntoIterator<Item = &'a Turn>) -> Self {
        self.context = turns.into_iter().map(ContextTurn::from).collect();
        self
    }

    pub fn with_image(mut self, image: Option<Attachment>) -> Self {
        self.image = image;
        self
    }

    pub fn shape(&self) -> RequestShape {
        match (self.prior_document.is_some(), self.image.is_some()) {
            (false, false) => RequestShape::TextOnly,
            (false, true) => RequestShape::TextWithImage,
            (true, false) => RequestShape::TextWithPriorCode,
            (true, true) => RequestShape::TextWithPriorCodeAndImage,
        }
    }
}

/// The remote text/multimodal model
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Produce raw model output for a request. Callers run the result
    /// through [`clean_response`].
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult;

    fn client_name(&self) -> &str {
        "UnnamedClient"
    }
}

fn fence_pattern() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)(?:```|\z)").ok())
        .as_ref()
}

/// Strip an optional fenced code block and surrounding whitespace.
/// Never returns an empty string.
pub fn clean_response(raw: &str) -> String {
    let body = fence_pattern()
        .and_then(|re| re.captures(raw))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);

    let cleaned = body.trim();
    if cleaned.is_empty() {
        warn!("Generation returned an empty document, using fallback");
        FALLBACK_DOCUMENT.to_string()
    } else {
        cleaned.to_string()
    }
}

/// How a change is presented to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditScope {
    Small,
    Large,
}

const SMALL_EDIT_WORDS: &[&str] = &[
    // English
    "change", "color", "colour", "text", "font", "size", "bigger", "smaller", "larger",
    "add", "remove", "delete", "rename", "replace", "background", "bold", "italic",
    "padding", "margin", "border", "width", "height",
    // French
    "changer", "couleur", "texte", "taille", "police", "ajoute", "ajouter", "supprime",
    "supprimer", "remplace", "remplacer", "fond", "gras", "modifie", "modifier",
    // Spanish
    "cambia", "cambiar", "texto", "tamaño", "fuente", "añade", "agrega", "agregar", "elimina",
    "quita", "reemplaza", "fondo", "negrita",
];

/// Whether an instruction reads like a small, local modification.
/// Only the presentation depends on this, never the request.
pub fn classify_edit(instruction: &str) -> EditScope {
    let lowered = instruction.to_lowercase();
    let hit = lowered
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| SMALL_EDIT_WORDS.contains(&word));
    if hit {
        EditScope::Small
    } else {
        EditScope::Large
    }
}

/// Applies the fixed generation ceiling to any client
pub struct TimedClient<C> {
    inner: C,
    ceiling: Duration,
}

impl<C: GenerationClient> TimedClient<C> {
    pub fn new(inner: C, ceiling: Duration) -> Self {
        Self { inner, ceiling }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: GenerationClient> GenerationClient for TimedClient<C> {
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        match tokio::time::timeout(self.ceiling, self.inner.generate(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "{} did not answer within {:?}",
                    self.inner.client_name(),
                    self.ceiling
                );
                Err(GenerationError::Timeout {
                    after: self.ceiling,
                })
            }
        }
    }

    fn client_name(&self) -> &str {
        self.inner.client_name()
    }
}

/// Fails closed when no credential is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredClient;

#[async_trait]
impl GenerationClient for UnconfiguredClient {
    async fn generate(&self, _request: &GenerationRequest) -> GenerationResult {
        Err(GenerationError::NotConfigured)
    }

    fn client_name(&self) -> &str {
        "UnconfiguredClient"
    }
}

/// In-memory client answering from a queue of canned results
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<GenerationResult>>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = GenerationResult>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_response(&self, response: GenerationResult) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        debug!("Scripted response for {:?} request", request.shape());
        next.unwrap_or_else(|| Err(GenerationError::Transport("no scripted response left".into())))
    }

    fn client_name(&self) -> &str {
        "ScriptedClient"
    }
}
