//! Keyword-based language detection and localized assistant messages

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Fr,
    Es,
}

const FRENCH_WORDS: &[&str] = &[
    "le", "la", "les", "une", "des", "avec", "pour", "est", "et", "du", "sur", "dans",
    "couleur", "créer", "crée", "change", "changer", "ajoute", "ajouter", "supprime", "bouton",
    "titre", "texte", "taille", "rouge", "bleu", "vert", "fond", "moi", "s'il", "plus",
];

const SPANISH_WORDS: &[&str] = &[
    "el", "los", "las", "una", "con", "para", "es", "y", "del", "en", "por", "crea", "crear",
    "cambia", "cambiar", "añade", "agrega", "elimina", "botón", "boton", "título", "texto",
    "tamaño", "rojo", "azul", "verde", "fondo", "página", "pagina",
];

const ENGLISH_WORDS: &[&str] = &[
    "the", "a", "an", "with", "for", "is", "and", "of", "on", "in", "create", "make", "change",
    "add", "remove", "button", "title", "text", "size", "red", "blue", "green", "page",
];

impl Language {
    /// Guess the language of free text by counting function words.
    /// Ties and unknown text fall back to English.
    pub fn detect(text: &str) -> Self {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|w| !w.is_empty())
            .collect();

        let score = |vocabulary: &[&str]| words.iter().filter(|w| vocabulary.contains(w)).count();
        let en = score(ENGLISH_WORDS);
        let fr = score(FRENCH_WORDS);
        let es = score(SPANISH_WORDS);

        if fr > en && fr >= es && fr > 0 {
            Language::Fr
        } else if es > en && es > fr {
            Language::Es
        } else {
            Language::En
        }
    }
}

/// Assistant-facing outcomes that get a localized text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Message {
    CodeGenerated,
    CodeModified,
    Timeout,
    RateLimited,
    TooLarge,
    GenericError,
    NotConfigured,
    InvalidImage,
}

impl Message {
    pub fn for_generation_error(error: &GenerationError) -> Self {
        match error {
            GenerationError::Timeout { .. } => Message::Timeout,
            GenerationError::RateLimited => Message::RateLimited,
            GenerationError::RequestTooLarge => Message::TooLarge,
            GenerationError::NotConfigured => Message::NotConfigured,
            GenerationError::Remote { .. }
            | GenerationError::Transport(_)
            | GenerationError::Busy => Message::GenericError,
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Message::CodeGenerated | Message::CodeModified)
    }

    pub fn localize(&self, language: Language) -> &'static str {
        use Language::*;
        use Message::*;
        match (self, language) {
            (CodeGenerated, En) => "Here is your page! The preview has been updated.",
            (CodeGenerated, Fr) => "Voici votre page ! L'aperçu a été mis à jour.",
            (CodeGenerated, Es) => "¡Aquí está tu página! La vista previa se ha actualizado.",

            (CodeModified, En) => "Done! The changes have been applied to your page.",
            (CodeModified, Fr) => "C'est fait ! Les modifications ont été appliquées à votre page.",
            (CodeModified, Es) => "¡Listo! Los cambios se han aplicado a tu página.",

            (Timeout, En) => "The request took too long. Please try again.",
            (Timeout, Fr) => "La requête a pris trop de temps. Veuillez réessayer.",
            (Timeout, Es) => "La solicitud tardó demasiado. Por favor, inténtalo de nuevo.",

            (RateLimited, En) => "Too many requests. Please wait a moment and try again.",
            (RateLimited, Fr) => "Trop de requêtes. Veuillez patienter un instant puis réessayer.",
            (RateLimited, Es) => "Demasiadas solicitudes. Espera un momento e inténtalo de nuevo.",

            (TooLarge, En) => "Your request is too large. Please shorten it and try again.",
            (TooLarge, Fr) => "Votre requête est trop volumineuse. Veuillez la raccourcir.",
            (TooLarge, Es) => "Tu solicitud es demasiado grande. Por favor, acórtala.",

            (GenericError, En) => "Something went wrong while generating. Please try again.",
            (GenericError, Fr) => "Une erreur est survenue pendant la génération. Veuillez réessayer.",
            (GenericError, Es) => "Algo salió mal durante la generación. Inténtalo de nuevo.",

            (NotConfigured, En) => "Generation is unavailable: no API key is configured.",
            (NotConfigured, Fr) => "Génération indisponible : aucune clé API n'est configurée.",
            (NotConfigured, Es) => "Generación no disponible: no hay ninguna clave API configurada.",

            (InvalidImage, En) => "Only image files can be attached.",
            (InvalidImage, Fr) => "Seuls les fichiers image peuvent être joints.",
            (InvalidImage, Es) => "Solo se pueden adjuntar archivos de imagen.",
        }
    }
}
