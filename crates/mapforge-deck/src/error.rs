/// Errors that can occur in the deck layer.
///
/// Gameplay-time races (drawing from a destroyed deck, discarding into one)
/// are deliberately *not* errors — they resolve as soft no-ops in the
/// manager. Errors here are operator mistakes: bad definition files and
/// duplicate names.
#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    /// A deck with this name already exists.
    #[error("a deck named {0:?} already exists")]
    AlreadyExists(String),

    /// The deck definition file could not be read.
    #[error("failed to read deck definition: {0}")]
    Io(#[from] std::io::Error),

    /// The deck definition file could not be parsed.
    #[error("failed to parse deck definition: {0}")]
    Parse(#[from] quick_xml::DeError),

    /// The definition parsed but defines no cards.
    #[error("deck definition contains no cards")]
    Empty,
}
