use thiserror::Error;

/// Unified result type for the tessera crate.
pub type Result<T> = std::result::Result<T, UiError>;

/// Errors surfaced by the grid engine.
#[derive(Debug, Error)]
pub enum UiError {
    #[error("no supported container shape fits rows of width {width}")]
    UnsupportedLayout { width: usize },
    #[error("slot {slot} is outside the grid (length {len})")]
    SlotOutOfRange { slot: usize, len: usize },
    #[error("content node is already bound to a grid")]
    BindingConflict,
    #[error("action failed: {0}")]
    ActionFailure(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
