use thiserror::Error;

/// Canonical result for the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid topology: {0}")]
    Topology(String),

    // A kernel's parameter types did not match the data stored on a
    // component or link end.
    #[error("data type mismatch: {0}")]
    DataType(String),

    #[error("no such entity: {0}")]
    Missing(String),

    #[error("scheduler is shutting down")]
    Shutdown,

    // The engine itself does no I/O; callers writing reports or traces may
    // map their errors into this variant.
    #[error("i/o: {0}")]
    Io(String),

    #[error("internal invariant failed: {0}")]
    Invariant(String),
}
