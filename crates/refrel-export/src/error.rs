use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unknown export handler: {0}")]
    UnknownHandler(String),

    #[error("export handler {0} is already registered")]
    DuplicateHandler(String),

    #[error("{handler} cannot export {what}")]
    Unsupported { handler: String, what: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExportResult<T> = Result<T, ExportError>;
