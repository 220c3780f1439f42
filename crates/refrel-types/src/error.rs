use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid effective time: {0}")]
    InvalidEffectiveTime(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
