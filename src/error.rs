use thiserror::Error;

/// Every failure kind named in the error-handling design, as one tagged enum.
///
/// Call sites match on variant, not on message text; the `Display` impl
/// (derived by `thiserror`) produces the user-facing message printed at the
/// prompt.
#[derive(Debug, Error)]
pub enum ZishError {
    #[error("input too long")]
    InputTooLong,

    #[error("token too long")]
    TokenTooLong,

    #[error("string too long")]
    StringTooLong,

    #[error("expansion too long")]
    ExpansionTooLong,

    #[error("unterminated string")]
    UnterminatedString,

    #[error("unterminated parameter expansion")]
    UnterminatedParameterExpansion,

    #[error("unterminated command substitution")]
    UnterminatedCommandSubstitution,

    #[error("expansion recursion limit exceeded")]
    RecursionLimitExceeded,

    #[error("parse error at {line}:{col}: {kind}")]
    ParseError {
        line: usize,
        col: usize,
        kind: String,
    },

    #[error("zish: {name}: command not found")]
    CommandNotFound { name: String },

    #[error("{message}")]
    ParameterNotSet { message: String },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("history pool full")]
    PoolFull,

    #[error("command too long")]
    CommandTooLong,

    #[error("unsafe command")]
    UnsafeCommand,

    #[error("<loop>: iteration limit reached")]
    IterationLimit,

    #[error("function call recursion limit exceeded")]
    CallDepthExceeded,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid utf-8")]
    Utf8,

    #[error("{0}")]
    Other(String),
}

pub type ZishResult<T> = Result<T, ZishError>;
