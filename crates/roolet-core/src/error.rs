use std::path::PathBuf;

use thiserror::Error;

/// Stable numeric error codes shared with the broker.
///
/// Origin column in `spec.md` §6 documents which side is expected to raise
/// each code; the numbering itself is part of the wire contract and must
/// never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnswerErrorCode {
    InternalProblem,
    CommandFormatWrong,
    MethodParamsFormatWrong,
    MethodAuthFailed,
    AccessDenied,
    UnexpectedValue,
    RemoteMethodNotExists,
    AllServerBusy,
    IncorrectFormat,
    ResultTimeout,
    NoMethod,
    ExecError,
    FormatError,
}

impl AnswerErrorCode {
    pub fn code(self) -> i64 {
        match self {
            AnswerErrorCode::InternalProblem => 1,
            AnswerErrorCode::CommandFormatWrong => 2,
            AnswerErrorCode::MethodParamsFormatWrong => 3,
            AnswerErrorCode::MethodAuthFailed => 4,
            AnswerErrorCode::AccessDenied => 5,
            AnswerErrorCode::UnexpectedValue => 6,
            AnswerErrorCode::RemoteMethodNotExists => 7,
            AnswerErrorCode::AllServerBusy => 8,
            AnswerErrorCode::IncorrectFormat => 100,
            AnswerErrorCode::ResultTimeout => 101,
            AnswerErrorCode::NoMethod => 102,
            AnswerErrorCode::ExecError => 103,
            AnswerErrorCode::FormatError => 104,
        }
    }

    /// Reverses `code()`. Unknown codes decode to `None` rather than panicking,
    /// since a peer on a newer protocol revision may send a code we don't know.
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            1 => AnswerErrorCode::InternalProblem,
            2 => AnswerErrorCode::CommandFormatWrong,
            3 => AnswerErrorCode::MethodParamsFormatWrong,
            4 => AnswerErrorCode::MethodAuthFailed,
            5 => AnswerErrorCode::AccessDenied,
            6 => AnswerErrorCode::UnexpectedValue,
            7 => AnswerErrorCode::RemoteMethodNotExists,
            8 => AnswerErrorCode::AllServerBusy,
            100 => AnswerErrorCode::IncorrectFormat,
            101 => AnswerErrorCode::ResultTimeout,
            102 => AnswerErrorCode::NoMethod,
            103 => AnswerErrorCode::ExecError,
            104 => AnswerErrorCode::FormatError,
            _ => return None,
        })
    }
}

/// A failed `Answer`'s `error` payload: `{code, message}` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerError {
    pub code: AnswerErrorCode,
    pub message: String,
}

impl AnswerError {
    pub fn new(code: AnswerErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AnswerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "answer error {}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for AnswerError {}

/// Fatal/startup and recoverable/runtime errors (`spec.md` §7 tiers 1 and 2).
///
/// Per-task failures (tier 3) never surface as `RooletError` — they become a
/// failed `Answer` carried by [`AnswerError`] instead, so the engine stays
/// Active.
#[derive(Debug, Error)]
pub enum RooletError {
    #[error("failed to read configuration from `{path}`: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration as JSON: {0}")]
    ConfigParse(#[source] serde_json::Error),
    #[error("environment variable `{0}` is not set and no inline configuration was supplied")]
    ConfigEnvMissing(&'static str),

    #[error("could not read private key `{path}`: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("signing algorithm `{0}` is not supported")]
    UnsupportedAlgorithm(String),
    #[error("failed to sign authentication token: {0}")]
    TokenSign(#[source] jsonwebtoken::errors::Error),

    #[error("connection refused at {addr}:{port}")]
    ConnectionRefused { addr: String, port: u16 },
    #[error("socket I/O error: {0}")]
    Io(#[source] std::io::Error),
    #[error("frame decode error: {0}")]
    FrameDecode(#[source] serde_json::Error),

    #[error("authentication was refused by the broker")]
    AuthRefused,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("broker returned an error during the handshake: {0}")]
    Handshake(#[source] AnswerError),

    #[error("no public methods are registered; a service worker must expose at least one")]
    EmptyRegistry,
    #[error("worker count {0} is out of the allowed range 1..=1024")]
    InvalidWorkerCount(usize),
}
