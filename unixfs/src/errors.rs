use cid::Cid;
use thiserror::Error;

use crate::node::NodeKind;

/// Errors produced while building, reading or archiving UnixFS DAGs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("i/o error: {0}")]
    Io(std::io::Error),

    #[error("internal storage error: {0}")]
    StorageError(String),

    #[error("block {0} not found")]
    BlockNotFound(Cid),

    #[error("corrupt data in {cid}: {reason}")]
    CorruptData { cid: Cid, reason: String },

    #[error("unrecognized unixfs node type {data_type} in {cid}")]
    UnrecognizedType { cid: Cid, data_type: i32 },

    #[error("unsupported codec {:#x} in {0}", .0.codec())]
    UnsupportedCodec(Cid),

    #[error("leaf of {0} bytes exceeds the block size limit")]
    BlockSizeLimitExceeded(usize),

    #[error("{cid} is a {kind}, not a file")]
    NotAFile { cid: Cid, kind: NodeKind },

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn corrupt(cid: &Cid, reason: impl Into<String>) -> Self {
        Error::CorruptData {
            cid: *cid,
            reason: reason.into(),
        }
    }

    /// Whether the error stems from data that failed validation, as opposed
    /// to a transient I/O or storage failure.
    pub fn is_corrupt_data(&self) -> bool {
        matches!(
            self,
            Error::CorruptData { .. }
                | Error::UnrecognizedType { .. }
                | Error::UnsupportedCodec(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        // Our own errors travel through AsyncRead wrapped in an io::Error,
        // unwrap them again so callers can still match on them.
        if value.get_ref().is_some_and(|e| e.is::<Error>()) {
            match value.into_inner().map(|e| e.downcast::<Error>()) {
                Some(Ok(e)) => *e,
                _ => unreachable!("inner error was checked to be an Error"),
            }
        } else {
            Error::Io(value)
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        use std::io::ErrorKind;

        let kind = match &value {
            Error::Io(e) => e.kind(),
            Error::InvalidConfig(_) | Error::InvalidRequest(_) => ErrorKind::InvalidInput,
            Error::BlockNotFound(_) => ErrorKind::NotFound,
            Error::Cancelled => ErrorKind::Interrupted,
            Error::NotAFile { .. } => ErrorKind::Unsupported,
            Error::StorageError(_) => ErrorKind::Other,
            Error::CorruptData { .. }
            | Error::UnrecognizedType { .. }
            | Error::UnsupportedCodec(_)
            | Error::BlockSizeLimitExceeded(_) => ErrorKind::InvalidData,
        };

        std::io::Error::new(kind, value)
    }
}
