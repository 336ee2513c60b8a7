use std::{error::Error, fmt::Display, sync::mpsc};

#[derive(Debug)]
pub enum GhostGuiError {
    IOError(std::io::Error),
    MPSCSendError,
    MPSCRecvError(mpsc::RecvError),
    JoinError,
}

impl Display for GhostGuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IOError(e) => write!(f, "terminal i/o failed: {e}"),
            Self::MPSCSendError => write!(f, "worker thread hung up"),
            Self::MPSCRecvError(e) => write!(f, "worker thread hung up: {e}"),
            Self::JoinError => write!(f, "worker thread panicked"),
        }
    }
}

impl Error for GhostGuiError {}

impl From<std::io::Error> for GhostGuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl<T> From<mpsc::SendError<T>> for GhostGuiError {
    fn from(_: mpsc::SendError<T>) -> Self {
        Self::MPSCSendError
    }
}

impl From<mpsc::RecvError> for GhostGuiError {
    fn from(value: mpsc::RecvError) -> Self {
        Self::MPSCRecvError(value)
    }
}
