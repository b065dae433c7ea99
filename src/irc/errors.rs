use thiserror::Error;

/// IRC接続まわりのエラー
#[derive(Debug, Error)]
pub enum IrcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("connect has not been called or already stopped")]
    NotConnected,
}
