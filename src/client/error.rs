use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vote request timed out")]
    Timeout,

    #[error("Server rejected request ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Thread {0} has not been loaded")]
    UnknownThread(Uuid),
}
