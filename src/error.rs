use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::messaging::bus::BusError;
use crate::messaging::fanout::FanoutError;
use crate::messaging::messenger::MessengerError;
use crate::runner::RunnerError;
use crate::timeout::TimeoutError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Messenger error: {0}")]
    Messenger(#[from] MessengerError),
    #[error("Fanout error: {0}")]
    Fanout(#[from] FanoutError),
    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
    #[error("{0}")]
    Timeout(#[from] TimeoutError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type FrameResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
