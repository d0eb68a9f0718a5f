#![forbid(unsafe_code)]

pub mod commands;
pub mod error;
pub mod progress_engine;

pub use practice_core::Clock;

pub use commands::{CommandResponse, ProgressCommand, dispatch, dispatch_json, try_dispatch};
pub use error::{ErrorKind, InputError, ProgressError};
pub use progress_engine::{AnswerResult, InitOutcome, ProgressEngine};
