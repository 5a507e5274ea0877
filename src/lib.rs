pub mod cli;
pub mod client;
pub mod connection;
pub mod error;
pub mod options;
pub mod protocol;
pub mod query;
pub mod session;
pub mod transaction;

pub use cli::{Command, prompt};
pub use client::Client;
pub use error::Error;
pub use options::{ClientOptions, QueryOptions};
pub use protocol::{BatchSize, SessionKind, TransactionKind};
pub use query::{
    Answer, AnswerStream, ExecuteFuture, IteratorState, PullIterator, QueryFuture, StreamFuture,
};
pub use session::Session;
pub use transaction::Transaction;
