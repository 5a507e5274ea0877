//! Pull-based access to paged query results.
//!
//! A query's answers arrive in batches. The server sizes each batch from the query's
//! [`BatchSize`](crate::BatchSize) and ends it either with a continuation token (more to come)
//! or a completion marker. [`PullIterator`] hides the batching: it hands out answers one at a
//! time and asks for the next batch only when the current one has been consumed.
//!
//! [`ExecuteFuture`] and [`StreamFuture`] wrap an iterator for callers that want, respectively,
//! every answer at once or one at a time. Both can wait for the first batch with or without a
//! bound.
//!
//! # Example
//! ```no_run
//! use sluice::{Client, ClientOptions, QueryOptions, SessionKind, TransactionKind};
//!
//! let client = Client::connect("127.0.0.1:1729", ClientOptions::default()).unwrap();
//! let session = client.session("social", SessionKind::Data).unwrap();
//! let tx = session.transaction(TransactionKind::Read).unwrap();
//!
//! let options = QueryOptions::new().batch_size(100).unwrap();
//! let mut names = tx.stream::<String>("match $p isa person;", options).unwrap();
//! for name in names.get().unwrap() {
//!     println!("{}", name.unwrap());
//! }
//! ```
mod future;
mod iterator;

use crate::Error;

pub use future::{AnswerStream, ExecuteFuture, QueryFuture, StreamFuture};
pub use iterator::{IteratorState, PullIterator};
pub(crate) use iterator::Reader;

/// Decodes one answer payload into a typed value.
pub trait Answer: Sized {
    fn read(payload: Vec<u8>) -> Result<Self, Error>;
}

impl Answer for Vec<u8> {
    fn read(payload: Vec<u8>) -> Result<Self, Error> {
        Ok(payload)
    }
}

impl Answer for String {
    fn read(payload: Vec<u8>) -> Result<Self, Error> {
        String::from_utf8(payload).map_err(|e| Error::Decode(e.to_string()))
    }
}
