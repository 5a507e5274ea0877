//! Client-server wire protocol.
//!
//! This module defines the frames exchanged between a sluice client and a database server,
//! and the codec used to move them over a byte stream.
//!
//! # Overview
//!
//! Every logical request (opening a session, committing a transaction, paging through the
//! answers of a query) travels on its own *lane*: a connection-local number chosen by the
//! client and echoed by the server on each response. Many lanes share one connection, so
//! responses of different requests may interleave freely, but a lane carries at most one
//! outstanding request at a time.
//!
//! Queries are paged. The first [`IterReq`] of a query carries the query payload; the server
//! answers with a batch of [`IterRes`] messages ending either in a continuation token
//! (`iterator_id != 0`) or a completion marker (`done`). The client resumes a paused query by
//! sending a continuation request with that token on the same lane.
//!
//! # Binary Format
//!
//! Frames are encoded with bincode using big-endian, fixed-width integers, the same
//! configuration on both directions. Query and answer payloads are opaque byte strings.
//!
//! # Key Components
//!
//! - [`ClientFrame`] / [`ServerFrame`]: lane-tagged envelopes.
//! - [`ResponseMessage`]: the decoded tag of one iterator response.
//! - [`ProtocolTransport`]: frame codec over any `Read` and/or `Write`.
mod request;
mod response;
mod transport;

pub use request::{
    BatchSize, ClientFrame, IterOptions, IterReq, Request, SessionKind, TransactionKind,
};
pub use response::{IterRes, Response, ResponseMessage, ServerFrame};
pub use transport::{MAX_FRAME_SIZE, ProtocolTransport, TransportError};
