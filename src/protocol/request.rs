use bincode::{Decode, Encode};

/// Number of answers the server may place in one batch.
#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub enum BatchSize {
    /// Up to this many answers per round trip.
    Number(u32),
    /// The whole result set in a single round trip.
    All,
}

impl Default for BatchSize {
    fn default() -> Self {
        BatchSize::Number(50)
    }
}

#[derive(Debug, Clone, Copy, Default, Encode, Decode, PartialEq, Eq)]
pub enum SessionKind {
    #[default]
    Data,
    Schema,
}

#[derive(Debug, Clone, Copy, Default, Encode, Decode, PartialEq, Eq)]
pub enum TransactionKind {
    #[default]
    Read,
    Write,
}

/// Options travelling with every iterator request of a query.
#[derive(Debug, Clone, Copy, Default, Encode, Decode, PartialEq, Eq)]
pub struct IterOptions {
    pub batch_size: BatchSize,
    pub infer: Option<bool>,
    pub explain: Option<bool>,
}

/// Iterator request. The first request of a query carries the query payload
/// and a zero `iterator_id`; continuations carry the server-issued token and
/// no payload.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct IterReq {
    pub iterator_id: u64,
    pub options: IterOptions,
    pub query: Option<Vec<u8>>,
}

impl IterReq {
    pub fn query(query: Vec<u8>, options: IterOptions) -> Self {
        Self {
            iterator_id: 0,
            options,
            query: Some(query),
        }
    }

    pub fn continuation(iterator_id: u64, options: IterOptions) -> Self {
        Self {
            iterator_id,
            options,
            query: None,
        }
    }
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub enum Request {
    SessionOpen {
        database: String,
        kind: SessionKind,
    },
    SessionClose {
        session: u64,
    },
    TransactionOpen {
        session: u64,
        kind: TransactionKind,
    },
    TransactionCommit {
        transaction: u64,
    },
    TransactionRollback {
        transaction: u64,
    },
    TransactionClose {
        transaction: u64,
    },
    Iter {
        transaction: u64,
        req: IterReq,
    },
}

/// Outbound frame; `lane` identifies the logical request the message belongs to.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct ClientFrame {
    pub lane: u64,
    pub request: Request,
}
