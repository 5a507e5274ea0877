use bincode::{Decode, Encode};

/// Raw iterator response as it travels on the wire. Exactly one of the three
/// fields is expected to be set.
#[derive(Debug, Clone, Default, Encode, Decode, PartialEq, Eq)]
pub struct IterRes {
    pub iterator_id: u64,
    pub done: bool,
    pub answer: Option<Vec<u8>>,
}

impl IterRes {
    pub fn answer(answer: Vec<u8>) -> Self {
        Self {
            answer: Some(answer),
            ..Default::default()
        }
    }

    pub fn continuation(iterator_id: u64) -> Self {
        Self {
            iterator_id,
            ..Default::default()
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            ..Default::default()
        }
    }

    /// Whether this message closes the current batch.
    pub fn is_last(&self) -> bool {
        !(self.iterator_id == 0 && !self.done && self.answer.is_some())
    }
}

/// One decoded message of an iterator batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseMessage {
    Data(Vec<u8>),
    Continuation(u64),
    Completion,
    Malformed,
}

impl From<IterRes> for ResponseMessage {
    fn from(value: IterRes) -> Self {
        match (value.iterator_id, value.done, value.answer) {
            (0, false, Some(answer)) => ResponseMessage::Data(answer),
            (0, true, None) => ResponseMessage::Completion,
            (0, _, _) => ResponseMessage::Malformed,
            (id, false, None) => ResponseMessage::Continuation(id),
            _ => ResponseMessage::Malformed,
        }
    }
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub enum Response {
    SessionOpened { session: u64 },
    TransactionOpened { transaction: u64 },
    Ok,
    Iter(IterRes),
    Err { description: String },
}

impl Response {
    /// Whether this message ends the wave of its lane. Everything except a
    /// data-carrying iterator response is terminal.
    pub fn is_terminal(&self) -> bool {
        match self {
            Response::Iter(res) => res.is_last(),
            _ => true,
        }
    }
}

/// Inbound frame, echoing the lane of the request it answers.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct ServerFrame {
    pub lane: u64,
    pub response: Response,
}
