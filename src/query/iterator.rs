use std::{fmt, time::Duration};

use log::{debug, trace};

use crate::{
    Error,
    connection::{Collector, Connection, Lane, Owner},
    protocol::{IterOptions, IterReq, Request, Response, ResponseMessage},
};

pub(crate) type Reader<T> = Box<dyn FnMut(Vec<u8>) -> Result<T, Error> + Send>;

/// Where an iterator stands in its query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IteratorState {
    /// Nothing received yet.
    Pending,
    /// Handing out answers of the current batch.
    Streaming,
    /// A continuation request is in flight.
    Continuing,
    /// The server reported completion.
    Exhausted,
    /// The query failed for good; the error is reported on every pull.
    Failed(Error),
}

/// One-pass, forward-only sequence over the answers of a single query.
///
/// The query request is sent when the iterator is created. Answers are pulled
/// from the current batch; once a batch ends in a continuation token the
/// iterator asks the server for the next one with the same batch size and
/// blocks until it starts arriving. Pulling needs `&mut self`, so a given
/// iterator has exactly one consumer at a time.
pub struct PullIterator<T> {
    connection: Connection,
    lane: Lane,
    transaction: u64,
    options: IterOptions,
    collector: Collector,
    first: Option<Response>,
    state: IteratorState,
    batch_sizes: Vec<usize>,
    in_batch: usize,
    fused: bool,
    reader: Reader<T>,
}

impl<T> PullIterator<T> {
    pub(crate) fn open(
        connection: Connection,
        owner: Owner,
        transaction: u64,
        query: Vec<u8>,
        options: IterOptions,
        reader: Reader<T>,
    ) -> Result<Self, Error> {
        let lane = connection.open_lane(owner);
        let collector = connection.dispatch(
            &lane,
            Request::Iter {
                transaction,
                req: IterReq::query(query, options),
            },
        )?;
        debug!(
            "query opened on lane {} with batch size {:?}",
            lane.id(),
            options.batch_size
        );

        Ok(Self {
            connection,
            lane,
            transaction,
            options,
            collector,
            first: None,
            state: IteratorState::Pending,
            batch_sizes: Vec::new(),
            in_batch: 0,
            fused: false,
            reader,
        })
    }

    pub fn state(&self) -> &IteratorState {
        &self.state
    }

    /// Whether the server has started answering. Only looks, never waits.
    pub fn is_started(&self) -> bool {
        self.state != IteratorState::Pending || self.collector.has_arrived()
    }

    /// Answer counts of every batch received in full so far.
    pub fn batch_sizes(&self) -> &[usize] {
        &self.batch_sizes
    }

    /// Blocks until the first message arrives, or until `timeout` elapses.
    ///
    /// A timeout changes nothing: the query stays outstanding on the server
    /// and waiting can simply be retried.
    pub fn wait_for_start(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        match &self.state {
            IteratorState::Pending => {}
            IteratorState::Failed(e) => return Err(e.clone()),
            _ => return Ok(()),
        }

        let response = match timeout {
            Some(timeout) => self.collector.poll(timeout),
            None => self.collector.take(),
        };
        match response {
            Ok(response) => {
                self.first = Some(response);
                self.state = IteratorState::Streaming;
                Ok(())
            }
            Err(Error::Timeout) => Err(Error::Timeout),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Pulls the next answer, `Ok(None)` once the query is exhausted.
    ///
    /// A failure to decode one answer is returned without ending the
    /// iteration; transport, server and protocol failures are permanent.
    pub fn next_answer(&mut self) -> Result<Option<T>, Error> {
        loop {
            match &self.state {
                IteratorState::Exhausted => return Ok(None),
                IteratorState::Failed(e) => return Err(e.clone()),
                _ => {}
            }

            let response = match self.first.take() {
                Some(response) => response,
                None => match self.collector.take() {
                    Ok(response) => response,
                    Err(e) => return Err(self.fail(e)),
                },
            };
            self.state = IteratorState::Streaming;

            let message = match response {
                Response::Iter(res) => ResponseMessage::from(res),
                Response::Err { description } => return Err(self.fail(Error::Server(description))),
                other => {
                    return Err(self.fail(Error::ProtocolViolation(format!(
                        "unexpected response to an iterator request: {other:?}"
                    ))));
                }
            };

            match message {
                ResponseMessage::Data(payload) => {
                    self.in_batch += 1;
                    return (self.reader)(payload).map(Some);
                }
                ResponseMessage::Continuation(token) => {
                    self.end_batch();
                    self.resume(token)?;
                }
                ResponseMessage::Completion => {
                    self.end_batch();
                    self.state = IteratorState::Exhausted;
                    debug!(
                        "lane {} exhausted after {} batch(es)",
                        self.lane.id(),
                        self.batch_sizes.len()
                    );
                    return Ok(None);
                }
                ResponseMessage::Malformed => {
                    return Err(self.fail(Error::ProtocolViolation(
                        "iterator response carries neither exactly one answer, continuation or completion"
                            .into(),
                    )));
                }
            }
        }
    }

    fn end_batch(&mut self) {
        trace!(
            "lane {} batch {} closed with {} answer(s)",
            self.lane.id(),
            self.batch_sizes.len() + 1,
            self.in_batch
        );
        self.batch_sizes.push(self.in_batch);
        self.in_batch = 0;
    }

    fn resume(&mut self, token: u64) -> Result<(), Error> {
        self.state = IteratorState::Continuing;

        let request = Request::Iter {
            transaction: self.transaction,
            req: IterReq::continuation(token, self.options),
        };
        match self.connection.dispatch(&self.lane, request) {
            Ok(collector) => {
                self.collector = collector;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        debug!("query on lane {} failed: {err}", self.lane.id());
        self.state = IteratorState::Failed(err.clone());
        err
    }
}

impl<T> Iterator for PullIterator<T> {
    type Item = Result<T, Error>;

    /// Yields answers until completion. A permanent failure is yielded once,
    /// after which the iterator is fused.
    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }

        match self.next_answer() {
            Ok(Some(answer)) => Some(Ok(answer)),
            Ok(None) => None,
            Err(e) => {
                if matches!(self.state, IteratorState::Failed(_)) {
                    self.fused = true;
                }
                Some(Err(e))
            }
        }
    }
}

impl<T> fmt::Debug for PullIterator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PullIterator")
            .field("lane", &self.lane.id())
            .field("transaction", &self.transaction)
            .field("options", &self.options)
            .field("state", &self.state)
            .field("batch_sizes", &self.batch_sizes)
            .finish()
    }
}

impl<T> Drop for PullIterator<T> {
    fn drop(&mut self) {
        if matches!(
            self.state,
            IteratorState::Pending | IteratorState::Streaming | IteratorState::Continuing
        ) {
            // Nothing tells the server to stop; the query runs to completion there.
            debug!(
                "query on lane {} abandoned in state {:?}",
                self.lane.id(),
                self.state
            );
        }
    }
}
