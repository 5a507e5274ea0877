use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::{debug, info};

use crate::{
    Error, QueryOptions,
    connection::{Connection, Owner},
    protocol::{Request, Response, TransactionKind},
    query::{Answer, ExecuteFuture, PullIterator, Reader, StreamFuture},
};

/// A transaction inside a session. Every query runs on its own lane of the
/// shared connection; closing the transaction fails the ones still running.
#[derive(Debug)]
pub struct Transaction {
    connection: Connection,
    session: u64,
    session_open: Arc<AtomicBool>,
    id: u64,
    kind: TransactionKind,
    open: bool,
}

impl Transaction {
    pub(crate) fn open(
        connection: Connection,
        session: u64,
        session_open: Arc<AtomicBool>,
        kind: TransactionKind,
    ) -> Result<Self, Error> {
        let owner = Owner {
            session: Some(session),
            transaction: None,
        };
        let id = match connection.unary(owner, Request::TransactionOpen { session, kind })? {
            Response::TransactionOpened { transaction } => transaction,
            other => {
                return Err(Error::ProtocolViolation(format!(
                    "expected a transaction id, got {other:?}"
                )));
            }
        };

        debug!("opened {kind:?} transaction {id} in session {session}");
        Ok(Self {
            connection,
            session,
            session_open,
            id,
            kind,
            open: true,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.ensure_open().is_ok()
    }

    /// Runs a query and collects every answer.
    pub fn execute<T: Answer + 'static>(
        &self,
        query: impl Into<Vec<u8>>,
        options: QueryOptions,
    ) -> Result<ExecuteFuture<T>, Error> {
        self.execute_with(query, options, T::read)
    }

    pub fn execute_with<T, F>(
        &self,
        query: impl Into<Vec<u8>>,
        options: QueryOptions,
        reader: F,
    ) -> Result<ExecuteFuture<T>, Error>
    where
        F: FnMut(Vec<u8>) -> Result<T, Error> + Send + 'static,
    {
        let iterator = self.iterate(query.into(), options, Box::new(reader))?;
        Ok(ExecuteFuture::new(iterator))
    }

    /// Runs a query whose answers are pulled lazily.
    pub fn stream<T: Answer + 'static>(
        &self,
        query: impl Into<Vec<u8>>,
        options: QueryOptions,
    ) -> Result<StreamFuture<T>, Error> {
        self.stream_with(query, options, T::read)
    }

    pub fn stream_with<T, F>(
        &self,
        query: impl Into<Vec<u8>>,
        options: QueryOptions,
        reader: F,
    ) -> Result<StreamFuture<T>, Error>
    where
        F: FnMut(Vec<u8>) -> Result<T, Error> + Send + 'static,
    {
        let iterator = self.iterate(query.into(), options, Box::new(reader))?;
        Ok(StreamFuture::new(iterator))
    }

    fn iterate<T>(
        &self,
        query: Vec<u8>,
        options: QueryOptions,
        reader: Reader<T>,
    ) -> Result<PullIterator<T>, Error> {
        options.validate()?;
        self.ensure_open()?;

        PullIterator::open(
            self.connection.clone(),
            self.owner(),
            self.id,
            query,
            options.into(),
            reader,
        )
    }

    /// Commits and closes the transaction.
    pub fn commit(&mut self) -> Result<(), Error> {
        self.ensure_open()?;

        let response = self.connection.unary(
            self.owner(),
            Request::TransactionCommit {
                transaction: self.id,
            },
        );
        self.finish();
        expect_ok(response?)?;

        info!("transaction {} committed", self.id);
        Ok(())
    }

    /// Discards uncommitted writes; the transaction stays open.
    pub fn rollback(&mut self) -> Result<(), Error> {
        self.ensure_open()?;

        let response = self.connection.unary(
            self.owner(),
            Request::TransactionRollback {
                transaction: self.id,
            },
        )?;
        expect_ok(response)?;

        debug!("transaction {} rolled back", self.id);
        Ok(())
    }

    /// Closes the transaction and waits for the server to acknowledge it;
    /// safe to call more than once.
    pub fn close(&mut self) -> Result<(), Error> {
        self.shut(true)
    }

    fn shut(&mut self, wait: bool) -> Result<(), Error> {
        if !self.open {
            return Ok(());
        }
        self.finish();

        if !self.session_open.load(Ordering::Acquire) || !self.connection.is_open() {
            return Ok(());
        }
        let owner = Owner {
            session: Some(self.session),
            transaction: None,
        };
        let request = Request::TransactionClose {
            transaction: self.id,
        };
        if !wait {
            return self.connection.post(owner, request);
        }
        match self.connection.unary(owner, request) {
            Ok(response) => expect_ok(response),
            Err(Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn finish(&mut self) {
        self.open = false;
        self.connection
            .fail_transaction(self.id, Error::TransactionClosed);
    }

    fn owner(&self) -> Owner {
        Owner {
            session: Some(self.session),
            transaction: Some(self.id),
        }
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if !self.connection.is_open() {
            Err(Error::ConnectionClosed)
        } else if !self.session_open.load(Ordering::Acquire) {
            Err(Error::SessionClosed)
        } else if !self.open {
            Err(Error::TransactionClosed)
        } else {
            Ok(())
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Err(e) = self.shut(false) {
            debug!("failed to close transaction {}: {e}", self.id);
        }
    }
}

fn expect_ok(response: Response) -> Result<(), Error> {
    match response {
        Response::Ok => Ok(()),
        other => Err(Error::ProtocolViolation(format!(
            "expected an acknowledgement, got {other:?}"
        ))),
    }
}
