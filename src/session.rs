use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::{debug, info};

use crate::{
    Error, Transaction,
    connection::{Connection, Owner},
    protocol::{Request, Response, SessionKind, TransactionKind},
};

type Callback = Box<dyn FnOnce() + Send>;

/// A session against one database.
pub struct Session {
    connection: Connection,
    id: u64,
    database: String,
    kind: SessionKind,
    open: Arc<AtomicBool>,
    on_close: Vec<Callback>,
}

impl Session {
    pub(crate) fn open(connection: Connection, database: &str, kind: SessionKind) -> Result<Self, Error> {
        let request = Request::SessionOpen {
            database: database.to_string(),
            kind,
        };
        let id = match connection.unary(Owner::default(), request)? {
            Response::SessionOpened { session } => session,
            other => {
                return Err(Error::ProtocolViolation(format!(
                    "expected a session id, got {other:?}"
                )));
            }
        };

        info!("opened {kind:?} session {id} on '{database}'");
        Ok(Self {
            connection,
            id,
            database: database.to_string(),
            kind,
            open: Arc::new(AtomicBool::new(true)),
            on_close: Vec::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && self.connection.is_open()
    }

    pub fn transaction(&self, kind: TransactionKind) -> Result<Transaction, Error> {
        if !self.connection.is_open() {
            return Err(Error::ConnectionClosed);
        }
        if !self.open.load(Ordering::Acquire) {
            return Err(Error::SessionClosed);
        }

        Transaction::open(self.connection.clone(), self.id, Arc::clone(&self.open), kind)
    }

    /// Registers a callback run once when the session closes.
    pub fn on_close<F>(&mut self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_close.push(Box::new(callback));
    }

    /// Closes the session, failing whatever its transactions still have in
    /// flight, and waits for the server to acknowledge it. Safe to call more
    /// than once.
    pub fn close(&mut self) -> Result<(), Error> {
        self.shut(true)
    }

    fn shut(&mut self, wait: bool) -> Result<(), Error> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        self.connection.fail_session(self.id, Error::SessionClosed);
        for callback in self.on_close.drain(..) {
            callback();
        }

        if !self.connection.is_open() {
            return Ok(());
        }
        let request = Request::SessionClose { session: self.id };
        if !wait {
            return self.connection.post(Owner::default(), request);
        }
        match self.connection.unary(Owner::default(), request) {
            Ok(Response::Ok) | Err(Error::ConnectionClosed) => {
                debug!("session {} closed", self.id);
                Ok(())
            }
            Ok(other) => Err(Error::ProtocolViolation(format!(
                "expected an acknowledgement, got {other:?}"
            ))),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("database", &self.database)
            .field("kind", &self.kind)
            .field("open", &self.open)
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.shut(false) {
            debug!("failed to close session {}: {e}", self.id);
        }
    }
}
