use std::net::{SocketAddr, ToSocketAddrs};

use crate::{
    ClientOptions, Error, Session,
    connection::Connection,
    protocol::SessionKind,
};

/// Entry point: one client is one connection to the server, shared by every
/// session opened through it.
#[derive(Debug, Clone)]
pub struct Client {
    connection: Connection,
}

impl Client {
    pub fn connect<A: ToSocketAddrs>(addr: A, options: ClientOptions) -> Result<Self, Error> {
        let connection = Connection::connect(addr, &options)?;
        Ok(Self { connection })
    }

    pub fn session(&self, database: &str, kind: SessionKind) -> Result<Session, Error> {
        if !self.connection.is_open() {
            return Err(Error::ConnectionClosed);
        }
        Session::open(self.connection.clone(), database, kind)
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.connection.peer_addr()
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    /// Closes the connection; every session, transaction and query opened
    /// through this client fails with [`Error::ConnectionClosed`].
    pub fn close(&self) {
        self.connection.close();
    }
}
