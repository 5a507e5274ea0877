//! Client and query configuration.
use std::time::Duration;

use crate::{
    Error,
    protocol::{BatchSize, IterOptions},
};

/// Per-query options. The batch size is fixed for the lifetime of the query
/// it is handed to; continuation requests repeat it unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    batch_size: BatchSize,
    infer: Option<bool>,
    explain: Option<bool>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a numeric batch size; sizes below one are rejected.
    pub fn batch_size(self, size: i64) -> Result<Self, Error> {
        if size < 1 {
            return Err(Error::InvalidConfiguration(format!(
                "batch size must be a positive integer, was {size}"
            )));
        }
        let size = u32::try_from(size).map_err(|_| {
            Error::InvalidConfiguration(format!("batch size {size} exceeds {}", u32::MAX))
        })?;

        Ok(Self {
            batch_size: BatchSize::Number(size),
            ..self
        })
    }

    /// Asks the server for the whole result set in one round trip.
    pub fn batch_size_all(self) -> Self {
        Self {
            batch_size: BatchSize::All,
            ..self
        }
    }

    pub fn infer(self, infer: bool) -> Self {
        Self {
            infer: Some(infer),
            ..self
        }
    }

    pub fn explain(self, explain: bool) -> Self {
        Self {
            explain: Some(explain),
            ..self
        }
    }

    pub fn get_batch_size(&self) -> BatchSize {
        self.batch_size
    }

    pub fn validate(&self) -> Result<(), Error> {
        match self.batch_size {
            BatchSize::Number(0) => Err(Error::InvalidConfiguration(
                "batch size must be a positive integer, was 0".into(),
            )),
            _ => Ok(()),
        }
    }
}

impl From<BatchSize> for QueryOptions {
    fn from(batch_size: BatchSize) -> Self {
        Self {
            batch_size,
            ..Default::default()
        }
    }
}

impl From<QueryOptions> for IterOptions {
    fn from(value: QueryOptions) -> Self {
        IterOptions {
            batch_size: value.batch_size,
            infer: value.infer,
            explain: value.explain,
        }
    }
}

/// Connection level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Frames that may wait for the writer before `send` starts blocking.
    pub outbound_capacity: usize,
    pub connect_timeout: Option<Duration>,
    /// Bound on single-response requests (session and transaction control).
    pub request_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            outbound_capacity: 64,
            connect_timeout: None,
            request_timeout: None,
        }
    }
}

impl ClientOptions {
    pub fn validate(&self) -> Result<(), Error> {
        if self.outbound_capacity == 0 {
            return Err(Error::InvalidConfiguration(
                "outbound capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
