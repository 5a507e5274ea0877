use std::time::Duration;

use crate::Error;

use super::PullIterator;

/// Caller-facing handle on a query whose answers are still on their way.
///
/// A query cannot be cancelled once sent: it runs to completion on the server
/// or until the connection, session or transaction goes away.
pub trait QueryFuture {
    type Answer;

    fn iterator(&self) -> &PullIterator<Self::Answer>;

    /// Whether the server has started answering, not whether every answer
    /// has arrived. Calling it has no effect on the query.
    fn is_done(&self) -> bool {
        self.iterator().is_started()
    }

    fn cancel(&self) -> bool {
        false
    }

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Materializes every answer into a `Vec`.
#[derive(Debug)]
pub struct ExecuteFuture<T> {
    iterator: PullIterator<T>,
}

impl<T> ExecuteFuture<T> {
    pub(crate) fn new(iterator: PullIterator<T>) -> Self {
        Self { iterator }
    }

    /// Waits for the first batch, then drains the whole query. Answers are
    /// handed out once; a later call returns what is left, which is nothing.
    pub fn get(&mut self) -> Result<Vec<T>, Error> {
        self.iterator.wait_for_start(None)?;
        self.drain()
    }

    /// Like [`ExecuteFuture::get`] but gives up with [`Error::Timeout`] if the
    /// first batch does not start arriving within `timeout`. The query stays
    /// outstanding and `get` may be called again.
    pub fn get_timeout(&mut self, timeout: Duration) -> Result<Vec<T>, Error> {
        self.iterator.wait_for_start(Some(timeout))?;
        self.drain()
    }

    fn drain(&mut self) -> Result<Vec<T>, Error> {
        let mut answers = Vec::new();
        while let Some(answer) = self.iterator.next_answer()? {
            answers.push(answer);
        }
        Ok(answers)
    }
}

impl<T> QueryFuture for ExecuteFuture<T> {
    type Answer = T;

    fn iterator(&self) -> &PullIterator<T> {
        &self.iterator
    }
}

/// Exposes the answers lazily; every pull may block on the network.
#[derive(Debug)]
pub struct StreamFuture<T> {
    iterator: PullIterator<T>,
}

impl<T> StreamFuture<T> {
    pub(crate) fn new(iterator: PullIterator<T>) -> Self {
        Self { iterator }
    }

    pub fn get(&mut self) -> Result<AnswerStream<'_, T>, Error> {
        self.iterator.wait_for_start(None)?;
        Ok(AnswerStream {
            iterator: &mut self.iterator,
        })
    }

    pub fn get_timeout(&mut self, timeout: Duration) -> Result<AnswerStream<'_, T>, Error> {
        self.iterator.wait_for_start(Some(timeout))?;
        Ok(AnswerStream {
            iterator: &mut self.iterator,
        })
    }

    /// Produces the next answer, or `None` at the end of the query.
    pub fn next_answer(&mut self) -> Result<Option<T>, Error> {
        self.iterator.next_answer()
    }
}

impl<T> QueryFuture for StreamFuture<T> {
    type Answer = T;

    fn iterator(&self) -> &PullIterator<T> {
        &self.iterator
    }
}

impl<T> IntoIterator for StreamFuture<T> {
    type Item = Result<T, Error>;
    type IntoIter = PullIterator<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iterator
    }
}

/// Borrowed view of a started stream.
#[derive(Debug)]
pub struct AnswerStream<'a, T> {
    iterator: &'a mut PullIterator<T>,
}

impl<T> Iterator for AnswerStream<'_, T> {
    type Item = Result<T, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iterator.next()
    }
}
