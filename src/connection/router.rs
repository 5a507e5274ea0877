use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Sender},
    },
};

use log::{debug, trace, warn};

use crate::{
    Error,
    protocol::{Response, ServerFrame},
};

use super::collector::{Collector, Delivery};

/// Session and transaction a lane belongs to, used to fail a group of
/// requests at once when their owner goes away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Owner {
    pub session: Option<u64>,
    pub transaction: Option<u64>,
}

#[derive(Debug)]
struct Slot {
    owner: Owner,
    sender: Sender<Delivery>,
    arrived: Arc<AtomicBool>,
    abandoned: bool,
}

/// Hands inbound frames to the collector waiting on their lane.
///
/// A lane has at most one live slot: the collector of its single outstanding
/// request. The slot is released once a terminal message has been routed, and
/// the next wave of the same lane must register again.
#[derive(Debug, Default)]
pub struct ResponseRouter {
    slots: HashMap<u64, Slot>,
    closed: bool,
}

impl ResponseRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, lane: u64, owner: Owner) -> Result<Collector, Error> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        let (sender, receiver) = mpsc::channel();
        let arrived = Arc::new(AtomicBool::new(false));
        let slot = Slot {
            owner,
            sender,
            arrived: Arc::clone(&arrived),
            abandoned: false,
        };
        if self.slots.insert(lane, slot).is_some() {
            warn!("lane {lane} registered while a request was still outstanding");
        }

        trace!("registered collector for lane {lane}");
        Ok(Collector::new(receiver, arrived))
    }

    /// Drops the slot of a request that never made it onto the wire.
    pub fn withdraw(&mut self, lane: u64) {
        self.slots.remove(&lane);
    }

    pub fn route(&mut self, frame: ServerFrame) {
        let ServerFrame { lane, response } = frame;
        let terminal = response.is_terminal();

        let Some(slot) = self.slots.get_mut(&lane) else {
            warn!("protocol warning: dropping response for lane {lane} with no pending request: {response:?}");
            return;
        };

        slot.arrived.store(true, Ordering::Release);
        if !slot.abandoned && slot.sender.send(Ok(response)).is_err() {
            debug!("lane {lane} was abandoned by its consumer");
            slot.abandoned = true;
        }

        if terminal {
            trace!("lane {lane} reached the end of its batch");
            self.slots.remove(&lane);
        }
    }

    /// Fails every pending request matching `predicate`, returning how many
    /// were failed.
    fn fail_where<P>(&mut self, predicate: P, err: &Error) -> usize
    where
        P: Fn(&Owner) -> bool,
    {
        let lanes: Vec<u64> = self
            .slots
            .iter()
            .filter(|(_, slot)| predicate(&slot.owner))
            .map(|(lane, _)| *lane)
            .collect();

        for lane in &lanes {
            if let Some(slot) = self.slots.remove(lane) {
                slot.arrived.store(true, Ordering::Release);
                let _ = slot.sender.send(Err(err.clone()));
            }
        }
        lanes.len()
    }

    pub fn fail_transaction(&mut self, transaction: u64, err: Error) -> usize {
        self.fail_where(|owner| owner.transaction == Some(transaction), &err)
    }

    pub fn fail_session(&mut self, session: u64, err: Error) -> usize {
        self.fail_where(|owner| owner.session == Some(session), &err)
    }

    /// Fails everything still pending and refuses later registrations.
    pub fn close(&mut self, err: Error) -> usize {
        self.closed = true;
        self.fail_where(|_| true, &err)
    }

    pub fn pending(&self) -> usize {
        self.slots.len()
    }
}

/// Whether `response` is an error reply rather than an answer.
pub(crate) fn server_error(response: &Response) -> Option<Error> {
    match response {
        Response::Err { description } => Some(Error::Server(description.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::protocol::IterRes;

    fn frame(lane: u64, res: IterRes) -> ServerFrame {
        ServerFrame {
            lane,
            response: Response::Iter(res),
        }
    }

    fn owned_by(session: u64, transaction: u64) -> Owner {
        Owner {
            session: Some(session),
            transaction: Some(transaction),
        }
    }

    #[test]
    fn routes_by_lane() {
        let mut router = ResponseRouter::new();
        let mut first = router.register(1, Owner::default()).unwrap();
        let mut second = router.register(2, Owner::default()).unwrap();

        router.route(frame(2, IterRes::answer(b"b".to_vec())));
        router.route(frame(1, IterRes::answer(b"a".to_vec())));

        assert_eq!(
            first.take().unwrap(),
            Response::Iter(IterRes::answer(b"a".to_vec()))
        );
        assert_eq!(
            second.take().unwrap(),
            Response::Iter(IterRes::answer(b"b".to_vec()))
        );
    }

    #[test]
    fn terminal_message_releases_slot() {
        let mut router = ResponseRouter::new();
        let mut collector = router.register(1, Owner::default()).unwrap();

        router.route(frame(1, IterRes::answer(vec![1])));
        assert_eq!(router.pending(), 1);
        router.route(frame(1, IterRes::continuation(5)));
        assert_eq!(router.pending(), 0);

        // Late message after the wave closed is dropped, not delivered.
        router.route(frame(1, IterRes::answer(vec![2])));

        assert!(collector.take().is_ok());
        assert_eq!(
            collector.take().unwrap(),
            Response::Iter(IterRes::continuation(5))
        );
        assert_eq!(collector.take(), Err(Error::ConnectionClosed));
    }

    #[test]
    fn unroutable_message_is_dropped() {
        let mut router = ResponseRouter::new();
        let mut collector = router.register(1, Owner::default()).unwrap();

        router.route(frame(9, IterRes::answer(vec![1])));

        assert_eq!(
            collector.poll(Duration::from_millis(10)),
            Err(Error::Timeout)
        );
        assert!(!collector.has_arrived());
    }

    #[test]
    fn abandoned_lane_is_released_at_its_terminal() {
        let mut router = ResponseRouter::new();
        let collector = router.register(1, Owner::default()).unwrap();
        drop(collector);

        router.route(frame(1, IterRes::answer(vec![1])));
        router.route(frame(1, IterRes::answer(vec![2])));
        assert_eq!(router.pending(), 1);
        router.route(frame(1, IterRes::done()));
        assert_eq!(router.pending(), 0);
    }

    #[test]
    fn close_fails_everything_and_refuses_new_lanes() {
        let mut router = ResponseRouter::new();
        let mut a = router.register(1, Owner::default()).unwrap();
        let mut b = router.register(2, owned_by(1, 1)).unwrap();

        assert_eq!(router.close(Error::ConnectionClosed), 2);

        assert_eq!(a.take(), Err(Error::ConnectionClosed));
        assert_eq!(b.take(), Err(Error::ConnectionClosed));
        assert!(matches!(
            router.register(3, Owner::default()),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn failing_a_transaction_leaves_others_alone() {
        let mut router = ResponseRouter::new();
        let mut doomed = router.register(1, owned_by(1, 10)).unwrap();
        let mut survivor = router.register(2, owned_by(1, 11)).unwrap();

        assert_eq!(router.fail_transaction(10, Error::TransactionClosed), 1);
        router.route(frame(2, IterRes::done()));

        assert_eq!(doomed.take(), Err(Error::TransactionClosed));
        assert_eq!(survivor.take().unwrap(), Response::Iter(IterRes::done()));
    }

    #[test]
    fn failing_a_session_reaches_its_transactions() {
        let mut router = ResponseRouter::new();
        let mut a = router.register(1, owned_by(4, 10)).unwrap();
        let mut b = router.register(2, owned_by(4, 11)).unwrap();
        let _other = router.register(3, owned_by(5, 12)).unwrap();

        assert_eq!(router.fail_session(4, Error::SessionClosed), 2);
        assert_eq!(a.take(), Err(Error::SessionClosed));
        assert_eq!(b.take(), Err(Error::SessionClosed));
        assert_eq!(router.pending(), 1);
    }

    #[test]
    fn server_error_detection() {
        let err = Response::Err {
            description: "no such database".into(),
        };
        assert_eq!(
            server_error(&err),
            Some(Error::Server("no such database".into()))
        );
        assert_eq!(server_error(&Response::Ok), None);
    }
}
