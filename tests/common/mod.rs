//! Synthetic server used by the integration tests.
//!
//! Queries are plain text:
//!
//! - `range N`: answers `"0"` .. `"N-1"`, paged by the request's batch size
//! - `from S range N`: answers `"S"` .. `"S+N-1"`
//! - `delay MS ...`: holds back the first batch for MS milliseconds
//! - `hangup-after B ...`: drops the connection when asked for batch B+1
//! - `malformed`: a single iterator response with nothing set
//! - `fail`: an error response
//! - `silent`: never answers
//!
//! Opening a session on the database `silent` is never answered either. A
//! server made with [`TestServer::start_unresponsive`] acknowledges opens and
//! queries but leaves commit, rollback and close requests unanswered.
#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    io::BufReader,
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use sluice::protocol::{
    BatchSize, ClientFrame, IterRes, ProtocolTransport, Request, Response, ServerFrame,
};

type Writer = Arc<Mutex<ProtocolTransport<TcpStream>>>;

pub struct TestServer {
    addr: SocketAddr,
    log: Arc<Mutex<Vec<ClientFrame>>>,
}

impl TestServer {
    pub fn start() -> Self {
        Self::spawn(false)
    }

    pub fn start_unresponsive() -> Self {
        Self::spawn(true)
    }

    fn spawn(mute_control: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let accept_log = Arc::clone(&log);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let log = Arc::clone(&accept_log);
                thread::spawn(move || serve(stream, log, mute_control));
            }
        });

        Self { addr, log }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Every frame received so far, in arrival order.
    pub fn requests(&self) -> Vec<ClientFrame> {
        self.log.lock().unwrap().clone()
    }

    pub fn iter_requests(&self) -> Vec<(u64, sluice::protocol::IterReq)> {
        self.requests()
            .into_iter()
            .filter_map(|frame| match frame.request {
                Request::Iter { req, .. } => Some((frame.lane, req)),
                _ => None,
            })
            .collect()
    }

    /// Waits up to two seconds for `count` frames matching `predicate`.
    pub fn wait_for<P>(&self, count: usize, predicate: P) -> bool
    where
        P: Fn(&Request) -> bool,
    {
        for _ in 0..200 {
            let seen = self
                .requests()
                .iter()
                .filter(|frame| predicate(&frame.request))
                .count();
            if seen >= count {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

#[derive(Debug, Default)]
struct Script {
    start: usize,
    count: usize,
    delay: Option<Duration>,
    hangup_after: Option<usize>,
    kind: Kind,
}

#[derive(Debug, Default, PartialEq)]
enum Kind {
    #[default]
    Range,
    Malformed,
    Fail,
    Silent,
}

fn parse(query: &[u8]) -> Script {
    let text = String::from_utf8_lossy(query);
    let mut words = text.split_whitespace();
    let mut script = Script::default();

    while let Some(word) = words.next() {
        let mut number = || words.next().unwrap().parse::<usize>().unwrap();
        match word {
            "range" => script.count = number(),
            "from" => script.start = number(),
            "delay" => script.delay = Some(Duration::from_millis(number() as u64)),
            "hangup-after" => script.hangup_after = Some(number()),
            "malformed" => script.kind = Kind::Malformed,
            "fail" => script.kind = Kind::Fail,
            "silent" => script.kind = Kind::Silent,
            other => panic!("unknown query word '{other}'"),
        }
    }
    script
}

struct Cursor {
    remaining: VecDeque<Vec<u8>>,
    batches_sent: usize,
    hangup_after: Option<usize>,
}

impl Cursor {
    fn next_batch(&mut self, size: BatchSize, token: u64) -> Vec<Response> {
        let size = match size {
            BatchSize::Number(n) => n as usize,
            BatchSize::All => usize::MAX,
        };

        let mut batch = Vec::new();
        while batch.len() < size {
            match self.remaining.pop_front() {
                Some(answer) => batch.push(Response::Iter(IterRes::answer(answer))),
                None => break,
            }
        }
        self.batches_sent += 1;

        if self.remaining.is_empty() {
            batch.push(Response::Iter(IterRes::done()));
        } else {
            batch.push(Response::Iter(IterRes::continuation(token)));
        }
        batch
    }
}

fn write_all(writer: &Writer, lane: u64, responses: Vec<Response>) {
    let mut writer = writer.lock().unwrap();
    for response in responses {
        if writer.write_response(ServerFrame { lane, response }).is_err() {
            return;
        }
    }
}

fn serve(stream: TcpStream, log: Arc<Mutex<Vec<ClientFrame>>>, mute_control: bool) {
    let writer: Writer = Arc::new(Mutex::new(ProtocolTransport::new(
        stream.try_clone().unwrap(),
    )));
    let mut reader = ProtocolTransport::new(BufReader::new(stream.try_clone().unwrap()));

    let mut cursors: HashMap<u64, Cursor> = HashMap::new();
    let mut next_id = 1u64;

    while let Ok(frame) = reader.read_request() {
        log.lock().unwrap().push(frame.clone());
        let lane = frame.lane;

        let responses = match frame.request {
            Request::SessionOpen { database, .. } if database == "silent" => continue,
            Request::SessionOpen { database, .. } if database == "missing" => {
                vec![Response::Err {
                    description: format!("database '{database}' does not exist"),
                }]
            }
            Request::SessionOpen { .. } => {
                next_id += 1;
                vec![Response::SessionOpened { session: next_id }]
            }
            Request::TransactionOpen { .. } => {
                next_id += 1;
                vec![Response::TransactionOpened {
                    transaction: next_id,
                }]
            }
            Request::SessionClose { .. }
            | Request::TransactionCommit { .. }
            | Request::TransactionRollback { .. }
            | Request::TransactionClose { .. } => {
                if mute_control {
                    continue;
                }
                vec![Response::Ok]
            }
            Request::Iter { req, .. } => match req.query {
                Some(query) => {
                    let script = parse(&query);
                    match script.kind {
                        Kind::Malformed => vec![Response::Iter(IterRes::default())],
                        Kind::Fail => vec![Response::Err {
                            description: "query failed".into(),
                        }],
                        Kind::Silent => continue,
                        Kind::Range => {
                            next_id += 1;
                            let token = next_id;
                            let mut cursor = Cursor {
                                remaining: (script.start..script.start + script.count)
                                    .map(|i| i.to_string().into_bytes())
                                    .collect(),
                                batches_sent: 0,
                                hangup_after: script.hangup_after,
                            };
                            let batch = cursor.next_batch(req.options.batch_size, token);
                            if !cursor.remaining.is_empty() {
                                cursors.insert(token, cursor);
                            }

                            if let Some(delay) = script.delay {
                                let writer = Arc::clone(&writer);
                                thread::spawn(move || {
                                    thread::sleep(delay);
                                    write_all(&writer, lane, batch);
                                });
                                continue;
                            }
                            batch
                        }
                    }
                }
                None => {
                    let token = req.iterator_id;
                    let Some(mut cursor) = cursors.remove(&token) else {
                        write_all(
                            &writer,
                            lane,
                            vec![Response::Err {
                                description: format!("unknown iterator {token}"),
                            }],
                        );
                        continue;
                    };

                    if cursor.hangup_after == Some(cursor.batches_sent) {
                        let _ = stream.shutdown(Shutdown::Both);
                        return;
                    }

                    let batch = cursor.next_batch(req.options.batch_size, token);
                    if !cursor.remaining.is_empty() {
                        cursors.insert(token, cursor);
                    }
                    batch
                }
            },
        };

        write_all(&writer, lane, responses);
    }
}
