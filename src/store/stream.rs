use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

use crate::store::{call, now_ms, StoreError, TypeRegistry, ValueType};

const INVALID_ID: &str = "Invalid stream ID specified as stream command argument";
const ID_NOT_GREATER_THAN_ZERO: &str = "The ID specified in XADD must be greater than 0-0";
const ID_NOT_GREATER_THAN_TOP: &str =
    "The ID specified in XADD is equal or smaller than the target stream top item";

/// Identifies a stream entry. Ordered by milliseconds first, then by sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const MIN: StreamId = StreamId::new(0, 0);
    pub const MAX: StreamId = StreamId::new(u64::MAX, u64::MAX);

    pub const fn new(ms: u64, seq: u64) -> StreamId {
        StreamId { ms, seq }
    }

    /// Parses a range bound: `-` and `+` are the smallest and largest ids, and a bare `ms` uses
    /// `missing_seq` as its sequence number.
    pub fn parse_bound(s: &str, missing_seq: u64) -> Result<StreamId, StoreError> {
        match s {
            "-" => Ok(StreamId::MIN),
            "+" => Ok(StreamId::MAX),
            s if !s.contains('-') => {
                let ms = parse_part(s)?;
                Ok(StreamId::new(ms, missing_seq))
            }
            s => s.parse(),
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for StreamId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ms, seq) = s.split_once('-').ok_or_else(invalid_id)?;
        Ok(StreamId::new(parse_part(ms)?, parse_part(seq)?))
    }
}

fn parse_part(s: &str) -> Result<u64, StoreError> {
    s.parse::<u64>().map_err(|_| invalid_id())
}

fn invalid_id() -> StoreError {
    StoreError::InvalidStreamId(INVALID_ID.to_string())
}

/// The id requested by `XADD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSpec {
    /// `*`: both parts are generated.
    Auto,
    /// `<ms>-*`: the sequence number is generated.
    AutoSeq(u64),
    Explicit(StreamId),
}

impl FromStr for IdSpec {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(IdSpec::Auto);
        }

        match s.split_once('-') {
            Some((ms, "*")) => Ok(IdSpec::AutoSeq(parse_part(ms)?)),
            _ => Ok(IdSpec::Explicit(s.parse()?)),
        }
    }
}

/// Where `XREAD` starts reading a stream from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFrom {
    /// Entries strictly after this id.
    After(StreamId),
    /// `$`: only entries added after the read was received.
    Latest,
}

/// How long `XREAD` waits for entries when none are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    Forever,
    For(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(Bytes, Bytes)>,
}

/// Entries per stream key. Only keys with at least one entry are present.
pub type ReadResult = Vec<(String, Vec<StreamEntry>)>;

type Fields = Vec<(Bytes, Bytes)>;

#[derive(Debug)]
enum Request {
    Add {
        key: String,
        id: IdSpec,
        fields: Fields,
        responder: oneshot::Sender<Result<StreamId, StoreError>>,
    },
    Range {
        key: String,
        start: StreamId,
        end: StreamId,
        count: Option<usize>,
        responder: oneshot::Sender<Vec<StreamEntry>>,
    },
    Read {
        requests: Vec<(String, ReadFrom)>,
        count: Option<usize>,
        block: Option<Block>,
        deadline: Option<Instant>,
        responder: oneshot::Sender<ReadResult>,
    },
}

/// A client parked on a blocking `XREAD`.
#[derive(Debug)]
struct Waiter {
    requests: Vec<(String, StreamId)>,
    count: Option<usize>,
    deadline: Option<Instant>,
    responder: oneshot::Sender<ReadResult>,
}

impl Waiter {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if deadline <= now)
    }
}

/// Handle to the stream store actor.
#[derive(Clone)]
pub struct StreamStore {
    sender: mpsc::UnboundedSender<Request>,
}

impl StreamStore {
    pub(crate) fn spawn(registry: TypeRegistry, cleanup_every: u64) -> StreamStore {
        let (sender, receiver) = mpsc::unbounded_channel();
        let actor = StreamActor {
            streams: HashMap::new(),
            waiters: HashMap::new(),
            queues: HashMap::new(),
            next_waiter_id: 0,
            registry,
            receiver,
            cleanup_every,
            processed: 0,
        };

        tokio::spawn(actor.run());

        StreamStore { sender }
    }

    /// Appends an entry, returning the id it was stored under.
    pub async fn xadd(
        &self,
        key: String,
        id: IdSpec,
        fields: Vec<(Bytes, Bytes)>,
    ) -> Result<StreamId, StoreError> {
        call(&self.sender, |responder| Request::Add {
            key,
            id,
            fields,
            responder,
        })
        .await?
    }

    /// Returns the entries with ids between `start` and `end`, both inclusive.
    pub async fn xrange(
        &self,
        key: &str,
        start: StreamId,
        end: StreamId,
        count: Option<usize>,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        call(&self.sender, |responder| Request::Range {
            key: key.to_string(),
            start,
            end,
            count,
            responder,
        })
        .await
    }

    /// Reads entries from one or more streams. An empty result means nothing was available,
    /// or nothing arrived before the block timeout.
    pub async fn xread(
        &self,
        requests: Vec<(String, ReadFrom)>,
        count: Option<usize>,
        block: Option<Block>,
    ) -> Result<ReadResult, StoreError> {
        let deadline = match block {
            Some(Block::For(timeout)) => Instant::now().checked_add(timeout),
            _ => None,
        };
        let (responder, mut receiver) = oneshot::channel();

        self.sender
            .send(Request::Read {
                requests,
                count,
                block,
                deadline,
                responder,
            })
            .map_err(|_| StoreError::Closed)?;

        match deadline {
            Some(deadline) => match timeout_at(deadline, &mut receiver).await {
                Ok(res) => res.map_err(|_| StoreError::Closed),
                Err(_) => {
                    receiver.close();
                    Ok(receiver.try_recv().unwrap_or_default())
                }
            },
            None => receiver.await.map_err(|_| StoreError::Closed),
        }
    }
}

struct StreamActor {
    streams: HashMap<String, BTreeMap<StreamId, Fields>>,
    waiters: HashMap<u64, Waiter>,
    /// Waiter ids per stream key, oldest first. May hold ids of waiters already resolved through
    /// another key; those are skipped and purged on cleanup.
    queues: HashMap<String, VecDeque<u64>>,
    next_waiter_id: u64,
    registry: TypeRegistry,
    receiver: mpsc::UnboundedReceiver<Request>,
    cleanup_every: u64,
    processed: u64,
}

impl StreamActor {
    async fn run(mut self) {
        while let Some(request) = self.receiver.recv().await {
            self.handle(request);

            self.processed += 1;
            if self.cleanup_every > 0 && self.processed % self.cleanup_every == 0 {
                self.cleanup_waiters();
            }
        }

        debug!("Stream store stopped");
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::Add {
                key,
                id,
                fields,
                responder,
            } => {
                let res = self.add(key, id, fields);
                let _ = responder.send(res);
            }
            Request::Range {
                key,
                start,
                end,
                count,
                responder,
            } => {
                let entries = self.range(&key, start, end, count);
                let _ = responder.send(entries);
            }
            Request::Read {
                requests,
                count,
                block,
                deadline,
                responder,
            } => {
                let requests: Vec<(String, StreamId)> = requests
                    .into_iter()
                    .map(|(key, from)| {
                        let after = match from {
                            ReadFrom::After(id) => id,
                            ReadFrom::Latest => self.last_id(&key).unwrap_or(StreamId::MIN),
                        };
                        (key, after)
                    })
                    .collect();

                let res = self.read(&requests, count);
                if !res.is_empty() || block.is_none() {
                    let _ = responder.send(res);
                    return;
                }

                self.park(Waiter {
                    requests,
                    count,
                    deadline,
                    responder,
                });
            }
        }
    }

    fn add(&mut self, key: String, id: IdSpec, fields: Fields) -> Result<StreamId, StoreError> {
        self.registry.claim(&key, ValueType::Stream)?;

        let id = match next_id(self.last_id(&key), id, now_ms()) {
            Ok(id) => id,
            Err(err) => {
                if !self.streams.contains_key(&key) {
                    self.registry.release(&key, ValueType::Stream);
                }
                return Err(err);
            }
        };

        self.streams.entry(key.clone()).or_default().insert(id, fields);
        trace!(key, %id, "Added stream entry");

        self.serve_waiters(&key);

        Ok(id)
    }

    fn last_id(&self, key: &str) -> Option<StreamId> {
        self.streams
            .get(key)
            .and_then(|entries| entries.last_key_value())
            .map(|(id, _)| *id)
    }

    fn range(
        &self,
        key: &str,
        start: StreamId,
        end: StreamId,
        count: Option<usize>,
    ) -> Vec<StreamEntry> {
        let Some(entries) = self.streams.get(key) else {
            return Vec::new();
        };
        if start > end {
            return Vec::new();
        }

        entries
            .range((Included(start), Included(end)))
            .take(count.unwrap_or(usize::MAX))
            .map(to_entry)
            .collect()
    }

    fn read(&self, requests: &[(String, StreamId)], count: Option<usize>) -> ReadResult {
        // COUNT 0 reads without a limit.
        let limit = count.filter(|count| *count > 0).unwrap_or(usize::MAX);

        requests
            .iter()
            .filter_map(|(key, after)| {
                let entries: Vec<StreamEntry> = self
                    .streams
                    .get(key)?
                    .range((Excluded(*after), Unbounded))
                    .take(limit)
                    .map(to_entry)
                    .collect();

                (!entries.is_empty()).then(|| (key.clone(), entries))
            })
            .collect()
    }

    fn park(&mut self, waiter: Waiter) {
        let id = self.next_waiter_id;
        self.next_waiter_id += 1;

        for (key, _) in &waiter.requests {
            self.queues.entry(key.clone()).or_default().push_back(id);
        }

        debug!(waiter = id, deadline = ?waiter.deadline, "Parking blocking read");
        self.waiters.insert(id, waiter);
    }

    /// Resolves, in FIFO order, the waiters on `key` that can now read something.
    fn serve_waiters(&mut self, key: &str) {
        let Some(queue) = self.queues.remove(key) else {
            return;
        };

        let now = Instant::now();
        let mut remaining = VecDeque::with_capacity(queue.len());

        for id in queue {
            let Some(waiter) = self.waiters.get(&id) else {
                continue;
            };

            if waiter.responder.is_closed() {
                self.waiters.remove(&id);
                continue;
            }

            let res = if waiter.is_expired(now) {
                Vec::new()
            } else {
                let res = self.read(&waiter.requests, waiter.count);
                if res.is_empty() {
                    remaining.push_back(id);
                    continue;
                }
                res
            };

            if let Some(waiter) = self.waiters.remove(&id) {
                let _ = waiter.responder.send(res);
            }
        }

        if !remaining.is_empty() {
            self.queues.insert(key.to_string(), remaining);
        }
    }

    /// Resolves expired waiters, drops the ones whose client is gone, and purges stale queue
    /// entries.
    fn cleanup_waiters(&mut self) {
        let now = Instant::now();

        let finished: Vec<u64> = self
            .waiters
            .iter()
            .filter(|(_, waiter)| waiter.responder.is_closed() || waiter.is_expired(now))
            .map(|(id, _)| *id)
            .collect();

        for id in finished {
            if let Some(waiter) = self.waiters.remove(&id) {
                let _ = waiter.responder.send(Vec::new());
            }
        }

        let waiters = &self.waiters;
        self.queues.retain(|_, queue| {
            queue.retain(|id| waiters.contains_key(id));
            !queue.is_empty()
        });

        trace!(waiters = self.waiters.len(), "Cleaned up stream waiters");
    }
}

fn to_entry((id, fields): (&StreamId, &Fields)) -> StreamEntry {
    StreamEntry {
        id: *id,
        fields: fields.clone(),
    }
}

/// Computes the id of a new entry given the current top of the stream.
fn next_id(
    last: Option<StreamId>,
    requested: IdSpec,
    now_ms: u64,
) -> Result<StreamId, StoreError> {
    let last = last.unwrap_or(StreamId::MIN);

    match requested {
        IdSpec::Explicit(id) if id == StreamId::MIN => Err(StoreError::InvalidStreamId(
            ID_NOT_GREATER_THAN_ZERO.to_string(),
        )),
        IdSpec::Explicit(id) if id <= last => Err(not_greater_than_top()),
        IdSpec::Explicit(id) => Ok(id),
        IdSpec::AutoSeq(ms) => next_id_for_ms(last, ms),
        IdSpec::Auto => next_id_for_ms(last, now_ms.max(last.ms)),
    }
}

fn next_id_for_ms(last: StreamId, ms: u64) -> Result<StreamId, StoreError> {
    if ms < last.ms {
        return Err(not_greater_than_top());
    }

    if ms == last.ms {
        // Also covers `0-*` on an empty stream, which yields `0-1`.
        let seq = last.seq.checked_add(1).ok_or_else(not_greater_than_top)?;
        return Ok(StreamId::new(ms, seq));
    }

    Ok(StreamId::new(ms, 0))
}

fn not_greater_than_top() -> StoreError {
    StoreError::InvalidStreamId(ID_NOT_GREATER_THAN_TOP.to_string())
}
