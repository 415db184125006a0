use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

use crate::store::{call, StoreError, TypeRegistry, ValueType};

/// Which end of the list a push appends to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
    Front,
    Back,
}

/// `Ok(Some(value))` when an element was popped, `Ok(None)` on timeout.
type PopResult = Result<Option<Bytes>, StoreError>;

#[derive(Debug)]
enum Request {
    Push {
        key: String,
        values: Vec<Bytes>,
        end: End,
        responder: oneshot::Sender<Result<usize, StoreError>>,
    },
    Len {
        key: String,
        responder: oneshot::Sender<usize>,
    },
    Range {
        key: String,
        start: i64,
        end: i64,
        responder: oneshot::Sender<Vec<Bytes>>,
    },
    Pop {
        key: String,
        count: usize,
        responder: oneshot::Sender<Result<Vec<Bytes>, StoreError>>,
    },
    BlockingPop {
        key: String,
        deadline: Option<Instant>,
        responder: oneshot::Sender<PopResult>,
    },
}

/// A client parked on `BLPOP`.
#[derive(Debug)]
struct Waiter {
    deadline: Option<Instant>,
    responder: oneshot::Sender<PopResult>,
}

impl Waiter {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if deadline <= now)
    }
}

/// Handle to the list store actor.
#[derive(Clone)]
pub struct ListStore {
    sender: mpsc::UnboundedSender<Request>,
}

impl ListStore {
    pub(crate) fn spawn(registry: TypeRegistry, cleanup_every: u64) -> ListStore {
        let (sender, receiver) = mpsc::unbounded_channel();
        let actor = ListActor {
            lists: HashMap::new(),
            waiters: HashMap::new(),
            registry,
            receiver,
            cleanup_every,
            processed: 0,
        };

        tokio::spawn(actor.run());

        ListStore { sender }
    }

    /// Appends `values` to the tail of the list, returning its new length.
    pub async fn rpush(&self, key: String, values: Vec<Bytes>) -> Result<usize, StoreError> {
        self.push(key, values, End::Back).await
    }

    /// Prepends `values` one by one, so `a b c` ends up as `c b a`.
    pub async fn lpush(&self, key: String, values: Vec<Bytes>) -> Result<usize, StoreError> {
        self.push(key, values, End::Front).await
    }

    async fn push(&self, key: String, values: Vec<Bytes>, end: End) -> Result<usize, StoreError> {
        call(&self.sender, |responder| Request::Push {
            key,
            values,
            end,
            responder,
        })
        .await?
    }

    pub async fn llen(&self, key: &str) -> Result<usize, StoreError> {
        call(&self.sender, |responder| Request::Len {
            key: key.to_string(),
            responder,
        })
        .await
    }

    /// Returns the elements between `start` and `end`, both inclusive. Negative indices count from
    /// the tail.
    pub async fn lrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<Bytes>, StoreError> {
        call(&self.sender, |responder| Request::Range {
            key: key.to_string(),
            start,
            end,
            responder,
        })
        .await
    }

    /// Removes and returns up to `count` elements from the head of the list.
    pub async fn lpop(&self, key: &str, count: usize) -> Result<Vec<Bytes>, StoreError> {
        call(&self.sender, |responder| Request::Pop {
            key: key.to_string(),
            count,
            responder,
        })
        .await?
    }

    /// Pops the head of the list, waiting up to `timeout` for an element to be pushed if the list
    /// is empty. `None` waits forever. Resolves to `Ok(None)` on timeout.
    pub async fn blpop(&self, key: &str, timeout: Option<Duration>) -> PopResult {
        // A deadline `Instant` cannot represent never arrives.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let (responder, mut receiver) = oneshot::channel();

        self.sender
            .send(Request::BlockingPop {
                key: key.to_string(),
                deadline,
                responder,
            })
            .map_err(|_| StoreError::Closed)?;

        let res = match deadline {
            Some(deadline) => match timeout_at(deadline, &mut receiver).await {
                Ok(res) => res,
                Err(_) => {
                    // Closing first makes any later send from the actor fail, so the element
                    // stays in the list. A value sent before that is still picked up here.
                    receiver.close();
                    return receiver.try_recv().unwrap_or(Ok(None));
                }
            },
            None => receiver.await,
        };

        res.map_err(|_| StoreError::Closed)?
    }
}

struct ListActor {
    lists: HashMap<String, VecDeque<Bytes>>,
    waiters: HashMap<String, VecDeque<Waiter>>,
    registry: TypeRegistry,
    receiver: mpsc::UnboundedReceiver<Request>,
    cleanup_every: u64,
    processed: u64,
}

impl ListActor {
    async fn run(mut self) {
        while let Some(request) = self.receiver.recv().await {
            self.handle(request);

            self.processed += 1;
            if self.cleanup_every > 0 && self.processed % self.cleanup_every == 0 {
                self.cleanup_waiters();
            }
        }

        debug!("List store stopped");
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::Push {
                key,
                values,
                end,
                responder,
            } => {
                let res = self.push(key, values, end);
                let _ = responder.send(res);
            }
            Request::Len { key, responder } => {
                let len = self.lists.get(&key).map_or(0, VecDeque::len);
                let _ = responder.send(len);
            }
            Request::Range {
                key,
                start,
                end,
                responder,
            } => {
                let values = self.range(&key, start, end);
                let _ = responder.send(values);
            }
            Request::Pop {
                key,
                count,
                responder,
            } => {
                let res = self.pop(&key, count);
                let _ = responder.send(res);
            }
            Request::BlockingPop {
                key,
                deadline,
                responder,
            } => match self.pop(&key, 1) {
                Ok(mut values) if !values.is_empty() => {
                    let _ = responder.send(Ok(values.pop()));
                }
                Ok(_) => {
                    debug!(key, ?deadline, "Parking blocking pop");
                    self.waiters.entry(key).or_default().push_back(Waiter {
                        deadline,
                        responder,
                    });
                }
                Err(err) => {
                    let _ = responder.send(Err(err));
                }
            },
        }
    }

    fn push(&mut self, key: String, values: Vec<Bytes>, end: End) -> Result<usize, StoreError> {
        if values.is_empty() {
            self.registry.check(&key, ValueType::List)?;
            return Ok(self.lists.get(&key).map_or(0, VecDeque::len));
        }

        self.registry.claim(&key, ValueType::List)?;

        let list = self.lists.entry(key.clone()).or_default();
        match end {
            End::Back => list.extend(values),
            End::Front => {
                for value in values {
                    list.push_front(value);
                }
            }
        }
        let len = list.len();
        trace!(key, len, "Pushed to list");

        self.serve_waiters(&key);

        Ok(len)
    }

    fn range(&self, key: &str, start: i64, end: i64) -> Vec<Bytes> {
        let Some(list) = self.lists.get(key) else {
            return Vec::new();
        };

        let len = list.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let end = if end < 0 { len + end } else { end.min(len - 1) };

        if start > end || start >= len {
            return Vec::new();
        }

        list.range(start as usize..=end as usize).cloned().collect()
    }

    fn pop(&mut self, key: &str, count: usize) -> Result<Vec<Bytes>, StoreError> {
        self.registry.check(key, ValueType::List)?;

        let Some(list) = self.lists.get_mut(key) else {
            return Ok(Vec::new());
        };

        let count = count.min(list.len());
        let values: Vec<Bytes> = list.drain(..count).collect();

        if list.is_empty() {
            self.remove_list(key);
        }

        Ok(values)
    }

    /// Hands elements of `key` to its waiters in FIFO order until one side runs out.
    fn serve_waiters(&mut self, key: &str) {
        let (Some(waiters), Some(list)) = (self.waiters.get_mut(key), self.lists.get_mut(key))
        else {
            return;
        };

        let now = Instant::now();
        while !list.is_empty() {
            let Some(waiter) = waiters.pop_front() else {
                break;
            };

            if waiter.is_expired(now) {
                let _ = waiter.responder.send(Ok(None));
                continue;
            }

            if let Some(value) = list.pop_front() {
                if let Err(Ok(Some(value))) = waiter.responder.send(Ok(Some(value))) {
                    // The client is gone, the element goes back for the next waiter.
                    list.push_front(value);
                }
            }
        }

        let no_waiters = waiters.is_empty();
        let no_values = list.is_empty();

        if no_waiters {
            self.waiters.remove(key);
        }
        if no_values {
            self.remove_list(key);
        }
    }

    fn remove_list(&mut self, key: &str) {
        self.lists.remove(key);
        self.registry.release(key, ValueType::List);
    }

    /// Resolves expired waiters, drops the ones whose client is gone, and forgets empty queues.
    fn cleanup_waiters(&mut self) {
        let now = Instant::now();

        for queue in self.waiters.values_mut() {
            for waiter in std::mem::take(queue) {
                if waiter.responder.is_closed() {
                    continue;
                }
                if waiter.is_expired(now) {
                    let _ = waiter.responder.send(Ok(None));
                    continue;
                }
                queue.push_back(waiter);
            }
        }

        self.waiters.retain(|_, queue| !queue.is_empty());
        trace!(keys = self.waiters.len(), "Cleaned up list waiters");
    }
}
