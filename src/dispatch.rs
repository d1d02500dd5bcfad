//! Fan-out of pending questions to the resolver worker pools.
//!
//! One process-wide bounded queue feeds every provider's workers; whichever
//! worker is free first takes the next question. There is no provider
//! affinity and no retry on another provider.

use crate::reply::NormalizedReply;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};

/// Depth of the shared query queue. Enqueueing blocks when it is full,
/// which throttles the listeners.
pub const QUEUE_DEPTH: usize = 100;

/// One pending question. Consumed by exactly one worker, which must write
/// exactly one reply to the sink (a synthetic failure when the upstream
/// exchange fails).
#[derive(Debug)]
pub struct Query {
    pub qname: String,
    pub qtype: u16,
    pub reply_sink: oneshot::Sender<NormalizedReply>,
}

/// Dequeue side of the dispatcher, shared by all workers.
pub type QueryReceiver = Arc<Mutex<mpsc::Receiver<Query>>>;

#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Query>,
    rx: QueryReceiver,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_depth(QUEUE_DEPTH)
    }

    pub fn with_depth(depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(depth);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Enqueue a question and wait for some worker to answer it.
    ///
    /// A closed queue or a dropped sink (a worker torn down mid-query)
    /// degrades to a failure reply so the caller can still answer the
    /// client with SERVFAIL.
    pub async fn resolve(&self, qname: String, qtype: u16) -> NormalizedReply {
        let (reply_sink, reply) = oneshot::channel();
        let query = Query {
            qname,
            qtype,
            reply_sink,
        };
        if self.tx.send(query).await.is_err() {
            return NormalizedReply::failure();
        }
        reply.await.unwrap_or_else(|_| NormalizedReply::failure())
    }

    /// Handle for worker loops; see [`next_query`].
    pub fn receiver(&self) -> QueryReceiver {
        self.rx.clone()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Take the next pending question. Returns `None` once every enqueue
/// handle is gone.
pub async fn next_query(queue: &QueryReceiver) -> Option<Query> {
    queue.lock().await.recv().await
}
