//! The request-queue contract between the resolver and the external query
//! engine, plus two in-process implementations.
//!
//! The core never blocks on the network: it enqueues a request together
//! with a completion callback and returns. Callbacks run later, on
//! whatever thread the query engine uses.

use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::util::Result;

use super::protocol::Request;

/// A decoded response page.
pub type Document = serde_json::Value;

/// Completion callback of one request; receives the whole page or a
/// transport failure, on an arbitrary worker thread.
pub type ResponseCallback = Box<dyn FnOnce(Result<Document>) + Send + 'static>;

/// Request/callback contract of the external query engine.
///
/// `enqueue` must not block and must not invoke the callback inline; the
/// resolver calls it while holding its session lock.
pub trait QueryClient: Send + Sync {
    fn enqueue(&self, request: Request, on_done: ResponseCallback);
}

/// Blocking fetch of one page; what an implementation actually talks to
/// (HTTP, a fixture directory, a canned map in tests).
///
/// A resource that does not exist on the server must surface as
/// [`Error::PropertyNotFound`](crate::util::Error::PropertyNotFound);
/// every other failure as [`Error::Transport`](crate::util::Error::Transport).
/// The resolver treats the two differently for transform references.
pub trait Transport: Send + Sync {
    fn fetch(&self, request: &Request) -> Result<Document>;
}

enum Job {
    Fetch(Request, ResponseCallback),
    Stop,
}

/// Bounded worker pool driving a blocking [`Transport`].
///
/// Workers pull jobs off a shared channel; each fetch's callback runs on
/// the worker thread that completed it.
pub struct WorkerPool {
    tx: Sender<Job>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` threads over the transport.
    pub fn spawn(transport: Arc<dyn Transport>, workers: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers)
            .map(|_| {
                let rx = Arc::clone(&rx);
                let transport = Arc::clone(&transport);
                thread::spawn(move || worker_loop(transport, rx))
            })
            .collect();

        Self { tx, handles }
    }

    /// Stop all workers and wait for them to finish.
    pub fn stop(&mut self) {
        for _ in &self.handles {
            let _ = self.tx.send(Job::Stop);
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl QueryClient for WorkerPool {
    fn enqueue(&self, request: Request, on_done: ResponseCallback) {
        let _ = self.tx.send(Job::Fetch(request, on_done));
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(transport: Arc<dyn Transport>, rx: Arc<Mutex<Receiver<Job>>>) {
    loop {
        // Hold the receiver lock only while waiting for one job.
        let job = {
            let rx = rx.lock();
            match rx.recv() {
                Ok(job) => job,
                Err(_) => break, // Channel closed
            }
        };
        match job {
            Job::Fetch(request, on_done) => {
                let result = transport.fetch(&request);
                on_done(result);
            }
            Job::Stop => break,
        }
    }
}

/// Single-threaded deterministic client: requests queue up and run only
/// when the caller pumps them.
///
/// Used by the replay CLI and by tests that need a reproducible
/// interleaving of completions.
pub struct QueuedClient {
    transport: Arc<dyn Transport>,
    queue: Mutex<VecDeque<(Request, ResponseCallback)>>,
}

impl QueuedClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Number of requests waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run exactly one queued request; returns false if the queue was
    /// empty.
    pub fn pump_one(&self) -> bool {
        // Pop under the lock, fetch and call back without it: callbacks
        // enqueue follow-up requests.
        let job = self.queue.lock().pop_front();
        match job {
            Some((request, on_done)) => {
                let result = self.transport.fetch(&request);
                on_done(result);
                true
            }
            None => false,
        }
    }

    /// Run queued requests (including follow-ups they enqueue) until none
    /// remain; returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.pump_one() {
            ran += 1;
        }
        ran
    }
}

impl QueryClient for QueuedClient {
    fn enqueue(&self, request: Request, on_done: ResponseCallback) {
        self.queue.lock().push_back((request, on_done));
    }
}
