//! Background drain for diagnostic and trace output.
//!
//! The protocol's send and receive paths must never stall on log-sink
//! latency, so they enqueue text here and move on. A single worker thread
//! owns the sink; all sink hazards (slow writers, disposed consoles) are
//! isolated to it.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tracing::warn;

/// Log target for drain worker internals.
const DRAIN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::drain");

struct Queue {
    state: Mutex<QueueState>,
    wake: Condvar,
}

struct QueueState {
    messages: VecDeque<String>,
    terminating: bool,
}

impl Queue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

/// Producer handle: enqueues without ever blocking on the sink.
#[derive(Clone)]
pub struct DrainHandle {
    queue: Arc<Queue>,
}

impl DrainHandle {
    /// Appends a message and wakes the worker.
    ///
    /// Messages enqueued before the worker starts are kept and delivered
    /// once it runs. After shutdown this is a silent no-op; late messages
    /// from a reader thread racing teardown are dropped, not accumulated.
    pub fn enqueue(&self, message: impl Into<String>) {
        let mut state = self.queue.lock();
        if state.terminating {
            return;
        }
        state.messages.push_back(message.into());
        drop(state);
        self.queue.wake.notify_one();
    }
}

/// The drain worker: one queue, one consumer thread, one sink.
pub struct LogDrain {
    queue: Arc<Queue>,
    sink: Option<Box<dyn Write + Send>>,
    worker: Option<JoinHandle<()>>,
}

impl LogDrain {
    /// Creates the drain around a sink without starting the worker.
    #[must_use]
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            queue: Arc::new(Queue {
                state: Mutex::new(QueueState {
                    messages: VecDeque::new(),
                    terminating: false,
                }),
                wake: Condvar::new(),
            }),
            sink: Some(sink),
            worker: None,
        }
    }

    /// Starts the worker thread. Idempotent.
    pub fn start(&mut self, label: &str) {
        if self.worker.is_some() {
            return;
        }
        let Some(sink) = self.sink.take() else {
            return;
        };
        let worker_queue = Arc::clone(&self.queue);
        let thread_name = format!("{label}/log-drain");
        self.worker = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run_worker(&worker_queue, sink))
            .map_err(|error| {
                warn!(target: DRAIN_TARGET, %error, thread = %thread_name, "failed to spawn drain worker");
            })
            .ok();
    }

    /// A cloneable producer handle for this drain.
    #[must_use]
    pub fn handle(&self) -> DrainHandle {
        DrainHandle {
            queue: Arc::clone(&self.queue),
        }
    }

    /// Stops the worker cooperatively: set the flag, wake it a final time,
    /// join.
    ///
    /// Messages already queued are flushed to the sink before the worker
    /// exits, so shutdown is deterministic and loss-free. Idempotent and
    /// infallible.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.queue.lock();
            state.terminating = true;
        }
        self.queue.wake.notify_all();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!(target: DRAIN_TARGET, "drain worker panicked");
        }
    }
}

impl Drop for LogDrain {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(queue: &Queue, mut sink: Box<dyn Write + Send>) {
    loop {
        let message = {
            let mut state = queue.lock();
            loop {
                if let Some(message) = state.messages.pop_front() {
                    break Some(message);
                }
                if state.terminating {
                    break None;
                }
                state = queue
                    .wake
                    .wait(state)
                    .unwrap_or_else(|poison| poison.into_inner());
            }
        };
        let Some(message) = message else {
            return;
        };
        if let Err(error) = writeln!(sink, "{message}").and_then(|()| sink.flush()) {
            let terminating = queue.lock().terminating;
            if !terminating {
                warn!(target: DRAIN_TARGET, %error, "log sink write failed");
            }
        }
    }
}
