#![forbid(unsafe_code)]

//! Long-running message sources.
//!
//! A [`Subscription`] runs on its own thread and pushes messages into the
//! runtime through an `mpsc::Sender`. The runtime reconciles the set a model
//! declares after every update: new ids are started, ids no longer declared
//! are stopped, ids present in both keep running untouched.
//!
//! # Invariants
//! 1. At most one running instance per [`SubId`].
//! 2. A stopped subscription never delivers further messages: its messages
//!    are tagged and dropped at drain time once the id is stopped.
//! 3. `stop_all` signals every running subscription and joins nothing; the
//!    threads observe the [`StopSignal`] or a closed channel and exit.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::debug;

/// Stable identity of a subscription.
pub type SubId = u64;

/// A message source running on a background thread.
pub trait Subscription<M: Send + 'static>: Send {
    /// Unique id used for reconciliation.
    fn id(&self) -> SubId;

    /// Run until `stop` fires or `sender` is closed.
    fn run(&self, sender: mpsc::Sender<M>, stop: StopSignal);
}

#[derive(Debug, Default)]
struct StopState {
    stopped: Mutex<bool>,
    cvar: Condvar,
}

/// Cooperative stop flag shared with a subscription thread.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopState>,
}

impl StopSignal {
    /// Create an un-fired signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the signal fired.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.lock().map(|g| *g).unwrap_or(true)
    }

    /// Sleep up to `timeout`, waking early on stop. Returns `true` when stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Ok(guard) = self.inner.stopped.lock() else {
            return true;
        };
        match self
            .inner
            .cvar
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
        {
            Ok((guard, _)) => *guard,
            Err(_) => true,
        }
    }

    /// Fire the signal and wake any waiter.
    pub fn stop(&self) {
        if let Ok(mut guard) = self.inner.stopped.lock() {
            *guard = true;
        }
        self.inner.cvar.notify_all();
    }
}

struct Running {
    stop: StopSignal,
    handle: JoinHandle<()>,
}

/// Starts, stops and drains subscriptions.
pub struct SubscriptionManager<M: Send + 'static> {
    running: HashMap<SubId, Running>,
    sender: mpsc::Sender<(SubId, M)>,
    receiver: mpsc::Receiver<(SubId, M)>,
}

impl<M: Send + 'static> Default for SubscriptionManager<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Send + 'static> SubscriptionManager<M> {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            running: HashMap::new(),
            sender,
            receiver,
        }
    }

    /// Number of running subscriptions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.running.len()
    }

    /// Whether `id` is running.
    #[must_use]
    pub fn is_running(&self, id: SubId) -> bool {
        self.running.contains_key(&id)
    }

    /// Make the running set equal to `subs` (by id).
    pub fn reconcile(&mut self, subs: Vec<Box<dyn Subscription<M>>>) {
        let mut wanted: HashMap<SubId, Box<dyn Subscription<M>>> = HashMap::new();
        for sub in subs {
            wanted.entry(sub.id()).or_insert(sub);
        }

        let stale: Vec<SubId> = self
            .running
            .keys()
            .filter(|id| !wanted.contains_key(id))
            .copied()
            .collect();
        for id in stale {
            self.stop(id);
        }

        for (id, sub) in wanted {
            if self.running.contains_key(&id) {
                continue;
            }
            debug!(sub_id = id, "starting subscription");
            let stop = StopSignal::new();
            let thread_stop = stop.clone();
            let (tx, rx) = mpsc::channel::<M>();
            let forward = self.sender.clone();
            let handle = std::thread::spawn(move || {
                let pump = std::thread::spawn(move || {
                    for msg in rx {
                        if forward.send((id, msg)).is_err() {
                            break;
                        }
                    }
                });
                sub.run(tx, thread_stop);
                let _ = pump.join();
            });
            self.running.insert(id, Running { stop, handle });
        }
    }

    /// Stop a single subscription.
    pub fn stop(&mut self, id: SubId) {
        if let Some(running) = self.running.remove(&id) {
            debug!(sub_id = id, "stopping subscription");
            running.stop.stop();
            drop(running.handle);
        }
    }

    /// Signal every running subscription to stop.
    pub fn stop_all(&mut self) {
        let ids: Vec<SubId> = self.running.keys().copied().collect();
        for id in ids {
            self.stop(id);
        }
    }

    /// Take every pending message from subscriptions that are still running.
    pub fn drain_messages(&mut self) -> Vec<M> {
        let mut out = Vec::new();
        while let Ok((id, msg)) = self.receiver.try_recv() {
            if self.running.contains_key(&id) {
                out.push(msg);
            }
        }
        out
    }

    /// Block up to `timeout` for the next message from a running subscription.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<M> {
        let deadline = web_time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(web_time::Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok((id, msg)) if self.running.contains_key(&id) => return Some(msg),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}

impl<M: Send + 'static> Drop for SubscriptionManager<M> {
    fn drop(&mut self) {
        self.stop_all();
    }
}
