#![forbid(unsafe_code)]

//! Elm-style runtime for headless list models.
//!
//! The runtime owns a [`Model`], feeds it messages one at a time and executes
//! the [`Cmd`]s it returns. There is no terminal or DOM here: the host calls
//! [`Runtime::dispatch`] for input and [`Runtime::pump_at`] once per frame to
//! deliver background results, subscription messages and timer ticks.
//!
//! # Example
//!
//! ```ignore
//! use cmo_runtime::{Cmd, Model, Runtime};
//!
//! struct Counter(u32);
//!
//! impl Model for Counter {
//!     type Message = u32;
//!
//!     fn update(&mut self, msg: u32) -> Cmd<u32> {
//!         self.0 += msg;
//!         Cmd::none()
//!     }
//! }
//!
//! let mut rt = Runtime::new(Counter(0));
//! rt.dispatch(2);
//! assert_eq!(rt.model().0, 2);
//! ```
//!
//! # Ordering
//! Messages are applied strictly in arrival order. Task results are applied
//! when the host pumps; a task whose runtime was dropped sends into a closed
//! channel and its result is discarded.

use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, debug_span, info};
use web_time::Instant;

use crate::subscription::{Subscription, SubscriptionManager};

/// Application state and behavior.
pub trait Model: Sized {
    /// Messages that drive state transitions.
    type Message: Send + 'static;

    /// Startup commands, run once by [`Runtime::start`].
    fn init(&mut self) -> Cmd<Self::Message> {
        Cmd::none()
    }

    /// Apply one message.
    fn update(&mut self, msg: Self::Message) -> Cmd<Self::Message>;

    /// Timer hook, called on every pump whose tick is due.
    fn on_tick(&mut self, _now: Instant) -> Cmd<Self::Message> {
        Cmd::none()
    }

    /// Declare active subscriptions.
    ///
    /// Called after each `update()`; the runtime starts and stops
    /// subscriptions by id to match the returned set.
    fn subscriptions(&self) -> Vec<Box<dyn Subscription<Self::Message>>> {
        vec![]
    }
}

/// Side effects requested by a model.
#[derive(Default)]
pub enum Cmd<M> {
    /// No operation.
    #[default]
    None,
    /// Stop the runtime.
    Quit,
    /// Execute multiple commands (sequentially).
    Batch(Vec<Cmd<M>>),
    /// Execute commands in order, stopping early on quit.
    Sequence(Vec<Cmd<M>>),
    /// Send a message to the model.
    Msg(M),
    /// Set the tick interval.
    Tick(Duration),
    /// Emit a log line through `tracing`.
    Log(String),
    /// Execute a blocking operation on a background thread.
    ///
    /// The closure's return value comes back as a message on a later pump.
    Task(Box<dyn FnOnce() -> M + Send>),
}

impl<M: std::fmt::Debug> std::fmt::Debug for Cmd<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Quit => write!(f, "Quit"),
            Self::Batch(cmds) => f.debug_tuple("Batch").field(cmds).finish(),
            Self::Sequence(cmds) => f.debug_tuple("Sequence").field(cmds).finish(),
            Self::Msg(m) => f.debug_tuple("Msg").field(m).finish(),
            Self::Tick(d) => f.debug_tuple("Tick").field(d).finish(),
            Self::Log(s) => f.debug_tuple("Log").field(s).finish(),
            Self::Task(_) => write!(f, "Task(...)"),
        }
    }
}

impl<M> Cmd<M> {
    /// Create a no-op command.
    #[inline]
    pub fn none() -> Self {
        Self::None
    }

    /// Create a quit command.
    #[inline]
    pub fn quit() -> Self {
        Self::Quit
    }

    /// Create a message command.
    #[inline]
    pub fn msg(m: M) -> Self {
        Self::Msg(m)
    }

    /// Create a log command.
    #[inline]
    pub fn log(msg: impl Into<String>) -> Self {
        Self::Log(msg.into())
    }

    /// Create a background task command.
    pub fn task<F>(f: F) -> Self
    where
        F: FnOnce() -> M + Send + 'static,
    {
        Self::Task(Box::new(f))
    }

    /// Create a batch of commands.
    pub fn batch(cmds: Vec<Self>) -> Self {
        let mut cmds: Vec<Self> = cmds.into_iter().filter(|c| !c.is_none()).collect();
        match cmds.len() {
            0 => Self::None,
            1 => cmds.pop().unwrap_or(Self::None),
            _ => Self::Batch(cmds),
        }
    }

    /// Create a sequence of commands.
    pub fn sequence(cmds: Vec<Self>) -> Self {
        if cmds.is_empty() {
            Self::None
        } else {
            Self::Sequence(cmds)
        }
    }

    /// Whether this is `Cmd::None`.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Number of background tasks contained (recursively).
    #[must_use]
    pub fn task_count(&self) -> usize {
        match self {
            Self::Task(_) => 1,
            Self::Batch(cmds) | Self::Sequence(cmds) => cmds.iter().map(Self::task_count).sum(),
            _ => 0,
        }
    }
}

/// Runtime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub messages: u64,
    pub tasks_spawned: u64,
    pub task_results: u64,
    pub ticks: u64,
}

/// Headless update loop.
pub struct Runtime<M: Model> {
    model: M,
    running: bool,
    tick_rate: Option<Duration>,
    last_tick: Option<Instant>,
    task_sender: mpsc::Sender<M::Message>,
    task_receiver: mpsc::Receiver<M::Message>,
    task_handles: Vec<JoinHandle<()>>,
    subscriptions: SubscriptionManager<M::Message>,
    stats: RuntimeStats,
}

impl<M: Model> Runtime<M> {
    /// Wrap a model. Call [`start`](Self::start) to run its `init` commands.
    pub fn new(model: M) -> Self {
        let (task_sender, task_receiver) = mpsc::channel();
        Self {
            model,
            running: true,
            tick_rate: None,
            last_tick: None,
            task_sender,
            task_receiver,
            task_handles: Vec::new(),
            subscriptions: SubscriptionManager::new(),
            stats: RuntimeStats::default(),
        }
    }

    /// Run `Model::init` and reconcile subscriptions.
    pub fn start(&mut self) {
        let cmd = self.model.init();
        self.execute_cmd(cmd);
        self.reconcile_subscriptions();
    }

    /// The model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Mutable model access (bypasses the message loop).
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Whether `Cmd::Quit` has not been executed yet.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Counters.
    #[must_use]
    pub fn stats(&self) -> RuntimeStats {
        self.stats
    }

    /// Background tasks not yet reaped.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.task_handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Number of running subscriptions.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.active_count()
    }

    /// Apply one message and execute its commands.
    pub fn dispatch(&mut self, msg: M::Message) {
        self.apply(msg);
        self.reconcile_subscriptions();
    }

    /// Deliver task results and subscription messages, then tick if due.
    pub fn pump_at(&mut self, now: Instant) {
        let _span = debug_span!("runtime_pump").entered();
        let mut dirty = false;
        while let Ok(msg) = self.task_receiver.try_recv() {
            self.stats.task_results += 1;
            self.apply(msg);
            dirty = true;
        }
        for msg in self.subscriptions.drain_messages() {
            self.apply(msg);
            dirty = true;
        }
        if self.tick_due(now) {
            self.last_tick = Some(now);
            self.stats.ticks += 1;
            let cmd = self.model.on_tick(now);
            self.execute_cmd(cmd);
            dirty = true;
        }
        if dirty {
            self.reconcile_subscriptions();
        }
        self.reap_finished_tasks();
    }

    /// Pump with the current time.
    pub fn pump(&mut self) {
        self.pump_at(Instant::now());
    }

    /// Block up to `timeout` for one task result and apply it.
    ///
    /// Returns `false` on timeout.
    pub fn wait_for_task(&mut self, timeout: Duration) -> bool {
        match self.task_receiver.recv_timeout(timeout) {
            Ok(msg) => {
                self.stats.task_results += 1;
                self.apply(msg);
                self.reconcile_subscriptions();
                self.reap_finished_tasks();
                true
            }
            Err(_) => false,
        }
    }

    /// Block up to `timeout` for one subscription message and apply it.
    pub fn wait_for_subscription(&mut self, timeout: Duration) -> bool {
        match self.subscriptions.recv_timeout(timeout) {
            Some(msg) => {
                self.apply(msg);
                self.reconcile_subscriptions();
                true
            }
            None => false,
        }
    }

    /// Pump repeatedly for `duration`, sleeping the tick interval between pumps.
    pub fn run_for(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let step = self.tick_rate.unwrap_or(Duration::from_millis(16));
        while self.running {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            self.pump_at(now);
            std::thread::sleep(step.min(deadline.saturating_duration_since(now)));
        }
    }

    /// Stop subscriptions and consume the runtime, returning the model.
    pub fn into_model(mut self) -> M {
        self.subscriptions.stop_all();
        let Self { model, .. } = self;
        model
    }

    fn tick_due(&self, now: Instant) -> bool {
        match (self.tick_rate, self.last_tick) {
            (None, _) | (Some(_), None) => true,
            (Some(rate), Some(last)) => now.saturating_duration_since(last) >= rate,
        }
    }

    fn apply(&mut self, msg: M::Message) {
        self.stats.messages += 1;
        let cmd = self.model.update(msg);
        self.execute_cmd(cmd);
    }

    fn reconcile_subscriptions(&mut self) {
        let subs = self.model.subscriptions();
        self.subscriptions.reconcile(subs);
    }

    fn execute_cmd(&mut self, cmd: Cmd<M::Message>) {
        match cmd {
            Cmd::None => {}
            Cmd::Quit => {
                debug!("quit requested");
                self.running = false;
            }
            Cmd::Msg(m) => self.apply(m),
            Cmd::Batch(cmds) => {
                for c in cmds {
                    self.execute_cmd(c);
                }
            }
            Cmd::Sequence(cmds) => {
                for c in cmds {
                    self.execute_cmd(c);
                    if !self.running {
                        break;
                    }
                }
            }
            Cmd::Tick(duration) => {
                self.tick_rate = Some(duration);
            }
            Cmd::Log(text) => {
                info!(target: "cmo_runtime::log", "{}", text.trim_end());
            }
            Cmd::Task(f) => {
                self.stats.tasks_spawned += 1;
                let sender = self.task_sender.clone();
                let handle = std::thread::spawn(move || {
                    let msg = f();
                    let _ = sender.send(msg);
                });
                self.task_handles.push(handle);
            }
        }
    }

    fn reap_finished_tasks(&mut self) {
        if self.task_handles.is_empty() {
            return;
        }

        let mut remaining = Vec::with_capacity(self.task_handles.len());
        for handle in self.task_handles.drain(..) {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                remaining.push(handle);
            }
        }
        self.task_handles = remaining;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<i32>,
        ticks: u32,
    }

    #[derive(Debug)]
    enum Msg {
        Value(i32),
        Spawn(i32),
        Chain,
        Quit,
    }

    impl Model for Recorder {
        type Message = Msg;

        fn update(&mut self, msg: Msg) -> Cmd<Msg> {
            match msg {
                Msg::Value(v) => {
                    self.seen.push(v);
                    Cmd::none()
                }
                Msg::Spawn(v) => Cmd::task(move || Msg::Value(v * 10)),
                Msg::Chain => Cmd::batch(vec![Cmd::msg(Msg::Value(1)), Cmd::msg(Msg::Value(2))]),
                Msg::Quit => Cmd::sequence(vec![Cmd::quit(), Cmd::msg(Msg::Value(99))]),
            }
        }

        fn on_tick(&mut self, _now: Instant) -> Cmd<Msg> {
            self.ticks += 1;
            Cmd::none()
        }
    }

    #[test]
    fn batch_collapses_trivial_cases() {
        let empty: Cmd<i32> = Cmd::batch(vec![]);
        assert!(empty.is_none());
        let single: Cmd<i32> = Cmd::batch(vec![Cmd::none(), Cmd::msg(1)]);
        assert!(matches!(single, Cmd::Msg(1)));
    }

    #[test]
    fn task_count_recurses() {
        let cmd: Cmd<i32> = Cmd::batch(vec![
            Cmd::task(|| 1),
            Cmd::sequence(vec![Cmd::task(|| 2), Cmd::msg(3)]),
        ]);
        assert_eq!(cmd.task_count(), 2);
    }

    #[test]
    fn messages_apply_in_order() {
        let mut rt = Runtime::new(Recorder::default());
        rt.dispatch(Msg::Chain);
        rt.dispatch(Msg::Value(3));
        assert_eq!(rt.model().seen, vec![1, 2, 3]);
        assert_eq!(rt.stats().messages, 4);
    }

    #[test]
    fn task_result_returns_as_message() {
        let mut rt = Runtime::new(Recorder::default());
        rt.dispatch(Msg::Spawn(4));
        assert!(rt.wait_for_task(Duration::from_secs(2)));
        assert_eq!(rt.model().seen, vec![40]);
        assert_eq!(rt.stats().tasks_spawned, 1);
    }

    #[test]
    fn sequence_stops_after_quit() {
        let mut rt = Runtime::new(Recorder::default());
        rt.dispatch(Msg::Quit);
        assert!(!rt.is_running());
        assert!(rt.model().seen.is_empty());
    }

    #[test]
    fn tick_rate_limits_on_tick() {
        let t0 = Instant::now();
        let mut rt = Runtime::new(Recorder::default());
        rt.execute_cmd(Cmd::Tick(Duration::from_millis(100)));
        rt.pump_at(t0);
        rt.pump_at(t0 + Duration::from_millis(50));
        rt.pump_at(t0 + Duration::from_millis(100));
        assert_eq!(rt.model().ticks, 2);
    }

    #[test]
    fn late_results_are_discarded_after_teardown() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::{Arc, mpsc};

        let (release, gate) = mpsc::channel::<()>();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let mut rt = Runtime::new(Recorder::default());
        rt.execute_cmd(Cmd::task(move || {
            let _ = gate.recv_timeout(Duration::from_secs(2));
            flag.store(true, Ordering::SeqCst);
            Msg::Value(7)
        }));
        assert_eq!(rt.pending_tasks(), 1);

        let model = rt.into_model();
        release.send(()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !finished.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(finished.load(Ordering::SeqCst));
        std::thread::sleep(Duration::from_millis(10));
        assert!(model.seen.is_empty());
    }
}
