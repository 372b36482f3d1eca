#![forbid(unsafe_code)]

//! Runtime: the update loop that drives list models.
//!
//! # Role in the workspace
//! `cmo-runtime` serializes every state transition onto one logical thread.
//! Models return [`Cmd`] values for side effects; blocking work (page fetches)
//! runs as a background [`Cmd::Task`] and comes back as a message. Live data
//! arrives through [`Subscription`]s. Timers are explicit: [`Debouncer`] is
//! polled with an injected instant, so no timer ever fires behind the
//! model's back.

pub mod debounce;
pub mod program;
pub mod subscription;

pub use debounce::{Debounced, Debouncer};
pub use program::{Cmd, Model, Runtime};
pub use subscription::{StopSignal, SubId, Subscription, SubscriptionManager};
