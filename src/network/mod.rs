//! Socket plumbing for the event loop

mod client;
mod listener;

pub use client::{Client, ClientSet, ClientState};
pub(crate) use client::Sweep;
pub use listener::bind_listener;
