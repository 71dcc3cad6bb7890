//! Shared API, exported to `webtab-server`, `webtab-websocket` and the `webtab` binary.
//!
//! The wire protocol spoken over the socket is described in this crate: the frame envelope,
//! the commands a client sends, and the events the server streams back.

pub mod command;
pub mod config;
pub mod event;
pub mod frame;
pub mod log;
pub mod tab;
pub mod transport;
