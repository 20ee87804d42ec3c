//! Centralized real-time chat relay with a file-upload side channel.
//!
//! Clients connect over TCP, register a display name, and exchange broadcast
//! and private messages through the server. A second listener speaks a small
//! binary protocol for uploading files that were announced in chat. Each
//! module focuses on a concrete responsibility:
//!
//! - [`cli`] parses the command-line interface for the server binary.
//! - [`server`] owns the two accept loops and wires shared state into
//!   per-connection handlers.
//! - [`session`] runs one client's line-oriented command loop.
//! - [`directory`] tracks the live set of registered sessions.
//! - [`router`] fans messages out over directory snapshots.
//! - [`registry`] records metadata for announced files.
//! - [`transfer`] implements the length-prefixed upload protocol and writes
//!   the received bytes to disk.
//!
//! Integration tests drive a real server over loopback TCP; unit tests
//! exercise the stores and the wire helpers directly.

pub mod cli;
pub mod directory;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod transfer;
