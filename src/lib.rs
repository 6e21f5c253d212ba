//! A TFTP (RFC 1350) read/write file-transfer server.
//!
//! [`packet`] is the wire codec, [`io`] adapts it to a UDP socket,
//! [`server`] is the listener/dispatcher, [`engine`] is the per-session
//! transfer state machine, and [`opener`] resolves requests to files.

pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod opener;
pub mod packet;
pub mod server;
