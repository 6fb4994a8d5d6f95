//! Line-relay chat over plain TCP.
//!
//! A server hands every connection a unique username and relays each line a
//! client sends to everyone else; a terminal client sends a username, then
//! lines, and prints whatever comes back.
//!
//! - [`registry`] tracks which connection holds which username.
//! - [`broadcast`] fans a chat line out to every connection but its origin.
//! - [`session`] is the per-connection state machine on the server.
//! - [`server`] accepts connections and owns the error policy.
//! - [`client`] multiplexes operator input with server output.
//! - [`frame`] cuts byte streams into messages, [`connection`] writes them.
//! - [`cli`] and [`logging`] are shared by the two binaries.

pub mod broadcast;
pub mod cli;
pub mod client;
pub mod connection;
pub mod error;
pub mod frame;
pub mod logging;
pub mod registry;
pub mod server;
pub mod session;
