//! TFTP server implementation
//!
//! - `server`: request listener, parses and dispatches RRQ/WRQ
//! - `worker`: per-transfer workers and the DATA/ACK state machines
//! - `config`: server configuration

mod config;
mod server;
mod worker;

pub use config::{Config, DEFAULT_ADDR};
pub use server::{Server, listen_and_serve};
pub use worker::{ReadTransfer, Recv, WriteTransfer};
