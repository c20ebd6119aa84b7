//! TFTP (Trivial File Transfer Protocol) server engine
//!
//! Implements the server side of [RFC 1350](https://www.rfc-editor.org/rfc/rfc1350):
//! request parsing and dispatch, the DATA/ACK block exchange in both
//! directions, and netascii translation. Application logic plugs in
//! through the [`Handler`] trait and sees each transfer as a plain byte
//! stream.
//!
//! ## Module Structure
//!
//! ```text
//! tftpd/
//! ├── core/             # Protocol-pure building blocks
//! │   ├── packet        # Packet encoding/decoding
//! │   ├── error         # Protocol error codes
//! │   └── convert       # Netascii translation
//! │
//! ├── server/           # The engine
//! │   ├── server        # Request listener and dispatcher
//! │   ├── worker        # Per-transfer workers, stream state machines
//! │   └── config        # Server configuration
//! │
//! ├── handler/          # Request handlers
//! │   ├── mux           # Filename-keyed dispatch table
//! │   └── dir           # Read-only directory handler
//! │
//! └── default_server    # Process-wide default instance
//! ```
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tftpd::{Config, DirHandler, Server};
//!
//! let config = Config::new().with_addr("0.0.0.0:69");
//! let handler = Arc::new(DirHandler::new("/var/tftp"));
//! Server::bind(&config, handler).unwrap().serve().unwrap();
//! ```

pub mod core;
pub mod default_server;
pub mod handler;
pub mod server;

// Re-export commonly used types for convenience
pub use crate::core::{ErrorCode, Mode, Packet, ProtocolError};
pub use crate::handler::{DirHandler, FuncHandler, Handler, NotFoundHandler, Request, ServeMux};
pub use crate::server::{Config, ReadTransfer, Recv, Server, WriteTransfer};
