//! Request handlers
//!
//! The engine hands every accepted transfer to a [`Handler`]:
//! - `mux`: exact-filename dispatch table
//! - `dir`: read-only directory-backed handler
//!
//! A handler that returns an error ends the transfer with an ERROR
//! packet; errors that are not already a
//! [`ProtocolError`](crate::core::ProtocolError) reach the peer as
//! not-defined with the error's text.

mod dir;
mod mux;

use anyhow::Result;

use crate::core::{Mode, ProtocolError};
use crate::server::{ReadTransfer, WriteTransfer};

pub use dir::DirHandler;
pub use mux::ServeMux;

/// One accepted RRQ or WRQ, as decoded from the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub filename: String,
    pub mode: Mode,
}

/// Services accepted transfers.
///
/// `serve_read` answers an RRQ by writing the file's bytes into `w` and
/// calling [`ReadTransfer::finish`]; `serve_write` answers a WRQ by
/// draining `r`. Either side may reject the request by returning an
/// error.
pub trait Handler: Send + Sync {
    fn serve_read(&self, w: &mut ReadTransfer, req: &Request) -> Result<()>;
    fn serve_write(&self, r: &mut WriteTransfer, req: &Request) -> Result<()>;
}

/// Boxed read-request callback, the function form of [`Handler::serve_read`].
pub type ReadFn = Box<dyn Fn(&mut ReadTransfer, &Request) -> Result<()> + Send + Sync>;

/// Boxed write-request callback, the function form of [`Handler::serve_write`].
pub type WriteFn = Box<dyn Fn(&mut WriteTransfer, &Request) -> Result<()> + Send + Sync>;

/// Adapts a pair of optional callbacks into a [`Handler`].
///
/// A missing callback behaves like [`NotFoundHandler`] for that side.
pub struct FuncHandler {
    read: Option<ReadFn>,
    write: Option<WriteFn>,
}

impl FuncHandler {
    pub fn new(read: Option<ReadFn>, write: Option<WriteFn>) -> Self {
        Self { read, write }
    }
}

impl Handler for FuncHandler {
    fn serve_read(&self, w: &mut ReadTransfer, req: &Request) -> Result<()> {
        match &self.read {
            Some(f) => f(w, req),
            None => NotFoundHandler.serve_read(w, req),
        }
    }

    fn serve_write(&self, r: &mut WriteTransfer, req: &Request) -> Result<()> {
        match &self.write {
            Some(f) => f(r, req),
            None => NotFoundHandler.serve_write(r, req),
        }
    }
}

/// Rejects every request with file-not-found.
///
/// The fallback used when no handler matches; also usable directly.
pub struct NotFoundHandler;

impl Handler for NotFoundHandler {
    fn serve_read(&self, _w: &mut ReadTransfer, _req: &Request) -> Result<()> {
        Err(ProtocolError::file_not_found().into())
    }

    fn serve_write(&self, _r: &mut WriteTransfer, _req: &Request) -> Result<()> {
        Err(ProtocolError::file_not_found().into())
    }
}
