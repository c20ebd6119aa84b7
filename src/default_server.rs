//! Process-wide default server
//!
//! A single shared [`ServeMux`] that the free functions below register
//! into, mirroring the registration and serve operations of an owned
//! server. The mux is created on first use of any function here
//! (`LazyLock`); there is no other module-load state.

use std::sync::{Arc, LazyLock};

use anyhow::Result;

use crate::handler::{Handler, ReadFn, ServeMux, WriteFn};
use crate::server;

static DEFAULT_MUX: LazyLock<Arc<ServeMux>> = LazyLock::new(|| Arc::new(ServeMux::new()));

/// The dispatch table used by [`listen_and_serve`] when no handler is
/// given.
pub fn default_mux() -> Arc<ServeMux> {
    Arc::clone(&DEFAULT_MUX)
}

/// Register `handler` for `path` on the default mux.
pub fn handle(path: impl Into<String>, handler: Arc<dyn Handler>) {
    DEFAULT_MUX.handle(path, handler);
}

/// Register a callback pair for `path` on the default mux. Either
/// callback may be `None` (that side answers file-not-found).
pub fn handle_func(path: impl Into<String>, read: Option<ReadFn>, write: Option<WriteFn>) {
    DEFAULT_MUX.handle_func(path, read, write);
}

/// Listen on `addr` and serve with `handler`, or with the default mux
/// when `handler` is `None`.
pub fn listen_and_serve(addr: impl Into<String>, handler: Option<Arc<dyn Handler>>) -> Result<()> {
    let handler = handler.unwrap_or_else(|| default_mux() as Arc<dyn Handler>);
    server::listen_and_serve(addr, handler)
}
