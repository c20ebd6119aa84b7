use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;

use crate::handler::{FuncHandler, Handler, NotFoundHandler, ReadFn, Request, WriteFn};
use crate::server::{ReadTransfer, WriteTransfer};

/// Dispatch table keyed on the exact requested filename.
///
/// Registration is allowed after the mux has been handed to a running
/// server; requests for unregistered names fall back to
/// [`NotFoundHandler`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tftpd::handler::ServeMux;
///
/// let mux = Arc::new(ServeMux::new());
/// mux.handle_func(
///     "motd",
///     Some(Box::new(|w, _req| {
///         std::io::Write::write_all(w, b"hello\n")?;
///         w.finish()?;
///         Ok(())
///     })),
///     None,
/// );
/// ```
pub struct ServeMux {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl ServeMux {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register `handler` for requests naming exactly `path`.
    pub fn handle(&self, path: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers
            .write()
            .expect("mux lock poisoned")
            .insert(path.into(), handler);
    }

    /// Register a callback pair for `path`. Either callback may be
    /// `None`, in which case that side answers file-not-found.
    pub fn handle_func(&self, path: impl Into<String>, read: Option<ReadFn>, write: Option<WriteFn>) {
        self.handle(path, Arc::new(FuncHandler::new(read, write)));
    }

    fn lookup(&self, filename: &str) -> Option<Arc<dyn Handler>> {
        // Clone out of the map so the lock is not held while the
        // handler blocks on the transfer.
        self.handlers
            .read()
            .expect("mux lock poisoned")
            .get(filename)
            .cloned()
    }
}

impl Default for ServeMux {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for ServeMux {
    fn serve_read(&self, w: &mut ReadTransfer, req: &Request) -> Result<()> {
        match self.lookup(&req.filename) {
            Some(h) => h.serve_read(w, req),
            None => NotFoundHandler.serve_read(w, req),
        }
    }

    fn serve_write(&self, r: &mut WriteTransfer, req: &Request) -> Result<()> {
        match self.lookup(&req.filename) {
            Some(h) => h.serve_write(r, req),
            None => NotFoundHandler.serve_write(r, req),
        }
    }
}
