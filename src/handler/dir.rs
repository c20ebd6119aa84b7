use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::debug;

use crate::core::ProtocolError;
use crate::handler::{Handler, Request};
use crate::server::{ReadTransfer, WriteTransfer};

/// Serves the files under a directory, read-only.
///
/// Write requests are always rejected with access-violation, and
/// requests naming a directory with file-not-found. Storage failures map
/// onto protocol error codes via [`ProtocolError::from_io`].
pub struct DirHandler {
    root: PathBuf,
}

impl DirHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a requested filename inside the root, refusing anything
    /// that escapes it.
    fn resolve(&self, filename: &str) -> Result<PathBuf, ProtocolError> {
        let joined = self.root.join(filename.trim_start_matches('/'));
        let root = canonical(&self.root)?;
        let path = canonical(&joined)?;
        if !path.starts_with(&root) {
            return Err(ProtocolError::access_violation());
        }
        Ok(path)
    }
}

fn canonical(path: &Path) -> Result<PathBuf, ProtocolError> {
    path.canonicalize().map_err(|e| ProtocolError::from_io(&e))
}

impl Handler for DirHandler {
    fn serve_read(&self, w: &mut ReadTransfer, req: &Request) -> Result<()> {
        let path = self.resolve(&req.filename)?;
        let meta = std::fs::metadata(&path).map_err(|e| ProtocolError::from_io(&e))?;
        if meta.is_dir() {
            return Err(ProtocolError::file_not_found().into());
        }
        let mut file = File::open(&path).map_err(|e| ProtocolError::from_io(&e))?;
        debug!("serving {} ({} bytes)", path.display(), meta.len());
        io::copy(&mut file, w)?;
        w.finish()?;
        Ok(())
    }

    fn serve_write(&self, _r: &mut WriteTransfer, _req: &Request) -> Result<()> {
        Err(ProtocolError::access_violation().into())
    }
}
