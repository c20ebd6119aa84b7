use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::core::{Packet, ProtocolError, encode_error};
use crate::handler::{Handler, Request};
use crate::server::config::Config;
use crate::server::worker::{self, TransferKind};

const RECV_BUF_SIZE: usize = 4096;
const BACKOFF_INITIAL: Duration = Duration::from_millis(5);
const BACKOFF_MAX: Duration = Duration::from_secs(1);

/// The request listener.
///
/// Owns the well-known UDP socket, accepts RRQ/WRQ datagrams and spawns
/// one worker thread per accepted request. The actual DATA/ACK exchange
/// never touches this socket; each worker binds its own transfer socket
/// (RFC 1350 §4 transfer IDs).
pub struct Server {
    socket: UdpSocket,
    handler: Arc<dyn Handler>,
    timeout: Option<Duration>,
}

impl Server {
    /// Bind the listening socket described by `config`.
    pub fn bind(config: &Config, handler: Arc<dyn Handler>) -> Result<Self> {
        let socket = UdpSocket::bind(&config.addr)
            .with_context(|| format!("failed to bind to {}", config.addr))?;
        info!("TFTP server listening on {}", config.addr);
        Ok(Self {
            socket,
            handler,
            timeout: config.timeout,
        })
    }

    /// Address the listening socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Run the accept loop.
    ///
    /// Returns only when the listening socket fails with a non-transient
    /// error; per-request failures are answered on the wire and logged.
    pub fn serve(&self) -> Result<()> {
        let mut buf = [0u8; RECV_BUF_SIZE];
        let mut delay = Duration::ZERO;

        loop {
            let (n, peer) = match self.socket.recv_from(&mut buf) {
                Ok(recv) => {
                    delay = Duration::ZERO;
                    recv
                }
                Err(e) if is_transient(&e) => {
                    delay = if delay.is_zero() {
                        BACKOFF_INITIAL
                    } else {
                        (delay * 2).min(BACKOFF_MAX)
                    };
                    warn!("receive error: {e}; retrying in {delay:?}");
                    thread::sleep(delay);
                    continue;
                }
                Err(e) => return Err(e).context("receive on listening socket"),
            };

            match Packet::parse(&buf[..n]) {
                Ok(Packet::Rrq { filename, mode }) => {
                    self.dispatch(TransferKind::Read, peer, Request { filename, mode });
                }
                Ok(Packet::Wrq { filename, mode }) => {
                    self.dispatch(TransferKind::Write, peer, Request { filename, mode });
                }
                Ok(_) => {
                    // Only RRQ/WRQ may open a conversation on this socket.
                    debug!("non-request packet from {peer}");
                    self.reply_error(peer, &ProtocolError::illegal_operation());
                }
                Err(e) => {
                    debug!("bad request from {peer}: {e}");
                    self.reply_error(peer, &e);
                }
            }
        }
    }

    /// Spawn the transfer worker, then immediately go back to listening.
    fn dispatch(&self, kind: TransferKind, peer: SocketAddr, req: Request) {
        debug!("{kind:?} request from {peer}: {:?} ({})", req.filename, req.mode);
        let handler = Arc::clone(&self.handler);
        let timeout = self.timeout;
        let spawned = thread::Builder::new()
            .name(format!("tftp-{peer}"))
            .spawn(move || worker::run(kind, peer, req, handler, timeout));
        if let Err(e) = spawned {
            warn!("failed to spawn worker for {peer}: {e}");
        }
    }

    /// Best-effort ERROR reply on the listening socket.
    fn reply_error(&self, peer: SocketAddr, err: &ProtocolError) {
        let pkt = encode_error(err.code(), err.message());
        if let Err(e) = self.socket.send_to(&pkt, peer) {
            warn!("failed to send error packet to {peer}: {e}");
        }
    }
}

/// Errors worth retrying with backoff instead of killing the listener.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Bind `addr` and serve `handler` until the listener fails.
pub fn listen_and_serve(addr: impl Into<String>, handler: Arc<dyn Handler>) -> Result<()> {
    let config = Config::new().with_addr(addr);
    Server::bind(&config, handler)?.serve()
}
