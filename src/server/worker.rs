use std::io::{self, Read, Write};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::core::convert::{from_netascii, to_netascii};
use crate::core::{
    BLOCK_SIZE, MAX_DATA_PACKET_SIZE, Mode, OP_ACK, OP_DATA, ProtocolError, encode_ack,
    encode_data, encode_error,
};
use crate::handler::{Handler, Request};

/// Which direction an accepted request moves bytes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransferKind {
    /// RRQ, server to client.
    Read,
    /// WRQ, client to server.
    Write,
}

/// Body of one transfer worker thread.
///
/// Binds the transfer socket, invokes the handler with the matching
/// stream object, and turns a handler error into a final ERROR packet.
/// The transfer socket closes when the stream object is dropped.
pub(crate) fn run(
    kind: TransferKind,
    peer: SocketAddr,
    req: Request,
    handler: Arc<dyn Handler>,
    timeout: Option<Duration>,
) {
    let socket = match transfer_socket(peer, timeout) {
        Ok(s) => s,
        Err(e) => {
            warn!("no transfer socket for {peer}: {e}");
            return;
        }
    };
    // Kept for the final ERROR packet; the stream owns the original.
    let err_socket = match socket.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!("cannot clone transfer socket for {peer}: {e}");
            return;
        }
    };

    let result = match kind {
        TransferKind::Read => {
            let mut w = ReadTransfer::new(socket, req.mode);
            handler.serve_read(&mut w, &req)
        }
        TransferKind::Write => {
            let mut r = WriteTransfer::new(socket, req.mode);
            handler.serve_write(&mut r, &req)
        }
    };

    match result {
        Ok(()) => debug!("transfer with {peer} finished: {:?}", req.filename),
        Err(err) => {
            let proto = ProtocolError::coerce(&err);
            warn!("transfer with {peer} failed: {proto}");
            send_error(&err_socket, &proto);
        }
    }
}

/// Bind a fresh ephemeral socket and dedicate it to `peer`.
///
/// This socket pair is the transfer ID of RFC 1350 §4; the well-known
/// listening port is never used for DATA/ACK.
fn transfer_socket(peer: SocketAddr, timeout: Option<Duration>) -> io::Result<UdpSocket> {
    let bind_addr = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind_addr)?;
    socket.connect(peer)?;
    socket.set_read_timeout(timeout)?;
    Ok(socket)
}

/// Best-effort ERROR packet on a connected transfer socket.
fn send_error(socket: &UdpSocket, err: &ProtocolError) {
    if let Err(e) = socket.send(&encode_error(err.code(), err.message())) {
        warn!("failed to send error packet: {e}");
    }
}

/// The byte sink handed to [`Handler::serve_read`].
///
/// Bytes written here are framed into DATA blocks of [`BLOCK_SIZE`] and
/// sent as they fill up; each block send waits for the matching ACK
/// before the write call returns. [`finish`](Self::finish) flushes the
/// short (possibly empty) final block that tells the peer the transfer
/// is complete; a handler that returns without calling it leaves the
/// transfer unterminated on the wire.
///
/// Owns its transfer socket; dropping the value closes it.
pub struct ReadTransfer {
    socket: UdpSocket,
    mode: Mode,
    buf: Vec<u8>,
    block: u16,
    done: bool,
}

impl ReadTransfer {
    pub(crate) fn new(socket: UdpSocket, mode: Mode) -> Self {
        Self {
            socket,
            mode,
            buf: Vec::with_capacity(BLOCK_SIZE),
            block: 1,
            done: false,
        }
    }

    /// Send one DATA block and wait for its ACK.
    ///
    /// ACKs for other block numbers are ignored and the wait continues;
    /// anything that is not an ACK ends the transfer with an ERROR.
    fn send_block(&mut self, payload: &[u8]) -> io::Result<()> {
        if let Err(e) = self.socket.send(&encode_data(self.block, payload)) {
            send_error(&self.socket, &ProtocolError::not_defined(""));
            return Err(e);
        }

        let mut reply = [0u8; MAX_DATA_PACKET_SIZE];
        loop {
            let n = match self.socket.recv(&mut reply) {
                Ok(n) => n,
                Err(e) => {
                    send_error(&self.socket, &ProtocolError::not_defined(""));
                    return Err(e);
                }
            };
            if n < 4 {
                return Err(self.violation(ProtocolError::format_error()));
            }
            let op = u16::from_be_bytes([reply[0], reply[1]]);
            if op != OP_ACK {
                return Err(self.violation(ProtocolError::illegal_operation()));
            }
            let acked = u16::from_be_bytes([reply[2], reply[3]]);
            if acked == self.block {
                break;
            }
            // Stale or duplicate ACK; keep waiting for ours.
        }

        self.block = self.block.wrapping_add(1);
        Ok(())
    }

    fn violation(&self, err: ProtocolError) -> io::Error {
        send_error(&self.socket, &err);
        io::Error::from(err)
    }

    /// Flush the remaining buffered bytes as the final DATA block and
    /// mark the transfer complete.
    ///
    /// The final block is sent even when empty: a block shorter than
    /// [`BLOCK_SIZE`] is the wire signal for end-of-transfer.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        let tail = std::mem::take(&mut self.buf);
        self.send_block(&tail)
    }
}

impl Write for ReadTransfer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.done {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "transfer already finished",
            ));
        }

        let translated;
        let mut rest: &[u8] = if self.mode == Mode::Netascii {
            translated = to_netascii(data);
            &translated
        } else {
            data
        };

        while !rest.is_empty() {
            let take = (BLOCK_SIZE - self.buf.len()).min(rest.len());
            self.buf.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.buf.len() == BLOCK_SIZE {
                let full = std::mem::take(&mut self.buf);
                self.send_block(&full)?;
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // A partial block cannot be flushed without ending the transfer;
        // that is finish()'s job.
        Ok(())
    }
}

/// Outcome of one [`WriteTransfer::recv`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recv {
    /// Bytes were delivered into the caller's buffer.
    Block(usize),
    /// A duplicate or out-of-order DATA frame was dropped; nothing was
    /// acknowledged or delivered. Call again. Distinct from `Eof` on
    /// purpose.
    Retry,
    /// The transfer is complete; the socket will not be touched again.
    Eof,
}

/// The byte source handed to [`Handler::serve_write`].
///
/// Receives one DATA frame at a time, acknowledging each in-order block
/// and translating netascii line endings back to `\n`. ACK(0) is sent
/// exactly once to solicit the first block. A frame shorter than the
/// maximum DATA packet marks end-of-transfer.
///
/// Owns its transfer socket; dropping the value closes it.
pub struct WriteTransfer {
    socket: UdpSocket,
    mode: Mode,
    expected: u16,
    zero_acked: bool,
    closed: bool,
    /// Payload accepted from the wire but not yet drained by the caller.
    pending: Vec<u8>,
}

impl WriteTransfer {
    pub(crate) fn new(socket: UdpSocket, mode: Mode) -> Self {
        Self {
            socket,
            mode,
            expected: 1,
            zero_acked: false,
            closed: false,
            pending: Vec::new(),
        }
    }

    fn ack(&mut self, block: u16) -> io::Result<()> {
        if let Err(e) = self.socket.send(&encode_ack(block)) {
            self.closed = true;
            return Err(e);
        }
        Ok(())
    }

    fn fail(&mut self, err: ProtocolError) -> io::Error {
        send_error(&self.socket, &err);
        self.closed = true;
        io::Error::from(err)
    }

    /// Deliver up to `buf.len()` bytes of the next in-order block.
    ///
    /// See [`Recv`] for the three possible outcomes. A delivered block
    /// larger than `buf` is held back and drained by subsequent calls.
    pub fn recv(&mut self, buf: &mut [u8]) -> io::Result<Recv> {
        if !self.pending.is_empty() {
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            return Ok(Recv::Block(n));
        }
        if self.closed {
            return Ok(Recv::Eof);
        }

        if !self.zero_acked {
            self.ack(0)?;
            self.zero_acked = true;
        }

        let mut frame = [0u8; MAX_DATA_PACKET_SIZE];
        let n = match self.socket.recv(&mut frame) {
            Ok(n) => n,
            Err(e) => {
                send_error(&self.socket, &ProtocolError::not_defined(""));
                self.closed = true;
                return Err(e);
            }
        };
        if n < 4 {
            return Err(self.fail(ProtocolError::format_error()));
        }
        let op = u16::from_be_bytes([frame[0], frame[1]]);
        if op != OP_DATA {
            return Err(self.fail(ProtocolError::illegal_operation()));
        }
        let block = u16::from_be_bytes([frame[2], frame[3]]);
        if block != self.expected {
            return Ok(Recv::Retry);
        }

        self.expected = self.expected.wrapping_add(1);
        self.ack(block)?;

        // A short frame is the end-of-transfer signal.
        if n < MAX_DATA_PACKET_SIZE {
            self.closed = true;
        }

        let payload = &frame[4..n];
        let data = if self.mode == Mode::Netascii {
            from_netascii(payload)
        } else {
            payload.to_vec()
        };

        let delivered = buf.len().min(data.len());
        buf[..delivered].copy_from_slice(&data[..delivered]);
        if delivered < data.len() {
            self.pending.extend_from_slice(&data[delivered..]);
        }
        Ok(Recv::Block(delivered))
    }
}

impl Read for WriteTransfer {
    /// `io::Read` view of the transfer: dropped out-of-order frames are
    /// retried internally, so `Ok(0)` here always means end-of-stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.recv(buf)? {
                Recv::Block(n) => return Ok(n),
                Recv::Retry => continue,
                Recv::Eof => return Ok(0),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::core::Packet;

    fn pair() -> (UdpSocket, UdpSocket) {
        let a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").unwrap();
        a.connect(b.local_addr().unwrap()).unwrap();
        b.connect(a.local_addr().unwrap()).unwrap();
        (a, b)
    }

    fn recv_packet(socket: &UdpSocket) -> Packet {
        let mut buf = [0u8; MAX_DATA_PACKET_SIZE];
        let n = socket.recv(&mut buf).unwrap();
        Packet::parse(&buf[..n]).unwrap()
    }

    /// Drive the client side of a read transfer, acking every block.
    fn ack_all_blocks(client: &UdpSocket) -> Vec<(u16, usize)> {
        let mut blocks = Vec::new();
        loop {
            match recv_packet(client) {
                Packet::Data { block, data } => {
                    client.send(&encode_ack(block)).unwrap();
                    let len = data.len();
                    blocks.push((block, len));
                    if len < BLOCK_SIZE {
                        return blocks;
                    }
                }
                other => panic!("expected DATA, got {other:?}"),
            }
        }
    }

    #[test]
    fn read_transfer_exact_multiple_ends_with_empty_block() {
        let (server, client) = pair();
        let sender = thread::spawn(move || {
            let mut w = ReadTransfer::new(server, Mode::Octet);
            w.write_all(&[0x42u8; 1024]).unwrap();
            w.finish().unwrap();
        });
        let blocks = ack_all_blocks(&client);
        sender.join().unwrap();
        assert_eq!(blocks, vec![(1, 512), (2, 512), (3, 0)]);
    }

    #[test]
    fn read_transfer_buffers_tail_until_finish() {
        let (server, client) = pair();
        let sender = thread::spawn(move || {
            let mut w = ReadTransfer::new(server, Mode::Octet);
            w.write_all(&[1u8; 600]).unwrap();
            w.write_all(&[2u8; 10]).unwrap();
            w.finish().unwrap();
        });
        let blocks = ack_all_blocks(&client);
        sender.join().unwrap();
        assert_eq!(blocks, vec![(1, 512), (2, 98)]);
    }

    #[test]
    fn read_transfer_translates_netascii_before_framing() {
        let (server, client) = pair();
        let sender = thread::spawn(move || {
            let mut w = ReadTransfer::new(server, Mode::Netascii);
            w.write_all(b"a\nb\r\nc").unwrap();
            w.finish().unwrap();
        });
        match recv_packet(&client) {
            Packet::Data { block, data } => {
                assert_eq!(block, 1);
                assert_eq!(data, b"a\r\nb\r\nc");
                client.send(&encode_ack(block)).unwrap();
            }
            other => panic!("expected DATA, got {other:?}"),
        }
        sender.join().unwrap();
    }

    #[test]
    fn read_transfer_ignores_acks_for_other_blocks() {
        let (server, client) = pair();
        let sender = thread::spawn(move || {
            let mut w = ReadTransfer::new(server, Mode::Octet);
            w.write_all(b"hi").unwrap();
            w.finish().unwrap();
        });
        match recv_packet(&client) {
            Packet::Data { block: 1, .. } => {
                client.send(&encode_ack(9)).unwrap();
                client.send(&encode_ack(0)).unwrap();
                client.send(&encode_ack(1)).unwrap();
            }
            other => panic!("expected DATA block 1, got {other:?}"),
        }
        sender.join().unwrap();
    }

    #[test]
    fn read_transfer_rejects_non_ack_reply() {
        let (server, client) = pair();
        let violator = thread::spawn(move || match recv_packet(&client) {
            Packet::Data { .. } => {
                client.send(&encode_data(1, b"nope")).unwrap();
                recv_packet(&client)
            }
            other => panic!("expected DATA, got {other:?}"),
        });

        let mut w = ReadTransfer::new(server, Mode::Octet);
        let err = w.write_all(&[0u8; 512]).unwrap_err();
        let proto = err
            .get_ref()
            .and_then(|e| e.downcast_ref::<ProtocolError>())
            .expect("protocol error in chain");
        assert_eq!(*proto, ProtocolError::illegal_operation());
        // The code survives coercion, so the final ERROR is not code 0.
        assert_eq!(
            ProtocolError::coerce(&anyhow::Error::from(err)),
            ProtocolError::illegal_operation()
        );

        // The peer was told as well.
        match violator.join().unwrap() {
            Packet::Error { code, .. } => assert_eq!(code, 4),
            other => panic!("expected ERROR, got {other:?}"),
        }
    }

    #[test]
    fn write_transfer_single_short_block() {
        let (server, client) = pair();
        let peer = thread::spawn(move || {
            assert_eq!(recv_packet(&client), Packet::Ack(0));
            client.send(&encode_data(1, b"hello tftp")).unwrap();
            assert_eq!(recv_packet(&client), Packet::Ack(1));
        });

        let mut r = WriteTransfer::new(server, Mode::Octet);
        let mut buf = [0u8; 600];
        assert_eq!(r.recv(&mut buf).unwrap(), Recv::Block(10));
        assert_eq!(&buf[..10], b"hello tftp");
        // Transfer closed; no further socket traffic.
        assert_eq!(r.recv(&mut buf).unwrap(), Recv::Eof);
        assert_eq!(r.read(&mut buf).unwrap(), 0);
        peer.join().unwrap();
    }

    #[test]
    fn write_transfer_drops_out_of_order_block() {
        let (server, client) = pair();
        client
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        let mut r = WriteTransfer::new(server, Mode::Octet);
        let mut buf = [0u8; 600];

        let peer = thread::spawn(move || {
            let mut pkt = [0u8; MAX_DATA_PACKET_SIZE];
            let n = client.recv(&mut pkt).unwrap();
            assert_eq!(Packet::parse(&pkt[..n]).unwrap(), Packet::Ack(0));
            client.send(&encode_data(2, b"early")).unwrap();
            // The stray block must not be acknowledged.
            assert!(client.recv(&mut pkt).is_err());
            client.send(&encode_data(1, b"first")).unwrap();
            let n = client.recv(&mut pkt).unwrap();
            assert_eq!(Packet::parse(&pkt[..n]).unwrap(), Packet::Ack(1));
        });

        assert_eq!(r.recv(&mut buf).unwrap(), Recv::Retry);
        assert_eq!(r.recv(&mut buf).unwrap(), Recv::Block(5));
        assert_eq!(&buf[..5], b"first");
        assert_eq!(r.recv(&mut buf).unwrap(), Recv::Eof);
        peer.join().unwrap();
    }

    #[test]
    fn write_transfer_translates_netascii() {
        let (server, client) = pair();
        let peer = thread::spawn(move || {
            assert_eq!(recv_packet(&client), Packet::Ack(0));
            client.send(&encode_data(1, b"a\r\nb")).unwrap();
            assert_eq!(recv_packet(&client), Packet::Ack(1));
        });

        let mut r = WriteTransfer::new(server, Mode::Netascii);
        let mut buf = [0u8; 16];
        assert_eq!(r.recv(&mut buf).unwrap(), Recv::Block(3));
        assert_eq!(&buf[..3], b"a\nb");
        peer.join().unwrap();
    }

    #[test]
    fn write_transfer_drains_large_block_across_calls() {
        let (server, client) = pair();
        let peer = thread::spawn(move || {
            assert_eq!(recv_packet(&client), Packet::Ack(0));
            client.send(&encode_data(1, b"abcdef")).unwrap();
            assert_eq!(recv_packet(&client), Packet::Ack(1));
        });

        let mut r = WriteTransfer::new(server, Mode::Octet);
        let mut buf = [0u8; 4];
        assert_eq!(r.recv(&mut buf).unwrap(), Recv::Block(4));
        assert_eq!(&buf, b"abcd");
        assert_eq!(r.recv(&mut buf).unwrap(), Recv::Block(2));
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(r.recv(&mut buf).unwrap(), Recv::Eof);
        peer.join().unwrap();
    }

    #[test]
    fn write_transfer_rejects_non_data_frame() {
        let (server, client) = pair();
        let peer = thread::spawn(move || {
            assert_eq!(recv_packet(&client), Packet::Ack(0));
            client.send(&encode_ack(1)).unwrap();
            recv_packet(&client)
        });

        let mut r = WriteTransfer::new(server, Mode::Octet);
        let mut buf = [0u8; 16];
        let err = r.recv(&mut buf).unwrap_err();
        let proto = err
            .get_ref()
            .and_then(|e| e.downcast_ref::<ProtocolError>())
            .expect("protocol error in chain");
        assert_eq!(*proto, ProtocolError::illegal_operation());
        // Session is closed for good.
        assert_eq!(r.recv(&mut buf).unwrap(), Recv::Eof);

        match peer.join().unwrap() {
            Packet::Error { code, .. } => assert_eq!(code, 4),
            other => panic!("expected ERROR, got {other:?}"),
        }
    }

    #[test]
    fn write_transfer_multi_block() {
        let (server, client) = pair();
        let payload: Vec<u8> = (0..517u32).map(|i| i as u8).collect();
        let first = payload[..BLOCK_SIZE].to_vec();
        let second = payload[BLOCK_SIZE..].to_vec();
        let peer = thread::spawn(move || {
            assert_eq!(recv_packet(&client), Packet::Ack(0));
            client.send(&encode_data(1, &first)).unwrap();
            assert_eq!(recv_packet(&client), Packet::Ack(1));
            client.send(&encode_data(2, &second)).unwrap();
            assert_eq!(recv_packet(&client), Packet::Ack(2));
        });

        let mut r = WriteTransfer::new(server, Mode::Octet);
        let mut got = Vec::new();
        r.read_to_end(&mut got).unwrap();
        assert_eq!(got, payload);
        peer.join().unwrap();
    }
}
