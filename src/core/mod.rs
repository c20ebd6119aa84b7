//! Core TFTP protocol types
//!
//! Protocol-pure building blocks, no sockets:
//! - `packet`: packet encoding and decoding
//! - `error`: protocol error codes and coercion of handler errors
//! - `convert`: netascii line-ending translation

pub mod convert;
mod error;
mod packet;

pub use error::{ErrorCode, ProtocolError};
pub use packet::{BLOCK_SIZE, MAX_DATA_PACKET_SIZE, Mode, Packet};

pub(crate) use packet::{OP_ACK, OP_DATA, encode_ack, encode_data, encode_error};
