//! Protocol Module
//!
//! Wire framing for the remote control bridge.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬──────────┬─────────────────────────────┐
//! │ Kind (1) │ Len (4)  │ CRC (4)  │     Payload (bincode)       │
//! └──────────┴──────────┴──────────┴─────────────────────────────┘
//! ```
//! Length and CRC are big-endian; the CRC covers the payload only.
//!
//! ### Frame Kinds
//! - 0x01: HELLO     - client → server, requested version + options
//! - 0x02: WELCOME   - server → client, negotiated version
//! - 0x03: COMMAND   - client → server, a command message
//! - 0x04: RESPONSE  - server → client, the command's ack/error event
//! - 0x05: EVENT     - server → client, an asynchronous event
//! - 0x06: FAILURE   - either way, error text

mod frame;
mod codec;

pub use frame::{Frame, FrameKind};
pub use codec::{
    decode_frame, encode_frame, read_frame, write_frame, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
