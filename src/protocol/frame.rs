//! Frame definitions

use crate::message::Message;

/// Frame kind byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Hello = 0x01,
    Welcome = 0x02,
    Command = 0x03,
    Response = 0x04,
    Event = 0x05,
    Failure = 0x06,
}

impl FrameKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(FrameKind::Hello),
            0x02 => Some(FrameKind::Welcome),
            0x03 => Some(FrameKind::Command),
            0x04 => Some(FrameKind::Response),
            0x05 => Some(FrameKind::Event),
            0x06 => Some(FrameKind::Failure),
            _ => None,
        }
    }
}

/// A unit on the bridge connection
#[derive(Debug)]
pub enum Frame {
    /// Open a session
    Hello { version: u32, options: String },

    /// Session opened at this version
    Welcome { version: u32 },

    Command(Message),

    /// Immediate reply to a command
    Response(Message),

    Event(Message),

    Failure(String),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Hello { .. } => FrameKind::Hello,
            Frame::Welcome { .. } => FrameKind::Welcome,
            Frame::Command(_) => FrameKind::Command,
            Frame::Response(_) => FrameKind::Response,
            Frame::Event(_) => FrameKind::Event,
            Frame::Failure(_) => FrameKind::Failure,
        }
    }
}
