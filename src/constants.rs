//! Constant tables
//!
//! Read-only vocabulary shared by controllers and protocol handlers:
//! API version numbers, entry point names, protocol URI prefixes and
//! event package identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// API Versions
// =============================================================================

/// Highest API version this engine speaks
pub const API_VERSION: u32 = 24;

/// Lowest API version a controller may request
pub const MINIMUM_API_VERSION: u32 = 1;

/// `get_message` timeout sentinel meaning "block indefinitely"
pub const INFINITE_TIMEOUT: u32 = u32::MAX;

// =============================================================================
// Entry Point Names
// =============================================================================

pub const INITIALISE_FUNCTION: &str = "OpalInitialise";
pub const SHUTDOWN_FUNCTION: &str = "OpalShutDown";
pub const GET_MESSAGE_FUNCTION: &str = "OpalGetMessage";
pub const SEND_MESSAGE_FUNCTION: &str = "OpalSendMessage";
pub const FREE_MESSAGE_FUNCTION: &str = "OpalFreeMessage";

// =============================================================================
// Event Packages
// =============================================================================

/// Message waiting indication subscription package
pub const MWI_EVENT_PACKAGE: &str = "message-summary";

/// Shared line appearance subscription package
pub const LINE_APPEARANCE_EVENT_PACKAGE: &str = "dialog;sla;ma";

/// Options token that enables every protocol
pub const PREFIX_ALL: &str = "*";

// =============================================================================
// Protocol Prefixes
// =============================================================================

/// How a protocol handler models the party on the far side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// Network signalling: the remote party rings then answers
    Signalling,
    /// Both legs live in this session
    Loopback,
    /// Local service that answers immediately
    Service,
}

/// URI scheme prefixes naming a protocol handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Prefix {
    H323,
    H323S,
    Sip,
    Sips,
    Sdp,
    Iax2,
    Pcss,
    Local,
    Pots,
    Pstn,
    Capi,
    Fax,
    T38,
    Ivr,
    Mixer,
    Im,
    Gst,
    Skinny,
    Lync,
}

impl Prefix {
    /// Every prefix, in table order
    pub const ALL: [Prefix; 19] = [
        Prefix::H323,
        Prefix::H323S,
        Prefix::Sip,
        Prefix::Sips,
        Prefix::Sdp,
        Prefix::Iax2,
        Prefix::Pcss,
        Prefix::Local,
        Prefix::Pots,
        Prefix::Pstn,
        Prefix::Capi,
        Prefix::Fax,
        Prefix::T38,
        Prefix::Ivr,
        Prefix::Mixer,
        Prefix::Im,
        Prefix::Gst,
        Prefix::Skinny,
        Prefix::Lync,
    ];

    /// The scheme string used in party URIs and options
    pub fn as_str(&self) -> &'static str {
        match self {
            Prefix::H323 => "h323",
            Prefix::H323S => "h323s",
            Prefix::Sip => "sip",
            Prefix::Sips => "sips",
            Prefix::Sdp => "sdp",
            Prefix::Iax2 => "iax2",
            Prefix::Pcss => "pc",
            Prefix::Local => "local",
            Prefix::Pots => "pots",
            Prefix::Pstn => "pstn",
            Prefix::Capi => "isdn",
            Prefix::Fax => "fax",
            Prefix::T38 => "t38",
            Prefix::Ivr => "ivr",
            Prefix::Mixer => "mcu",
            Prefix::Im => "im",
            Prefix::Gst => "gst",
            Prefix::Skinny => "sccp",
            Prefix::Lync => "lync",
        }
    }

    pub fn family(&self) -> Family {
        match self {
            Prefix::H323
            | Prefix::H323S
            | Prefix::Sip
            | Prefix::Sips
            | Prefix::Sdp
            | Prefix::Iax2
            | Prefix::Skinny
            | Prefix::Lync => Family::Signalling,
            Prefix::Pcss | Prefix::Local => Family::Loopback,
            Prefix::Pots
            | Prefix::Pstn
            | Prefix::Capi
            | Prefix::Fax
            | Prefix::T38
            | Prefix::Ivr
            | Prefix::Mixer
            | Prefix::Im
            | Prefix::Gst => Family::Service,
        }
    }

    /// Split `scheme:rest` and resolve the scheme.
    ///
    /// Returns `None` when the URI carries no scheme at all, and
    /// `Some(Err(scheme))` when the scheme is not in the table.
    ///
    /// A leading `host:port` (`alice@example.com:5060`, `10.0.0.1:1720`,
    /// `pbx:5060`) is an address, not a scheme.
    pub fn of_uri(uri: &str) -> Option<std::result::Result<Prefix, String>> {
        let (scheme, rest) = uri.split_once(':')?;
        if !is_scheme(scheme) {
            return None;
        }
        match scheme.parse() {
            Ok(prefix) => Some(Ok(prefix)),
            Err(()) if is_port(rest) => None,
            Err(()) => Some(Err(scheme.to_string())),
        }
    }
}

/// RFC 3986: `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`
fn is_scheme(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

fn is_port(text: &str) -> bool {
    !text.is_empty() && text.len() <= 5 && text.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Prefix {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Prefix::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == lower)
            .ok_or(())
    }
}
