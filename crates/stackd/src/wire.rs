//! Binary framing for data-plane requests and responses.
//!
//! A request is one header byte followed by an optional payload. The most
//! significant header bit selects the action (`0` push, `1` pop) and the low
//! seven bits carry the payload length. Responses are a single status byte
//! or, for pops, a length byte followed by the payload.

use thiserror::Error;

/// Largest payload a request or pop response can carry.
pub const MAX_PAYLOAD_LEN: usize = 0x7F;

/// Push acknowledgement byte.
pub const PUSH_ACK: u8 = 0x00;

/// Busy byte written when the pool rejects a connection.
pub const BUSY: u8 = 0xFF;

const ACTION_BIT: u8 = 0x80;
const LENGTH_MASK: u8 = 0x7F;

/// Operation requested by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Push the request payload onto the stack.
    Push,
    /// Pop the most recently pushed payload.
    Pop,
}

impl Action {
    /// Lower-case name used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pop => "pop",
        }
    }
}

/// Decoded request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Requested operation.
    pub action: Action,
    /// Declared payload length. Only meaningful for pushes.
    pub payload_len: usize,
}

/// Errors raised while framing requests or responses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The header byte could not be split into action and length.
    #[error("malformed request header {header:#04x}")]
    MalformedHeader {
        /// Offending header byte.
        header: u8,
    },
    /// A payload exceeded the seven-bit length field.
    #[error("payload of {len} bytes exceeds the 127 byte limit")]
    PayloadTooLong {
        /// Length of the rejected payload.
        len: usize,
    },
}

/// Opaque payload of at most [`MAX_PAYLOAD_LEN`] bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Borrows the payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the payload and returns its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl TryFrom<Vec<u8>> for Payload {
    type Error = ProtocolError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        if bytes.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLong { len: bytes.len() });
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<&[u8]> for Payload {
    type Error = ProtocolError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::try_from(bytes.to_vec())
    }
}

/// Splits a header byte into action and declared payload length.
///
/// Every byte value decodes; the error channel is kept so callers treat the
/// header like any other untrusted input.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedHeader`] if the length bits cannot be
/// represented, which cannot happen for a seven-bit field.
pub fn decode_header(header: u8) -> Result<Header, ProtocolError> {
    let action = if header & ACTION_BIT == 0 {
        Action::Push
    } else {
        Action::Pop
    };
    let payload_len = usize::from(header & LENGTH_MASK);
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::MalformedHeader { header });
    }
    Ok(Header {
        action,
        payload_len,
    })
}

/// Builds a request header byte.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLong`] when `payload_len` does not fit
/// in seven bits.
pub fn encode_header(action: Action, payload_len: usize) -> Result<u8, ProtocolError> {
    let len = u8::try_from(payload_len)
        .ok()
        .filter(|len| usize::from(*len) <= MAX_PAYLOAD_LEN)
        .ok_or(ProtocolError::PayloadTooLong { len: payload_len })?;
    match action {
        Action::Push => Ok(len),
        Action::Pop => Ok(ACTION_BIT | len),
    }
}

/// Frames a pop response: one length byte followed by the payload verbatim.
#[must_use]
pub fn encode_pop_response(payload: &Payload) -> Vec<u8> {
    let mut response = Vec::with_capacity(payload.len() + 1);
    // `Payload` guarantees the length fits in seven bits.
    response.push(u8::try_from(payload.len()).unwrap_or(LENGTH_MASK));
    response.extend_from_slice(payload.as_bytes());
    response
}
