//! Decoded manager packets and their classification

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{FIELD_DATA, FIELD_EVENT, FIELD_RESPONSE, FOLLOWS, RESPONSE_SUCCESS};

/// Error returned when parsing an unrecognized `Response` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResponseStatusError(pub String);

impl fmt::Display for ParseResponseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown response status: {}", self.0)
    }
}

impl std::error::Error for ParseResponseStatusError {}

/// Values the manager puts in the `Response` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ResponseStatus {
    /// Action accepted.
    Success,
    /// Action rejected; see `Message`.
    Error,
    /// Raw output follows, ending at a `--END ` line.
    Follows,
    /// Reply to `Logoff`.
    Goodbye,
}

impl ResponseStatus {
    /// Wire-format string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Success => RESPONSE_SUCCESS,
            ResponseStatus::Error => "Error",
            ResponseStatus::Follows => FOLLOWS,
            ResponseStatus::Goodbye => "Goodbye",
        }
    }

    /// Exact, case-sensitive match as the manager writes it.
    ///
    /// Login success and `Follows` detection key off this; `FromStr` is the
    /// lenient form.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            RESPONSE_SUCCESS => Some(ResponseStatus::Success),
            "Error" => Some(ResponseStatus::Error),
            FOLLOWS => Some(ResponseStatus::Follows),
            "Goodbye" => Some(ResponseStatus::Goodbye),
            _ => None,
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResponseStatus {
    type Err = ParseResponseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            ResponseStatus::Success,
            ResponseStatus::Error,
            ResponseStatus::Follows,
            ResponseStatus::Goodbye,
        ]
        .into_iter()
        .find(|status| {
            status
                .as_str()
                .eq_ignore_ascii_case(s)
        })
        .ok_or_else(|| ParseResponseStatusError(s.to_string()))
    }
}

/// Packet classification, derived from the first field of the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// First field is `Response`: terminates a request cycle.
    Response,
    /// First field is `Event`: unsolicited, routed to handlers.
    Event,
    /// No field at all: read timed out or a bare blank line arrived.
    Timeout,
    /// Anything else. Logged and skipped.
    Unknown,
}

impl PacketKind {
    /// Classify a packet by the lower-cased name of its first field.
    pub fn classify(packet: &Packet) -> Self {
        match packet.first_field() {
            None => PacketKind::Timeout,
            Some(name) => match name
                .to_ascii_lowercase()
                .as_str()
            {
                "event" => PacketKind::Event,
                "response" => PacketKind::Response,
                _ => PacketKind::Unknown,
            },
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PacketKind::Response => "response",
            PacketKind::Event => "event",
            PacketKind::Timeout => "timeout",
            PacketKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One decoded manager message.
///
/// Fields keep their arrival order so the first one can classify the packet.
/// Lookups are by exact (case-sensitive) name; setting an existing name
/// replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    fields: Vec<(String, String)>,
}

impl Packet {
    /// Create an empty packet (the timeout representation).
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Classification of this packet.
    pub fn kind(&self) -> PacketKind {
        PacketKind::classify(self)
    }

    /// `true` if no field was received.
    pub fn is_empty(&self) -> bool {
        self.fields
            .is_empty()
    }

    /// Number of fields, including a synthesized `data` field.
    pub fn len(&self) -> usize {
        self.fields
            .len()
    }

    /// Name of the first field received, as sent by the server.
    pub fn first_field(&self) -> Option<&str> {
        self.fields
            .first()
            .map(|(name, _)| name.as_str())
    }

    /// Look up a field by name (case-sensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set or overwrite a field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .fields
            .iter_mut()
            .find(|(n, _)| *n == name)
        {
            Some(slot) => slot.1 = value,
            None => self
                .fields
                .push((name, value)),
        }
    }

    /// Remove a field, returning its value if it existed.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self
            .fields
            .iter()
            .position(|(n, _)| n == name)?;
        Some(
            self.fields
                .remove(pos)
                .1,
        )
    }

    /// Iterate fields in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// `Response` field value.
    pub fn response(&self) -> Option<&str> {
        self.get(FIELD_RESPONSE)
    }

    /// Parsed `Response` field, if it is a known status.
    pub fn response_status(&self) -> Option<ResponseStatus> {
        self.response()?
            .parse()
            .ok()
    }

    /// `true` only for an exact `Response: Success`.
    pub fn is_success(&self) -> bool {
        self.response()
            .and_then(ResponseStatus::from_wire)
            == Some(ResponseStatus::Success)
    }

    /// `Event` field value.
    pub fn event(&self) -> Option<&str> {
        self.get(FIELD_EVENT)
    }

    /// `Message` field, usually the human-readable reason on errors.
    pub fn message(&self) -> Option<&str> {
        self.get("Message")
    }

    /// `ActionID` correlation token, echoed back when supplied.
    pub fn action_id(&self) -> Option<&str> {
        self.get("ActionID")
    }

    /// Raw lines of a `Follows` sub-block, each ending in `\n`.
    pub fn data(&self) -> Option<&str> {
        self.get(FIELD_DATA)
    }
}

impl<K, V> FromIterator<(K, V)> for Packet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut packet = Packet::new();
        for (k, v) in iter {
            packet.set(k, v);
        }
        packet
    }
}
