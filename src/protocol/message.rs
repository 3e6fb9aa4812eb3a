//! Signaling message types
//!
//! Every frame is one JSON object tagged by a `type` string. Inbound frames are
//! decoded in two steps, tag first and then the body, so that unknown types and
//! incomplete bodies can be told apart and dropped.
//!
//! Negotiation payloads (`sdp`) and connectivity candidates (`candidate`) belong
//! to the media transport. They are kept as [`RawValue`] and written back out
//! byte-for-byte.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::registry::{ClientId, SiteId};

/// Error decoding an inbound frame
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Not JSON, no `type` tag, or a body missing required fields
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    /// Well-formed JSON with a `type` this broker does not handle
    #[error("unknown message type: {0}")]
    UnknownType(String),
}

/// Body of `hello`
///
/// The role stays a plain string so that an unknown role can be logged and
/// ignored rather than rejected as malformed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    /// `"site"` or `"operator"`
    pub role: String,
    /// Site id, required for sites
    #[serde(default)]
    pub site_id: Option<SiteId>,
    /// Informational display name
    #[serde(default)]
    pub name: Option<String>,
}

/// Body of an `offer` sent by a site
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRequest {
    /// Operator the offer is for
    pub to: ClientId,
    /// Site the offer belongs to
    pub site_id: SiteId,
    /// Opaque session description
    pub sdp: Box<RawValue>,
}

/// Body of an `answer` sent by an operator
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    /// Site being answered
    pub site_id: SiteId,
    /// Opaque session description
    pub sdp: Box<RawValue>,
}

/// Body of an `ice` message
///
/// Sites address an operator with `to`; operators address a site with
/// `siteId`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceRequest {
    /// Target operator (site senders)
    #[serde(default)]
    pub to: Option<ClientId>,
    /// Target site (operator senders)
    #[serde(default)]
    pub site_id: Option<SiteId>,
    /// Opaque connectivity candidate
    pub candidate: Box<RawValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SiteRef {
    site_id: SiteId,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Message received from a client
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// Identify as site or operator
    Hello(Hello),
    /// Start watching a site
    Watch {
        /// Site to watch
        site_id: SiteId,
    },
    /// Stop watching a site
    Unwatch {
        /// Site to stop watching
        site_id: SiteId,
    },
    /// Site to operator session description
    Offer(OfferRequest),
    /// Operator to site session description
    Answer(AnswerRequest),
    /// Connectivity candidate, either direction
    Ice(IceRequest),
    /// Operator asks to become primary on a site
    Promote {
        /// Site to become primary on
        site_id: SiteId,
    },
    /// Site asks its watchers for attention
    Attention,
    /// Close this connection
    Bye,
}

impl ClientMessage {
    /// Wire name of the message type
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Hello(_) => "hello",
            ClientMessage::Watch { .. } => "watch",
            ClientMessage::Unwatch { .. } => "unwatch",
            ClientMessage::Offer(_) => "offer",
            ClientMessage::Answer(_) => "answer",
            ClientMessage::Ice(_) => "ice",
            ClientMessage::Promote { .. } => "promote",
            ClientMessage::Attention => "attention",
            ClientMessage::Bye => "bye",
        }
    }
}

fn body<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    Ok(serde_json::from_str(text)?)
}

/// Decode one inbound frame
///
/// Extra fields are ignored.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, ParseError> {
    let envelope: Envelope = serde_json::from_str(text)?;

    let message = match envelope.kind.as_str() {
        "hello" => ClientMessage::Hello(body(text)?),
        "watch" => ClientMessage::Watch {
            site_id: body::<SiteRef>(text)?.site_id,
        },
        "unwatch" => ClientMessage::Unwatch {
            site_id: body::<SiteRef>(text)?.site_id,
        },
        "offer" => ClientMessage::Offer(body(text)?),
        "answer" => ClientMessage::Answer(body(text)?),
        "ice" => ClientMessage::Ice(body(text)?),
        "promote" => ClientMessage::Promote {
            site_id: body::<SiteRef>(text)?.site_id,
        },
        "attention" => ClientMessage::Attention,
        "bye" => ClientMessage::Bye,
        _ => return Err(ParseError::UnknownType(envelope.kind)),
    };

    Ok(message)
}

/// Message sent to a client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Sent once on accept
    Welcome {
        /// Id assigned to the connection
        client_id: ClientId,
    },
    /// The watched site is not (or no longer) published
    SiteOffline {
        /// Site in question
        site_id: SiteId,
    },
    /// An operator started watching this site
    IncomingViewer {
        /// Watching operator
        operator_id: ClientId,
        /// Watched site
        site_id: SiteId,
    },
    /// Relayed session description from a site
    Offer {
        /// Sending site connection
        from: ClientId,
        /// Site the offer belongs to
        site_id: SiteId,
        /// Opaque session description
        sdp: Box<RawValue>,
    },
    /// Relayed session description from an operator
    Answer {
        /// Sending operator
        from: ClientId,
        /// Site being answered
        site_id: SiteId,
        /// Opaque session description
        sdp: Box<RawValue>,
    },
    /// Relayed connectivity candidate
    Ice {
        /// Sending connection
        from: ClientId,
        /// Sender's site, only on site to operator candidates
        #[serde(skip_serializing_if = "Option::is_none")]
        site_id: Option<SiteId>,
        /// Opaque connectivity candidate
        candidate: Box<RawValue>,
    },
    /// An operator became primary on this site
    Promote {
        /// New primary
        operator_id: ClientId,
        /// Site
        site_id: SiteId,
    },
    /// A watched site asks for attention
    Attention {
        /// Requesting site
        site_id: SiteId,
        /// Milliseconds since the Unix epoch
        at: i64,
    },
    /// Explicit protocol violation reply
    Error {
        /// Violation name, e.g. `not-operator`
        error: String,
    },
}

impl ServerMessage {
    /// Wire name of the message type
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::SiteOffline { .. } => "site-offline",
            ServerMessage::IncomingViewer { .. } => "incoming-viewer",
            ServerMessage::Offer { .. } => "offer",
            ServerMessage::Answer { .. } => "answer",
            ServerMessage::Ice { .. } => "ice",
            ServerMessage::Promote { .. } => "promote",
            ServerMessage::Attention { .. } => "attention",
            ServerMessage::Error { .. } => "error",
        }
    }

    /// Encode as a single-line JSON frame
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
