//! JSON wire codec.
//!
//! Inbound frames are JSON objects tagged by a `Discriminator` field:
//!
//! ```text
//! {"Discriminator":"PUBLIC","Text":"hi"}
//! {"Discriminator":"PRIVATE","Recipient":"User2","Text":"secret"}
//! {"Discriminator":"PING"}
//! {"Discriminator":"QUIT"}
//! ```
//!
//! The tag is read first; only then are the variant's fields decoded, so an
//! unknown tag never surfaces as a field error.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::DecodeError;
use crate::ids::Identity;
use crate::messages::MessageBody;

const DISCRIMINATOR: &str = "Discriminator";

#[derive(Deserialize)]
struct PublicFields {
    #[serde(rename = "Text")]
    text: String,
}

#[derive(Deserialize)]
struct PrivateFields {
    #[serde(rename = "Recipient")]
    recipient: String,
    #[serde(rename = "Text")]
    text: String,
}

/// Decode one inbound frame.
///
/// Pure: sender identity and receipt time are attached by the caller.
pub fn decode(frame: &[u8]) -> Result<MessageBody, DecodeError> {
    let value: Value = serde_json::from_slice(frame)?;

    let tag = match value.get(DISCRIMINATOR) {
        Some(Value::String(tag)) => tag.clone(),
        Some(other) => return Err(DecodeError::UnknownDiscriminant(Some(other.to_string()))),
        None => return Err(DecodeError::UnknownDiscriminant(None)),
    };

    match tag.as_str() {
        "PUBLIC" => {
            let fields: PublicFields = serde_json::from_value(value)?;
            Ok(MessageBody::Public { text: fields.text })
        }
        "PRIVATE" => {
            let fields: PrivateFields = serde_json::from_value(value)?;
            Ok(MessageBody::Private {
                recipient: Identity::from_raw(fields.recipient),
                text: fields.text,
            })
        }
        "PING" => Ok(MessageBody::Ping),
        "QUIT" => Ok(MessageBody::Quit),
        _ => Err(DecodeError::UnknownDiscriminant(Some(tag))),
    }
}

/// Encode a body the way a client would send it.
pub fn encode(body: &MessageBody) -> String {
    let value = match body {
        MessageBody::Public { text } => serde_json::json!({
            DISCRIMINATOR: body.discriminant(),
            "Text": text,
        }),
        MessageBody::Private { recipient, text } => serde_json::json!({
            DISCRIMINATOR: body.discriminant(),
            "Recipient": recipient.as_str(),
            "Text": text,
        }),
        MessageBody::Ping | MessageBody::Quit => serde_json::json!({
            DISCRIMINATOR: body.discriminant(),
        }),
    };
    value.to_string()
}
