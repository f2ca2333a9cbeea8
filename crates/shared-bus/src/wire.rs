//! # Wire Codec
//!
//! Translates between the duck-typed JSON objects services put on the wire
//! and [`BusMessage`].

use crate::messages::{BusMessage, ProxyRequest, ProxyResponse, ServiceAnnouncement, ServiceEntry};
use serde_json::{json, Map, Value};
use thiserror::Error;

const MESSAGE_TYPE: &str = "messageType";
const EVENT: &str = "EVENT";
const QUERY: &str = "QUERY";
const REQUEST: &str = "REQUEST";
const RESPONSE: &str = "RESPONSE";
const SERVICE_ONLINE: &str = "SERVICE_ONLINE";
const SERVICE_OFFLINE: &str = "SERVICE_OFFLINE";
const SERVICE_LIST: &str = "SERVICE_LIST";

/// Errors from decoding a wire message.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Top-level value is not an object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// A field the shape requires is absent or has the wrong type.
    #[error("missing or invalid field `{0}`")]
    MissingField(&'static str),

    /// The combination of discriminator fields is not one the mesh uses.
    #[error("unrecognised message shape (messageType={message_type:?}, id={id:?})")]
    UnknownShape {
        message_type: Option<String>,
        id: Option<String>,
    },
}

impl BusMessage {
    /// Decode a message from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_wire(&value)
    }

    /// Decode a message from its JSON form.
    pub fn from_wire(value: &Value) -> Result<Self, DecodeError> {
        let object = value.as_object().ok_or(DecodeError::NotAnObject)?;
        let message_type = str_field(object, MESSAGE_TYPE);

        match message_type {
            Some(EVENT) => match str_field(object, "eventId") {
                Some(SERVICE_ONLINE) => {
                    let announcement: ServiceAnnouncement = serde_json::from_value(value.clone())?;
                    Ok(Self::ServiceOnline(announcement))
                }
                Some(SERVICE_OFFLINE) => Ok(Self::ServiceOffline {
                    instance_id: str_field(object, "instanceId").unwrap_or_default().to_string(),
                    service_id: str_field(object, "serviceId")
                        .ok_or(DecodeError::MissingField("serviceId"))?
                        .to_string(),
                }),
                other => Err(unknown(message_type, other)),
            },
            Some(QUERY) => match str_field(object, "queryId") {
                Some(SERVICE_LIST) => Ok(Self::ServiceListQuery),
                other => Err(unknown(message_type, other)),
            },
            Some(RESPONSE) => {
                if str_field(object, "queryId") == Some(SERVICE_LIST) {
                    let entries = object
                        .get("response")
                        .filter(|v| v.is_array())
                        .ok_or(DecodeError::MissingField("response"))?;
                    let entries: Vec<ServiceEntry> = serde_json::from_value(entries.clone())?;
                    return Ok(Self::ServiceListResponse(entries));
                }

                let request_id = str_field(object, "requestId")
                    .ok_or(DecodeError::MissingField("requestId"))?;
                Ok(Self::ProxyResponse(ProxyResponse {
                    request_id: request_id.to_string(),
                    response_code: object
                        .get("responseCode")
                        .and_then(Value::as_u64)
                        .and_then(|code| u16::try_from(code).ok()),
                    response: object.get("response").filter(|v| !v.is_null()).cloned(),
                }))
            }
            Some(REQUEST) => decode_request(object),
            other => Err(unknown(other, None)),
        }
    }

    /// Encode a message to its JSON form.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        match self {
            Self::ServiceOnline(announcement) => {
                let mut value = serde_json::to_value(announcement)
                    .unwrap_or_else(|_| Value::Object(Map::new()));
                if let Some(object) = value.as_object_mut() {
                    object.insert(MESSAGE_TYPE.into(), json!(EVENT));
                    object.insert("eventId".into(), json!(SERVICE_ONLINE));
                }
                value
            }
            Self::ServiceOffline {
                instance_id,
                service_id,
            } => json!({
                MESSAGE_TYPE: EVENT,
                "eventId": SERVICE_OFFLINE,
                "instanceId": instance_id,
                "serviceId": service_id,
            }),
            Self::ServiceListQuery => json!({
                MESSAGE_TYPE: QUERY,
                "queryId": SERVICE_LIST,
                "data": {},
            }),
            Self::ServiceListResponse(entries) => json!({
                MESSAGE_TYPE: RESPONSE,
                "queryId": SERVICE_LIST,
                "response": entries,
            }),
            Self::ProxyRequest(request) => json!({
                MESSAGE_TYPE: REQUEST,
                "routeId": request.route_id,
                "correlationId": request.correlation_id,
                "data": {
                    "gatewayId": request.gateway_id,
                    "method": request.method,
                    "endpoint": request.endpoint,
                    "data": request.data,
                },
            }),
            Self::ProxyResponse(response) => json!({
                MESSAGE_TYPE: RESPONSE,
                "requestId": response.request_id,
                "responseCode": response.response_code,
                "response": response.response,
            }),
        }
    }

    /// Encode a message to bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.to_wire())
    }
}

fn decode_request(object: &Map<String, Value>) -> Result<BusMessage, DecodeError> {
    let data = object
        .get("data")
        .and_then(Value::as_object)
        .ok_or(DecodeError::MissingField("data"))?;

    Ok(BusMessage::ProxyRequest(ProxyRequest {
        route_id: str_field(object, "routeId").unwrap_or_default().to_string(),
        correlation_id: str_field(object, "correlationId")
            .ok_or(DecodeError::MissingField("correlationId"))?
            .to_string(),
        gateway_id: str_field(data, "gatewayId").unwrap_or_default().to_string(),
        method: str_field(data, "method")
            .ok_or(DecodeError::MissingField("method"))?
            .to_string(),
        endpoint: str_field(data, "endpoint")
            .ok_or(DecodeError::MissingField("endpoint"))?
            .to_string(),
        data: data.get("data").cloned().unwrap_or(Value::Null),
    }))
}

fn str_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

fn unknown(message_type: Option<&str>, id: Option<&str>) -> DecodeError {
    DecodeError::UnknownShape {
        message_type: message_type.map(str::to_string),
        id: id.map(str::to_string),
    }
}
