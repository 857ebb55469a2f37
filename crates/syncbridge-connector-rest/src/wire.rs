//! Request and response bodies of the record-store API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `GET /meta/collections`
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionsResponse {
    #[serde(default)]
    pub collections: Vec<CollectionMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionMeta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldMeta {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub readonly: bool,
    /// Formula, rollup and other values the store derives itself.
    #[serde(default)]
    pub computed: bool,
}

fn default_nullable() -> bool {
    true
}

/// `GET /collections/{id}/records`
#[derive(Debug, Clone, Deserialize)]
pub struct RecordsPage {
    #[serde(default)]
    pub records: Vec<RemoteRecord>,
    /// Present while more pages remain.
    #[serde(default)]
    pub offset: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    /// Keyed by field name; empty fields are omitted by the store.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// `POST /collections/{id}/records`
#[derive(Debug, Clone, Serialize)]
pub struct CreateRequest {
    pub records: Vec<FieldsPayload>,
}

/// Body of one created record, also the body of a `PATCH`.
#[derive(Debug, Clone, Serialize)]
pub struct FieldsPayload {
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateResponse {
    #[serde(default)]
    pub records: Vec<CreatedRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedRef {
    pub id: String,
}

/// Error code and message from a failed response body.
///
/// The store answers either `{"error": {"type", "message"}}` or
/// `{"error": "TYPE"}`; anything else keeps the raw body as the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: Option<String>,
    pub message: String,
}

impl ApiError {
    pub fn parse(body: &str) -> Self {
        let parsed = serde_json::from_str::<Value>(body).ok();
        let error = parsed.as_ref().and_then(|v| v.get("error"));

        match error {
            Some(Value::String(code)) => Self {
                code: Some(code.clone()),
                message: code.clone(),
            },
            Some(Value::Object(obj)) => {
                let code = obj.get("type").and_then(Value::as_str).map(str::to_string);
                let message = obj
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| code.clone())
                    .unwrap_or_else(|| body.to_string());
                Self { code, message }
            }
            _ => Self {
                code: None,
                message: body.to_string(),
            },
        }
    }
}
