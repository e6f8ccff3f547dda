//! ABOUTME: Request bodies and response helpers for the Control API envelope
//! ABOUTME: Every response is `{code, msg, ...}`, code=1000 on success

use ag_pipeline::ControlSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

pub const CODE_SUCCESS: i32 = 1000;
pub const CODE_VALIDATION: i32 = 4000;
pub const CODE_NOT_FOUND: i32 = 4004;
pub const CODE_INTERNAL: i32 = 5000;

/// Build a bare success envelope with no extra fields.
pub fn envelope_ok() -> Value {
    json!({ "code": CODE_SUCCESS, "msg": "ok" })
}

/// Build a success envelope merging `extra`'s fields alongside `code`/`msg`.
/// `extra` must serialize to a JSON object.
pub fn envelope_ok_with(extra: impl Serialize) -> Value {
    let mut body = json!({ "code": CODE_SUCCESS, "msg": "ok" });
    if let Value::Object(extra_map) = serde_json::to_value(extra).unwrap_or(Value::Null) {
        if let Value::Object(map) = &mut body {
            map.extend(extra_map);
        }
    }
    body
}

pub fn envelope_err(code: i32, msg: impl Into<String>) -> Value {
    json!({ "code": code, "msg": msg.into() })
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ControlCodeRequest {
    #[validate(length(min = 1))]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct AddControlRequest {
    #[validate(length(min = 1))]
    pub code: String,
    #[validate(length(min = 1))]
    #[serde(rename = "behaviorCode")]
    pub behavior_code: String,
    #[validate(length(min = 1))]
    #[serde(rename = "streamUrl")]
    pub stream_url: String,
    #[serde(rename = "pushStream")]
    pub push_stream: bool,
    #[serde(rename = "pushStreamUrl")]
    pub push_stream_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ControlsListBody {
    pub data: Vec<ControlSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct ControlBody {
    pub control: ControlSnapshot,
}
