use base64::Engine;
use serde_json::{json, Value};

use crate::error::{AnswerError, AnswerErrorCode, RooletError};

const JSON_RPC_VERSION: &str = "2.0";

fn base64_engine() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

fn str_field(object: &Value, path: &[&str]) -> String {
    let mut cursor = object;
    for key in path {
        cursor = match cursor.get(key) {
            Some(value) => value,
            None => return String::new(),
        };
    }
    cursor.as_str().unwrap_or_default().to_string()
}

fn u64_field(object: &Value, path: &[&str]) -> u64 {
    let mut cursor = object;
    for key in path {
        cursor = match cursor.get(key) {
            Some(value) => value,
            None => return 0,
        };
    }
    cursor.as_u64().unwrap_or(0)
}

/// A request travelling broker -> worker (or client -> broker for the call
/// itself): method name plus the task/cid/payload envelope (`spec.md` §4.1,
/// grounded on `BaseTransportUnit`'s field-path mapping).
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub id: u64,
    pub method: String,
    pub task: String,
    pub cid: String,
    /// Opaque payload, exposed to handlers as raw bytes. Base64 on the wire,
    /// unless `data_is_text` overrides that.
    pub data: Vec<u8>,
    /// When set, `data` is written to the wire as literal UTF-8 text instead
    /// of base64. The auth handshake uses this: `spec.md` §4.4 requires
    /// `params.data = token` verbatim, matching the original's wire-level
    /// `_b64_convert`, which (despite the name) is a plain UTF-8 decode, not
    /// base64 — the original's base64 step happens earlier, only for
    /// payloads passed through the separate pickled-object `.data`
    /// property, which the auth token never goes through.
    pub data_is_text: bool,
    /// Payload embedded as a JSON document rather than opaque bytes.
    pub json: Option<Value>,
}

impl Command {
    pub fn new(id: u64, method: impl Into<String>) -> Self {
        Self {
            id,
            method: method.into(),
            task: String::new(),
            cid: String::new(),
            data: Vec::new(),
            data_is_text: false,
            json: None,
        }
    }

    pub fn to_wire(&self) -> Value {
        let data = if self.data_is_text {
            String::from_utf8_lossy(&self.data).into_owned()
        } else if self.data.is_empty() {
            String::new()
        } else {
            base64_engine().encode(&self.data)
        };
        let json_field = self
            .json
            .as_ref()
            .map(|value| value.to_string())
            .unwrap_or_default();
        json!({
            "jsonrpc": JSON_RPC_VERSION,
            "id": self.id,
            "method": self.method,
            "params": {
                "task": self.task,
                "cid": self.cid,
                "data": data,
                "json": json_field,
            },
        })
    }

    pub fn from_wire(object: &Value) -> Result<Self, RooletError> {
        let data_field = str_field(object, &["params", "data"]);
        let data = if data_field.is_empty() {
            Vec::new()
        } else {
            base64_engine()
                .decode(data_field.as_bytes())
                .map_err(|err| RooletError::Protocol(format!("invalid base64 in data: {err}")))?
        };

        let json_field = str_field(object, &["params", "json"]);
        let json = if json_field.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(&json_field)
                    .map_err(|err| RooletError::Protocol(format!("invalid embedded json: {err}")))?,
            )
        };

        Ok(Self {
            id: u64_field(object, &["id"]),
            method: str_field(object, &["method"]),
            task: str_field(object, &["params", "task"]),
            cid: str_field(object, &["params", "cid"]),
            data,
            data_is_text: false,
            json,
        })
    }
}

/// Payload carried by a successful `Answer`. Restricted to an embedded JSON
/// document: opaque binary only travels as `Command::data`, never as a
/// result (resolves the embedded-payload Open Question in `SPEC_FULL.md`).
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerResult {
    Empty,
    Json(Value),
}

impl AnswerResult {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            AnswerResult::Empty => None,
            AnswerResult::Json(value) => Some(value),
        }
    }
}

/// A response travelling worker -> broker -> client (`spec.md` §4.1).
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub id: u64,
    pub result: AnswerResult,
    pub error: Option<AnswerError>,
}

impl Answer {
    pub fn ok(id: u64, result: AnswerResult) -> Self {
        Self {
            id,
            result,
            error: None,
        }
    }

    pub fn err(id: u64, error: AnswerError) -> Self {
        Self {
            id,
            result: AnswerResult::Empty,
            error: Some(error),
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn to_wire(&self) -> Value {
        let result = match &self.result {
            AnswerResult::Empty => String::new(),
            AnswerResult::Json(value) => value.to_string(),
        };
        let (code, message) = match &self.error {
            Some(error) => (error.code.code(), error.message.clone()),
            None => (0, String::new()),
        };
        json!({
            "jsonrpc": JSON_RPC_VERSION,
            "id": self.id,
            "result": result,
            "error": {
                "code": code,
                "message": message,
            },
        })
    }

    pub fn from_wire(object: &Value) -> Result<Self, RooletError> {
        let id = u64_field(object, &["id"]);

        let result_field = str_field(object, &["result"]);
        let result = if result_field.is_empty() {
            AnswerResult::Empty
        } else {
            match serde_json::from_str(&result_field) {
                Ok(value) => AnswerResult::Json(value),
                // Tolerate a non-JSON result string rather than tearing down
                // the session over it; callers still see the raw text.
                Err(_) => AnswerResult::Json(Value::String(result_field)),
            }
        };

        let code = object
            .get("error")
            .and_then(|error| error.get("code"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let error = if code == 0 {
            None
        } else {
            let message = str_field(object, &["error", "message"]);
            let code = AnswerErrorCode::from_code(code)
                .unwrap_or(AnswerErrorCode::InternalProblem);
            Some(AnswerError::new(code, message))
        };

        Ok(Self { id, result, error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trips_through_wire() {
        let mut command = Command::new(7, "echo");
        command.task = "task-1".to_string();
        command.cid = "cid-1".to_string();
        command.data = b"hello".to_vec();
        command.json = Some(json!({"n": 1}));

        let wire = command.to_wire();
        let decoded = Command::from_wire(&wire).unwrap();
        assert_eq!(decoded, command);
    }

    #[test]
    fn text_data_is_written_verbatim_not_base64() {
        let mut command = Command::new(1, "auth");
        command.data = b"seg1.seg2.seg3".to_vec();
        command.data_is_text = true;

        let wire = command.to_wire();
        let data_field = wire
            .get("params")
            .and_then(|params| params.get("data"))
            .and_then(Value::as_str)
            .unwrap();
        assert_eq!(data_field, "seg1.seg2.seg3");
    }

    #[test]
    fn command_missing_fields_default() {
        let wire = json!({"id": 1, "method": "ping"});
        let decoded = Command::from_wire(&wire).unwrap();
        assert_eq!(decoded.task, "");
        assert_eq!(decoded.cid, "");
        assert!(decoded.data.is_empty());
        assert!(decoded.json.is_none());
    }

    #[test]
    fn answer_ok_round_trips() {
        let answer = Answer::ok(3, AnswerResult::Json(json!({"value": 42})));
        let wire = answer.to_wire();
        let decoded = Answer::from_wire(&wire).unwrap();
        assert_eq!(decoded, answer);
        assert!(!decoded.has_error());
    }

    #[test]
    fn answer_error_round_trips() {
        let answer = Answer::err(9, AnswerError::new(AnswerErrorCode::NoMethod, "nope"));
        let wire = answer.to_wire();
        let decoded = Answer::from_wire(&wire).unwrap();
        assert_eq!(decoded, answer);
        assert!(decoded.has_error());
    }

    #[test]
    fn answer_zero_error_code_means_no_error() {
        let wire = json!({"id": 1, "result": "", "error": {"code": 0, "message": ""}});
        let decoded = Answer::from_wire(&wire).unwrap();
        assert!(!decoded.has_error());
    }
}
