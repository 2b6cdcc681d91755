//! JSON-RPC 1.0 request/response frames.
//!
//! Requests look like `{"method":"Server.Push","params":[{...}],"id":1}` and
//! responses like `{"id":1,"result":"...","error":null}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtoError;

/// Inbound RPC call frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Method name, e.g. `Server.Push`.
    pub method: String,
    /// Call arguments; the first array element is the argument object.
    #[serde(default)]
    pub params: Value,
    /// Caller-chosen correlation id echoed back in the response.
    #[serde(default)]
    pub id: Value,
}

impl RpcRequest {
    /// Builds a request whose single argument is `argument`.
    pub fn new(
        method: impl Into<String>,
        argument: &impl Serialize,
        id: impl Into<Value>,
    ) -> Result<Self, ProtoError> {
        let argument =
            serde_json::to_value(argument).map_err(|e| ProtoError::Serialization(e.to_string()))?;
        Ok(Self {
            method: method.into(),
            params: Value::Array(vec![argument]),
            id: id.into(),
        })
    }

    /// Interprets a decoded JSON frame as a request.
    ///
    /// On failure the frame's `id` (or `null`) is returned alongside the error
    /// so the caller can still answer it.
    pub fn from_frame(frame: Value) -> Result<Self, (Value, ProtoError)> {
        let id = frame.get("id").cloned().unwrap_or(Value::Null);
        match frame.get("method") {
            Some(Value::String(_)) => {}
            Some(_) => {
                return Err((id, ProtoError::InvalidFrame("method must be a string".into())));
            }
            None => return Err((id, ProtoError::InvalidFrame("missing method".into()))),
        }
        serde_json::from_value(frame).map_err(|e| (id, ProtoError::InvalidFrame(e.to_string())))
    }

    /// Returns the single call argument.
    ///
    /// Accepts the JSON-RPC 1.0 array form as well as a bare object.
    pub fn argument(&self) -> Option<&Value> {
        match &self.params {
            Value::Array(items) => items.first(),
            Value::Object(_) => Some(&self.params),
            _ => None,
        }
    }

    /// Serializes the request as one newline-terminated line.
    pub fn to_line(&self) -> Result<Vec<u8>, ProtoError> {
        to_line(self)
    }
}

/// Outbound RPC reply frame. Exactly one of `result`/`error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Correlation id copied from the request.
    pub id: Value,
    /// Textual method result (the encoded envelope).
    pub result: Option<String>,
    /// Protocol-level error text.
    pub error: Option<String>,
}

impl RpcResponse {
    /// Successful reply.
    pub fn ok(id: Value, result: impl Into<String>) -> Self {
        Self {
            id,
            result: Some(result.into()),
            error: None,
        }
    }

    /// Protocol-level error reply.
    pub fn err(id: Value, error: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Serializes the response as one newline-terminated line.
    pub fn to_line(&self) -> Result<Vec<u8>, ProtoError> {
        to_line(self)
    }
}

fn to_line(frame: &impl Serialize) -> Result<Vec<u8>, ProtoError> {
    let mut bytes =
        serde_json::to_vec(frame).map_err(|e| ProtoError::Serialization(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::TokenMessage;
    use serde_json::json;

    #[test]
    fn request_wraps_argument_in_array() {
        let request =
            RpcRequest::new("Server.GetAllConnections", &TokenMessage::new("t"), 7).expect("new");
        assert_eq!(request.params, json!([{"token": "t"}]));
        assert_eq!(request.argument(), Some(&json!({"token": "t"})));
        assert_eq!(request.id, json!(7));
    }

    #[test]
    fn argument_accepts_bare_object_and_rejects_scalars() {
        let mut request = RpcRequest::from_frame(json!({
            "method": "Server.Push",
            "params": {"token": "t"},
            "id": 1
        }))
        .expect("frame");
        assert_eq!(request.argument(), Some(&json!({"token": "t"})));

        request.params = json!("nope");
        assert_eq!(request.argument(), None);
        request.params = json!([]);
        assert_eq!(request.argument(), None);
    }

    #[test]
    fn from_frame_reports_id_for_bad_frames() {
        let (id, err) = RpcRequest::from_frame(json!({"id": 3, "params": []}))
            .expect_err("missing method");
        assert_eq!(id, json!(3));
        assert!(err.to_string().contains("missing method"));

        let (id, err) =
            RpcRequest::from_frame(json!({"method": 5})).expect_err("non-string method");
        assert_eq!(id, Value::Null);
        assert!(err.to_string().contains("method must be a string"));

        let (_, err) = RpcRequest::from_frame(json!([1, 2])).expect_err("array frame");
        assert!(err.to_string().contains("missing method"));
    }

    #[test]
    fn response_serializes_both_fields() {
        let ok = RpcResponse::ok(json!(1), "{}");
        let line = ok.to_line().expect("line");
        assert_eq!(line.last(), Some(&b'\n'));
        let value: Value = serde_json::from_slice(&line).expect("json");
        assert_eq!(value, json!({"id": 1, "result": "{}", "error": null}));

        let err = RpcResponse::err(Value::Null, "Unknown method: X");
        let value: Value = serde_json::from_slice(&err.to_line().expect("line")).expect("json");
        assert_eq!(
            value,
            json!({"id": null, "result": null, "error": "Unknown method: X"})
        );
    }
}
