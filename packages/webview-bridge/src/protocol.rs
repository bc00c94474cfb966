//! JSON envelopes exchanged between page content and the host.
//!
//! Content sends `{id, method, params}` through the webview's message
//! channel; the host answers with `{id, payload}` by evaluating
//! `window.postMessage(...)` in the page. The content-side half of the
//! protocol is [`API_INIT_SCRIPT`].

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::{Error, Result};

/// The only method name the bridge answers.
pub const API_METHOD: &str = "__webview2_api__";

/// A request posted by page content.
#[derive(Debug, Deserialize, Serialize)]
pub struct RpcRequest {
    /// Absent ids answer as 0.
    #[serde(default)]
    pub id: i64,
    /// Absent methods decode as "" and fail the method check.
    #[serde(default)]
    pub method: String,
    /// Parameters kept as raw JSON text; the handler decides how to parse them.
    #[serde(default)]
    pub params: Vec<Box<RawValue>>,
}

impl RpcRequest {
    /// Raw JSON text of the first parameter, if any.
    pub fn first_param(&self) -> Option<&str> {
        self.params.first().map(|p| p.get())
    }
}

/// The answer to one [`RpcRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: i64,
    pub payload: Value,
    /// Set when the host handler failed; the page rejects the pending promise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn ok(id: i64, payload: Value) -> Self {
        Self {
            id,
            payload,
            error: None,
        }
    }

    pub fn failed(id: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            payload: Value::Null,
            error: Some(message.into()),
        }
    }
}

pub fn decode(raw: &str) -> Result<RpcRequest> {
    serde_json::from_str(raw).map_err(Error::Parse)
}

pub fn encode(response: &RpcResponse) -> Result<String> {
    serde_json::to_string(response).map_err(Error::Encode)
}

/// Build the statement that hands `message` to the page as a `message` event.
/// The text is embedded as a JSON string literal, so the page receives it verbatim
/// in `event.data`.
pub fn delivery_script(message: &str) -> Result<String> {
    let literal = serde_json::to_string(message).map_err(Error::Encode)?;
    Ok(format!("window.postMessage({literal})"))
}

/// Content-side half of the RPC protocol, injected at document creation
/// once an API handler is installed. Exposes `window.WebView2API`.
pub const API_INIT_SCRIPT: &str = r#"class WebView2API extends EventTarget {
  #handlers = {};
  #id = 0;
  constructor() {
    super();
    window.addEventListener("message", (event) => {
      let data;
      try {
        data = JSON.parse(event.data);
      } catch (_) {
        return;
      }
      const handler = this.#handlers[data.id];
      this.dispatchEvent(new CustomEvent("message", { detail: event }));
      if (handler) {
        if (typeof data.error === "string") {
          handler.reject(new Error(data.error));
        } else {
          handler.resolve(data.payload);
        }
      }
      delete this.#handlers[data.id];
    });
  }

  async send(payload) {
    return new Promise((resolve, reject) => {
      if ("chrome" in window && "webview" in window.chrome) {
        window.chrome.webview.postMessage(
          JSON.stringify({ id: this.#id, method: "__webview2_api__", params: [payload] })
        );
        this.#handlers[this.#id] = { resolve, reject };
        this.#id++;
      } else {
        console.error("There is no webview context");
      }
    });
  }
}

window.WebView2API = WebView2API;
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_api_request() {
        let req = decode(r#"{"id":1,"method":"__webview2_api__","params":["ping"]}"#).unwrap();
        assert_eq!(req.id, 1);
        assert_eq!(req.method, API_METHOD);
        assert_eq!(req.first_param(), Some(r#""ping""#));
    }

    #[test]
    fn params_keep_raw_json_text() {
        let req = decode(r#"{"id":7,"method":"m","params":[{"a": [1, 2]}, null]}"#).unwrap();
        assert_eq!(req.params.len(), 2);
        assert_eq!(req.first_param(), Some(r#"{"a": [1, 2]}"#));
        assert_eq!(req.params[1].get(), "null");
    }

    #[test]
    fn missing_params_decode_as_empty() {
        let req = decode(r#"{"id":3,"method":"__webview2_api__"}"#).unwrap();
        assert!(req.params.is_empty());
        assert_eq!(req.first_param(), None);
    }

    #[test]
    fn missing_id_and_method_take_defaults() {
        let req = decode(r#"{"params":[true]}"#).unwrap();
        assert_eq!(req.id, 0);
        assert_eq!(req.method, "");
        assert_eq!(req.first_param(), Some("true"));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(decode("not-json"), Err(Error::Parse(_))));
        assert!(matches!(decode(""), Err(Error::Parse(_))));
    }

    #[test]
    fn rejects_wrong_field_types() {
        assert!(matches!(
            decode(r#"{"id":"one","method":"__webview2_api__","params":[]}"#),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            decode(r#"{"id":1.5,"method":"__webview2_api__","params":[]}"#),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn encodes_response_without_error_field() {
        let out = encode(&RpcResponse::ok(1, json!("ping"))).unwrap();
        assert_eq!(out, r#"{"id":1,"payload":"ping"}"#);
    }

    #[test]
    fn encodes_failed_response() {
        let out = encode(&RpcResponse::failed(4, "boom")).unwrap();
        assert_eq!(out, r#"{"id":4,"payload":null,"error":"boom"}"#);
    }

    #[test]
    fn delivery_script_quotes_message() {
        let script = delivery_script(r#"{"id":1,"payload":"a\"b"}"#).unwrap();
        assert_eq!(
            script,
            r#"window.postMessage("{\"id\":1,\"payload\":\"a\\\"b\"}")"#
        );
    }

    #[test]
    fn init_script_uses_api_method() {
        assert!(API_INIT_SCRIPT.contains(API_METHOD));
        assert!(API_INIT_SCRIPT.contains("window.WebView2API = WebView2API;"));
    }
}
