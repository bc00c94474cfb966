//! RPC bridge between page content and a host-supplied handler.
//!
//! ```text
//! page ── postMessage ──▶ Inbox ──▶ Bridge::on_message
//!                                     │ decode, check method
//!                                     ▼
//!                              ApiHandler::call(call, Responder)
//!                                     │ Responder::resolve / reject
//!                                     ▼
//!                     encode ──▶ Dispatcher ──▶ (owning thread) browser.eval
//! ```
//!
//! Requests that fail to decode, name another method, or carry no parameter
//! are logged and dropped. The page-side promise for such a request is never
//! settled.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::browser::Browser;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::protocol::{self, RpcResponse, API_METHOD};

/// An accepted API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    pub id: i64,
    /// Raw JSON text of the request's first parameter.
    pub param: String,
}

/// Answers exactly one [`ApiCall`]. Consumed by the answer.
#[derive(Debug)]
pub struct Responder {
    id: i64,
    dispatcher: Dispatcher<dyn Browser>,
}

impl Responder {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn resolve(self, payload: Value) -> Result<()> {
        let response = RpcResponse::ok(self.id, payload);
        self.deliver(&response)
    }

    /// Reject the page-side promise with `message`.
    pub fn reject(self, message: impl Into<String>) -> Result<()> {
        let response = RpcResponse::failed(self.id, message);
        self.deliver(&response)
    }

    /// Settle from a serialized outcome: `Ok` holds the payload as JSON
    /// text, `Err` the failure message. Text that is not JSON rejects.
    pub fn settle(self, outcome: std::result::Result<&str, &str>) -> Result<()> {
        match outcome {
            Ok(json) => match serde_json::from_str(json) {
                Ok(payload) => self.resolve(payload),
                Err(err) => {
                    warn!(id = self.id, %err, "API handler result is not JSON");
                    self.reject(format!("invalid handler result: {err}"))
                }
            },
            Err(message) => {
                warn!(id = self.id, %message, "API handler failed");
                self.reject(message)
            }
        }
    }

    fn deliver(self, response: &RpcResponse) -> Result<()> {
        let encoded = protocol::encode(response)?;
        let script = protocol::delivery_script(&encoded)?;
        debug!(id = self.id, "RPC response scheduled");
        self.dispatcher.dispatch(move |browser| browser.eval(&script));
        Ok(())
    }
}

/// Host side of the API. Called on whatever thread the message arrived.
pub trait ApiHandler: Send + Sync {
    fn call(&self, call: ApiCall, reply: Responder);
}

/// A plain function answers synchronously: its return value becomes the
/// response payload, and an `Err` or a panic rejects the request.
impl<F> ApiHandler for F
where
    F: Fn(&str) -> std::result::Result<Value, String> + Send + Sync,
{
    fn call(&self, call: ApiCall, reply: Responder) {
        let id = call.id;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self(&call.param)));
        let delivered = match outcome {
            Ok(Ok(payload)) => reply.resolve(payload),
            Ok(Err(message)) => {
                warn!(id, %message, "API handler failed");
                reply.reject(message)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(id, %message, "API handler panicked");
                reply.reject(message)
            }
        };
        if let Err(err) = delivered {
            warn!(id, %err, "dropping RPC response");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "API handler panicked".to_string()
    }
}

pub struct Bridge {
    handler: Box<dyn ApiHandler>,
    dispatcher: Dispatcher<dyn Browser>,
}

impl Bridge {
    pub fn new(handler: impl ApiHandler + 'static, dispatcher: Dispatcher<dyn Browser>) -> Self {
        Self {
            handler: Box::new(handler),
            dispatcher,
        }
    }

    /// Decode `raw` and check that it is an API request with a parameter.
    pub fn accept(&self, raw: &str) -> Result<ApiCall> {
        let request = protocol::decode(raw)?;
        if request.method != API_METHOD {
            return Err(Error::UnknownMethod(request.method));
        }
        let param = request
            .first_param()
            .ok_or(Error::MissingParam { id: request.id })?
            .to_owned();
        Ok(ApiCall {
            id: request.id,
            param,
        })
    }

    /// Accept `raw` and hand it to the handler. Returns the request id.
    pub fn handle(&self, raw: &str) -> Result<i64> {
        let call = self.accept(raw)?;
        let id = call.id;
        debug!(id, "RPC request accepted");
        let reply = Responder {
            id,
            dispatcher: self.dispatcher.clone(),
        };
        self.handler.call(call, reply);
        Ok(id)
    }

    /// Entry point for content messages. Failures are logged, never raised.
    pub fn on_message(&self, raw: &str) {
        if let Err(err) = self.handle(raw) {
            warn!(%err, len = raw.len(), "dropping RPC message");
        }
    }
}

/// Where a browser hands messages posted by page content.
///
/// Cloneable and thread-safe. Until a [`Bridge`] is attached, messages are
/// ignored.
#[derive(Clone, Default)]
pub struct Inbox {
    bridge: Arc<RwLock<Option<Arc<Bridge>>>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, raw: &str) {
        let bridge = self
            .bridge
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match bridge {
            Some(bridge) => bridge.on_message(raw),
            None => debug!(len = raw.len(), "no API bridge installed, message ignored"),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.bridge
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn attach(&self, bridge: Arc<Bridge>) {
        *self.bridge.write().unwrap_or_else(PoisonError::into_inner) = Some(bridge);
    }

    pub(crate) fn detach(&self) {
        self.bridge
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
