use std::cell::RefCell;

use napi::threadsafe_function::{
    ErrorStrategy, ThreadSafeCallContext, ThreadsafeFunction, ThreadsafeFunctionCallMode,
};
use napi::{CallContext, Env, JsFunction, Status};
use tracing::warn;
use webview_bridge::{ApiCall, ApiHandler, Responder};

/// Wraps a user handler so it never throws back into native code.
/// The wrapper awaits returned promises, answers `undefined` as `null`, and
/// reports the outcome through `settle(ok, text)`: JSON text when `ok`, the
/// failure message otherwise.
const HANDLER_SHIM: &str = r#"(function (handler) {
  return function (payload, settle) {
    function fail(err) {
      settle(false, String(err && err.message !== undefined ? err.message : err));
    }
    function done(value) {
      let json;
      try {
        json = JSON.stringify(value === undefined ? null : value);
      } catch (err) {
        fail(err);
        return;
      }
      settle(true, json === undefined ? "null" : json);
    }
    try {
      Promise.resolve(handler(payload)).then(done, fail);
    } catch (err) {
      fail(err);
    }
  };
})"#;

/// Wrapped JS handler. Receives the raw JSON text of the request's parameter
/// and the responder that `settle` consumes.
pub type ApiCallback = ThreadsafeFunction<(String, Responder), ErrorStrategy::Fatal>;

/// Answers page requests by calling into JS. The call is queued onto the JS
/// thread; the response is scheduled when the handler settles.
pub struct JsApiHandler {
    callback: ApiCallback,
}

impl JsApiHandler {
    pub fn from_js(env: &Env, handler: JsFunction) -> napi::Result<Self> {
        let factory: JsFunction = env.run_script(HANDLER_SHIM)?;
        let wrapped = JsFunction::try_from(factory.call(None, &[handler])?)?;
        let callback = wrapped.create_threadsafe_function(
            0,
            |ctx: ThreadSafeCallContext<(String, Responder)>| {
                let (param, reply) = ctx.value;
                let payload = ctx.env.create_string(&param)?.into_unknown();
                let settle = settle_function(&ctx.env, reply)?.into_unknown();
                Ok(vec![payload, settle])
            },
        )?;
        Ok(Self { callback })
    }
}

/// One-shot `settle(ok, text)` callback that answers `reply`.
fn settle_function(env: &Env, reply: Responder) -> napi::Result<JsFunction> {
    let reply = RefCell::new(Some(reply));
    env.create_function_from_closure("settle", move |ctx: CallContext<'_>| {
        let Some(reply) = reply.borrow_mut().take() else {
            return Ok(());
        };
        let id = reply.id();
        let settled = match (ctx.get::<bool>(0), ctx.get::<String>(1)) {
            (Ok(true), Ok(json)) => reply.settle(Ok(&json)),
            (Ok(false), Ok(message)) => reply.settle(Err(&message)),
            (Err(err), _) | (_, Err(err)) => {
                reply.reject(format!("unreadable handler result: {err}"))
            }
        };
        if let Err(err) = settled {
            warn!(id, %err, "dropping API response");
        }
        Ok(())
    })
}

impl ApiHandler for JsApiHandler {
    fn call(&self, call: ApiCall, reply: Responder) {
        let id = call.id;
        let status = self
            .callback
            .call((call.param, reply), ThreadsafeFunctionCallMode::NonBlocking);
        if status != Status::Ok {
            warn!(id, ?status, "API handler call could not be queued");
        }
    }
}
