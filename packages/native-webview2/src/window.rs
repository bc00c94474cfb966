use napi::bindgen_prelude::*;
use napi::threadsafe_function::{ErrorStrategy, ThreadSafeCallContext, ThreadsafeFunction};
use napi::{Env, JsFunction};
use napi_derive::napi;
use webview_bridge::{Size, SizeHint, WindowSettings};

use crate::api::JsApiHandler;
use crate::options::WindowOptions;
use crate::window_manager::{push_command, with_manager, Command};

fn parse_hint(hint: Option<&str>) -> Result<SizeHint> {
    match hint.unwrap_or("none") {
        "none" => Ok(SizeHint::None),
        "fixed" => Ok(SizeHint::Fixed),
        "min" => Ok(SizeHint::Min),
        "max" => Ok(SizeHint::Max),
        other => Err(napi::Error::from_reason(format!(
            "Unknown size hint {other:?}; expected \"none\", \"fixed\", \"min\" or \"max\""
        ))),
    }
}

/// A native OS window with an embedded WebView2.
#[napi]
pub struct NativeWindow {
    id: u32,
}

#[napi]
impl NativeWindow {
    /// Create a new native window with the given options.
    /// The window is created during the next `pumpEvents()` call.
    #[napi(constructor)]
    pub fn new(options: Option<WindowOptions>) -> Result<Self> {
        let settings = WindowSettings::from(options.unwrap_or_default());

        let id = with_manager(|mgr| {
            if !mgr.initialized {
                return Err(napi::Error::from_reason(
                    "Native window system not initialized. Call init() first.",
                ));
            }
            let id = mgr.allocate_id()?;
            mgr.push_command(Command::CreateWindow { id, settings });
            Ok(id)
        })?;

        Ok(Self { id })
    }

    /// Get the unique window ID.
    #[napi(getter)]
    pub fn id(&self) -> u32 {
        self.id
    }

    // ---- Content ----

    /// Navigate the webview to a URL.
    #[napi]
    pub fn navigate(&self, url: String) -> Result<()> {
        push_command(Command::Navigate { id: self.id, url });
        Ok(())
    }

    /// Load an HTML string directly in the webview.
    #[napi]
    pub fn set_html(&self, html: String) -> Result<()> {
        push_command(Command::SetHtml { id: self.id, html });
        Ok(())
    }

    /// Register a script that runs at every document creation, before page scripts.
    #[napi]
    pub fn init(&self, script: String) -> Result<()> {
        push_command(Command::Init {
            id: self.id,
            script,
        });
        Ok(())
    }

    /// Execute JavaScript in the current document. Fire-and-forget.
    #[napi]
    pub fn eval(&self, script: String) -> Result<()> {
        push_command(Command::Eval {
            id: self.id,
            script,
        });
        Ok(())
    }

    /// Send a message to the page. It arrives as a `message` event whose
    /// `data` is the string passed here.
    #[napi]
    pub fn post_message(&self, message: String) -> Result<()> {
        push_command(Command::PostMessage {
            id: self.id,
            message,
        });
        Ok(())
    }

    // ---- Window control ----

    /// Set the window title.
    #[napi]
    pub fn set_title(&self, title: String) -> Result<()> {
        push_command(Command::SetTitle { id: self.id, title });
        Ok(())
    }

    /// Resize the window, or record a size constraint.
    ///
    /// `hint` is `"none"` (default), `"fixed"` (resize and lock), `"min"` or
    /// `"max"` (constraints applied while the user resizes).
    #[napi(ts_args_type = "width: number, height: number, hint?: 'none' | 'fixed' | 'min' | 'max'")]
    pub fn set_size(&self, width: f64, height: f64, hint: Option<String>) -> Result<()> {
        let hint = parse_hint(hint.as_deref())?;
        push_command(Command::SetSize {
            id: self.id,
            size: Size::new(width as i32, height as i32),
            hint,
        });
        Ok(())
    }

    /// Focus the window and its webview.
    #[napi]
    pub fn focus(&self) -> Result<()> {
        push_command(Command::Focus { id: self.id });
        Ok(())
    }

    /// Close and destroy the window.
    #[napi]
    pub fn close(&self) -> Result<()> {
        push_command(Command::Close { id: self.id });
        Ok(())
    }

    // ---- Event handlers ----

    /// Answer `WebView2API.send(payload)` calls from the page.
    /// The handler receives the payload as JSON text. Its return value, or
    /// what a returned promise resolves to, becomes the page's resolved value;
    /// `undefined` resolves as `null`. A throw or rejection rejects the page's
    /// promise with the error message.
    #[napi(ts_args_type = "handler: (payload: string) => unknown")]
    pub fn on_api_request(&self, env: Env, handler: JsFunction) -> Result<()> {
        push_command(Command::SetApiHandler {
            id: self.id,
            handler: JsApiHandler::from_js(&env, handler)?,
        });
        Ok(())
    }

    /// Register a handler for the window close event.
    #[napi(ts_args_type = "callback: () => void")]
    pub fn on_close(&self, callback: JsFunction) -> Result<()> {
        let tsfn: ThreadsafeFunction<(), ErrorStrategy::Fatal> = callback
            .create_threadsafe_function(0, |ctx: ThreadSafeCallContext<()>| {
                ctx.env.get_undefined().map(|v| vec![v])
            })?;

        with_manager(|mgr| {
            if let Some(handlers) = mgr.handlers_mut(self.id) {
                handlers.on_close = Some(tsfn);
            }
        });
        Ok(())
    }

    /// Register a handler for window resize events.
    #[napi(ts_args_type = "callback: (width: number, height: number) => void")]
    pub fn on_resize(&self, callback: JsFunction) -> Result<()> {
        let tsfn: ThreadsafeFunction<(f64, f64), ErrorStrategy::Fatal> = callback
            .create_threadsafe_function(0, |ctx: ThreadSafeCallContext<(f64, f64)>| {
                let width = ctx.env.create_double(ctx.value.0)?;
                let height = ctx.env.create_double(ctx.value.1)?;
                Ok(vec![width, height])
            })?;

        with_manager(|mgr| {
            if let Some(handlers) = mgr.handlers_mut(self.id) {
                handlers.on_resize = Some(tsfn);
            }
        });
        Ok(())
    }

    /// Register a handler for window move events.
    #[napi(ts_args_type = "callback: (x: number, y: number) => void")]
    pub fn on_move(&self, callback: JsFunction) -> Result<()> {
        let tsfn: ThreadsafeFunction<(f64, f64), ErrorStrategy::Fatal> = callback
            .create_threadsafe_function(0, |ctx: ThreadSafeCallContext<(f64, f64)>| {
                let x = ctx.env.create_double(ctx.value.0)?;
                let y = ctx.env.create_double(ctx.value.1)?;
                Ok(vec![x, y])
            })?;

        with_manager(|mgr| {
            if let Some(handlers) = mgr.handlers_mut(self.id) {
                handlers.on_move = Some(tsfn);
            }
        });
        Ok(())
    }

    /// Register a handler for window activation.
    #[napi(ts_args_type = "callback: () => void")]
    pub fn on_focus(&self, callback: JsFunction) -> Result<()> {
        let tsfn: ThreadsafeFunction<(), ErrorStrategy::Fatal> = callback
            .create_threadsafe_function(0, |ctx: ThreadSafeCallContext<()>| {
                ctx.env.get_undefined().map(|v| vec![v])
            })?;

        with_manager(|mgr| {
            if let Some(handlers) = mgr.handlers_mut(self.id) {
                handlers.on_focus = Some(tsfn);
            }
        });
        Ok(())
    }
}

// ── Drop ────────────────────────────────────────────────────────

/// Enqueue a close command when a `NativeWindow` is garbage-collected
/// without an explicit `close()` call. Closing an already destroyed window
/// is a no-op.
impl Drop for NativeWindow {
    fn drop(&mut self) {
        // MANAGER may be borrowed if the finalizer runs during a pump.
        let _ = crate::window_manager::MANAGER.try_with(|m| {
            if let Ok(mut mgr) = m.try_borrow_mut() {
                mgr.push_command(Command::Close { id: self.id });
            }
        });
    }
}
