#[macro_use]
extern crate napi_derive;

mod api;
mod events;
mod options;
mod platform;
mod window;
mod window_manager;

use std::collections::HashMap;

use napi::threadsafe_function::ThreadsafeFunctionCallMode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use events::WindowEventHandlers;
use platform::Platform;
use window_manager::{with_manager, PENDING_CLOSES, PENDING_FOCUSES, PENDING_MOVES, PENDING_RESIZES};

/// Initialize the native window system.
/// Must be called once before creating any windows.
#[napi]
pub fn init() -> napi::Result<()> {
    // Another addon or the host may already own the global subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    with_manager(|mgr| {
        if mgr.initialized {
            return Ok(());
        }
        mgr.platform = Some(Platform::new()?);
        mgr.initialized = true;
        debug!("native window system initialized");
        Ok(())
    })
}

/// Process pending native UI events and execute queued commands.
/// Call this periodically (e.g., every 16ms via setInterval) to keep
/// the native windows responsive.
///
/// Returns `false` once the last window has been destroyed.
#[napi]
pub fn pump_events() -> napi::Result<bool> {
    // Window procedures never touch MANAGER: they defer JS callbacks to the
    // PENDING_* buffers, flushed below once the OS messages are drained.
    with_manager(|mgr| {
        if !mgr.initialized {
            return Err(napi::Error::from_reason(
                "Native window system not initialized. Call init() first.",
            ));
        }

        let commands = mgr.drain_commands();
        let Some(platform) = mgr.platform.as_mut() else {
            return Ok(false);
        };

        let mut first_err: Option<napi::Error> = None;
        for cmd in commands {
            if let Err(e) = platform.process_command(cmd) {
                warn!(error = %e, "command failed");
                if first_err.is_none() {
                    first_err = Some(e);
                }
                // Continue processing remaining commands
            }
        }

        let running = platform.pump_events();

        flush_pending_callbacks(&mut mgr.event_handlers);

        match first_err {
            Some(e) => Err(e),
            None => Ok(running),
        }
    })
}

/// Flush all pending callback buffers that were deferred during pump_events.
fn flush_pending_callbacks(event_handlers: &mut HashMap<u32, WindowEventHandlers>) {
    let pending_resizes: Vec<(u32, f64, f64)> =
        PENDING_RESIZES.with(|p| std::mem::take(&mut *p.borrow_mut()));
    for (window_id, width, height) in pending_resizes {
        if let Some(cb) = event_handlers.get(&window_id).and_then(|h| h.on_resize.as_ref()) {
            cb.call((width, height), ThreadsafeFunctionCallMode::NonBlocking);
        }
    }

    let pending_moves: Vec<(u32, f64, f64)> =
        PENDING_MOVES.with(|p| std::mem::take(&mut *p.borrow_mut()));
    for (window_id, x, y) in pending_moves {
        if let Some(cb) = event_handlers.get(&window_id).and_then(|h| h.on_move.as_ref()) {
            cb.call((x, y), ThreadsafeFunctionCallMode::NonBlocking);
        }
    }

    let pending_focuses: Vec<u32> =
        PENDING_FOCUSES.with(|p| std::mem::take(&mut *p.borrow_mut()));
    for window_id in pending_focuses {
        if let Some(cb) = event_handlers.get(&window_id).and_then(|h| h.on_focus.as_ref()) {
            cb.call((), ThreadsafeFunctionCallMode::NonBlocking);
        }
    }

    // Closes go last: the window's handlers are released with them.
    let pending_closes: Vec<u32> =
        PENDING_CLOSES.with(|p| std::mem::take(&mut *p.borrow_mut()));
    for window_id in pending_closes {
        if let Some(handlers) = event_handlers.remove(&window_id) {
            if let Some(ref cb) = handlers.on_close {
                cb.call((), ThreadsafeFunctionCallMode::NonBlocking);
            }
        }
    }
}
