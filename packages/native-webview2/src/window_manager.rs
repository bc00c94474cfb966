use std::cell::RefCell;
use std::collections::HashMap;

use tracing::warn;
use webview_bridge::{Size, SizeHint, WindowSettings};

use crate::api::JsApiHandler;
use crate::events::WindowEventHandlers;
use crate::platform::Platform;

/// Commands that can be sent to the window manager for execution during pump.
pub enum Command {
    CreateWindow {
        id: u32,
        settings: WindowSettings,
    },
    Navigate {
        id: u32,
        url: String,
    },
    SetHtml {
        id: u32,
        html: String,
    },
    Init {
        id: u32,
        script: String,
    },
    Eval {
        id: u32,
        script: String,
    },
    PostMessage {
        id: u32,
        message: String,
    },
    SetTitle {
        id: u32,
        title: String,
    },
    SetSize {
        id: u32,
        size: Size,
        hint: SizeHint,
    },
    SetApiHandler {
        id: u32,
        handler: JsApiHandler,
    },
    Focus {
        id: u32,
    },
    Close {
        id: u32,
    },
}

/// Global window manager state. Lives in thread_local storage.
pub struct WindowManager {
    pub next_id: u32,
    pub command_queue: Vec<Command>,
    pub event_handlers: HashMap<u32, WindowEventHandlers>,
    pub initialized: bool,
    pub platform: Option<Platform>,
}

/// Maximum number of commands in the queue before logging a warning.
/// Commands are still accepted to avoid silently dropping operations.
const MAX_COMMAND_QUEUE: usize = 10_000;

impl WindowManager {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            command_queue: Vec::new(),
            event_handlers: HashMap::new(),
            initialized: false,
            platform: None,
        }
    }

    pub fn allocate_id(&mut self) -> napi::Result<u32> {
        let id = self.next_id;
        self.next_id = self.next_id.checked_add(1).ok_or_else(|| {
            napi::Error::from_reason("Window ID space exhausted (u32 overflow)")
        })?;
        self.event_handlers.insert(id, WindowEventHandlers::default());
        Ok(id)
    }

    pub fn push_command(&mut self, cmd: Command) {
        if self.command_queue.len() >= MAX_COMMAND_QUEUE {
            warn!(
                queued = self.command_queue.len(),
                limit = MAX_COMMAND_QUEUE,
                "command queue is growing; is pumpEvents() being called?"
            );
        }
        self.command_queue.push(cmd);
    }

    pub fn drain_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.command_queue)
    }

    pub fn handlers_mut(&mut self, id: u32) -> Option<&mut WindowEventHandlers> {
        self.event_handlers.get_mut(&id)
    }
}

thread_local! {
    pub static MANAGER: RefCell<WindowManager> = RefCell::new(WindowManager::new());
    /// Close events raised by window procedures during pump_events.
    pub static PENDING_CLOSES: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
    /// Resize events: (window_id, width, height).
    pub static PENDING_RESIZES: RefCell<Vec<(u32, f64, f64)>> = const { RefCell::new(Vec::new()) };
    /// Move events: (window_id, x, y).
    pub static PENDING_MOVES: RefCell<Vec<(u32, f64, f64)>> = const { RefCell::new(Vec::new()) };
    /// Activation events.
    pub static PENDING_FOCUSES: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
}

/// Execute a closure with mutable access to the global window manager.
pub fn with_manager<F, R>(f: F) -> R
where
    F: FnOnce(&mut WindowManager) -> R,
{
    MANAGER.with(|m| f(&mut m.borrow_mut()))
}

/// Queue a command for the next pump.
pub fn push_command(cmd: Command) {
    with_manager(|mgr| mgr.push_command(cmd));
}
