use napi::threadsafe_function::{ErrorStrategy, ThreadsafeFunction};

/// Callback for window close events.
pub type CloseCallback = ThreadsafeFunction<(), ErrorStrategy::Fatal>;

/// Callback for resize events: (width, height) of the client area.
pub type ResizeCallback = ThreadsafeFunction<(f64, f64), ErrorStrategy::Fatal>;

/// Callback for move events: (x, y).
pub type MoveCallback = ThreadsafeFunction<(f64, f64), ErrorStrategy::Fatal>;

/// Callback for window activation (no payload).
pub type FocusCallback = ThreadsafeFunction<(), ErrorStrategy::Fatal>;

/// Stored event handlers for a window.
#[derive(Default)]
pub struct WindowEventHandlers {
    pub on_close: Option<CloseCallback>,
    pub on_resize: Option<ResizeCallback>,
    pub on_move: Option<MoveCallback>,
    pub on_focus: Option<FocusCallback>,
}
