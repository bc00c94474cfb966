use crate::bridge::Inbox;
use crate::registry::WindowHandle;

/// What a window needs from its embedded browser engine.
///
/// Every method runs on the window's owning thread. Implementations report
/// engine failures through their own logging; the window keeps routing events
/// either way.
pub trait Browser {
    /// Attach the engine to `window`. Messages posted by page content must be
    /// handed to `inbox`. Returns `false` when the engine could not start.
    fn embed(&mut self, window: WindowHandle, inbox: Inbox) -> bool;

    /// Fit the engine to the window's client area.
    fn resize(&mut self);

    fn navigate(&mut self, url: &str);

    /// Navigate to an in-memory HTML document.
    fn navigate_to_string(&mut self, html: &str);

    /// Register a script that runs at every document creation, before page scripts.
    fn init(&mut self, script: &str);

    /// Evaluate a script in the current document.
    fn eval(&mut self, script: &str);

    fn notify_parent_window_position_changed(&mut self);

    fn focus(&mut self);
}
