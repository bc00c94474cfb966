use std::sync::Arc;

use tracing::{debug, warn};

use crate::bridge::{ApiHandler, Bridge, Inbox};
use crate::browser::Browser;
use crate::dispatch::{DispatchQueue, Dispatcher, Wake};
use crate::error::{Error, Result};
use crate::protocol::{self, API_INIT_SCRIPT};
use crate::registry::WindowHandle;
use crate::settings::{Size, SizeHint, WindowSettings};

// ── OS events ──────────────────────────────────────────────────

/// Size limits the OS asks for while the user moves or resizes a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MinMaxInfo {
    pub max_size: Size,
    pub max_track_size: Size,
    pub min_track_size: Size,
}

/// The window messages a controller cares about.
#[derive(Debug)]
pub enum WindowEvent<'a> {
    Move,
    Moving,
    NonClientLeftButtonDown,
    Size,
    Activate { inactive: bool },
    Close,
    Destroy,
    GetMinMaxInfo(&'a mut MinMaxInfo),
    Other,
}

/// What the platform layer should do after routing an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Fully handled; return 0.
    Handled,
    /// Hand the message to default OS processing.
    Default,
    /// Focus the native window, then default-process.
    FocusThenDefault,
    /// Destroy the native window.
    DestroyWindow,
    /// The window is gone; post a quit to the message loop.
    Quit,
}

/// Outcome of [`WindowController::set_size`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeChange {
    /// Whether the frame should allow user resizing.
    pub resizable: bool,
    /// Outer size to apply now, if the hint asks for a resize.
    pub apply: Option<Size>,
}

// ── Controller ─────────────────────────────────────────────────

/// A logical window: one native handle, one embedded browser, one dispatch
/// queue. Lives on the thread that created it.
pub struct WindowController {
    handle: WindowHandle,
    browser: Box<dyn Browser>,
    queue: Arc<DispatchQueue<dyn Browser>>,
    inbox: Inbox,
    auto_focus: bool,
    min_size: Size,
    max_size: Size,
    api_script_injected: bool,
    destroyed: bool,
}

impl WindowController {
    pub fn new(
        handle: WindowHandle,
        browser: Box<dyn Browser>,
        settings: &WindowSettings,
        waker: Arc<dyn Wake>,
    ) -> Self {
        Self {
            handle,
            browser,
            queue: Arc::new(DispatchQueue::new(waker)),
            inbox: Inbox::new(),
            auto_focus: settings.auto_focus,
            min_size: settings.min_size.unwrap_or_default(),
            max_size: settings.max_size.unwrap_or_default(),
            api_script_injected: false,
            destroyed: false,
        }
    }

    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Attach the browser to the native window and fit it to the client area.
    pub fn embed(&mut self) -> Result<()> {
        if !self.browser.embed(self.handle, self.inbox.clone()) {
            return Err(Error::EmbedFailed);
        }
        self.browser.resize();
        Ok(())
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    /// Handle for scheduling work onto this window's thread.
    pub fn dispatcher(&self) -> Dispatcher<dyn Browser> {
        Dispatcher::new(Arc::clone(&self.queue))
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Answer page API requests with `handler`. The page-side class is
    /// injected once; a later call only swaps the handler.
    pub fn install_api(&mut self, handler: impl ApiHandler + 'static) {
        let bridge = Bridge::new(handler, self.dispatcher());
        self.inbox.attach(Arc::new(bridge));
        if !self.api_script_injected {
            self.browser.init(API_INIT_SCRIPT);
            self.api_script_injected = true;
        }
        debug!(window = %self.handle, "API bridge installed");
    }

    pub fn navigate(&mut self, url: &str) {
        self.browser.navigate(url);
    }

    pub fn set_html(&mut self, html: &str) {
        self.browser.navigate_to_string(html);
    }

    pub fn init(&mut self, script: &str) {
        self.browser.init(script);
    }

    pub fn eval(&mut self, script: &str) {
        self.browser.eval(script);
    }

    /// Deliver `message` to the page as a `message` event on the next drain.
    pub fn post_message(&self, message: &str) -> Result<()> {
        let script = protocol::delivery_script(message)?;
        self.dispatcher()
            .dispatch(move |browser| browser.eval(&script));
        Ok(())
    }

    pub fn resize_browser(&mut self) {
        self.browser.resize();
    }

    pub fn focus_browser(&mut self) {
        self.browser.focus();
    }

    pub fn set_size(&mut self, size: Size, hint: SizeHint) -> SizeChange {
        let resizable = hint != SizeHint::Fixed;
        match hint {
            SizeHint::Max => {
                self.max_size = size;
                SizeChange {
                    resizable,
                    apply: None,
                }
            }
            SizeHint::Min => {
                self.min_size = size;
                SizeChange {
                    resizable,
                    apply: None,
                }
            }
            SizeHint::None | SizeHint::Fixed => SizeChange {
                resizable,
                apply: Some(size),
            },
        }
    }

    /// Run the tasks queued for this window. Must be called on the owning
    /// thread; a destroyed window runs nothing.
    pub fn drain(&mut self) -> Result<usize> {
        if self.destroyed {
            return Ok(0);
        }
        self.queue.drain(self.browser.as_mut())
    }

    pub fn route(&mut self, event: WindowEvent<'_>) -> Disposition {
        match event {
            WindowEvent::Move | WindowEvent::Moving => {
                self.browser.notify_parent_window_position_changed();
                Disposition::Handled
            }
            WindowEvent::NonClientLeftButtonDown => Disposition::FocusThenDefault,
            WindowEvent::Size => {
                self.browser.resize();
                Disposition::Handled
            }
            WindowEvent::Activate { inactive } => {
                if !inactive && self.auto_focus {
                    self.browser.focus();
                }
                Disposition::Handled
            }
            WindowEvent::Close => Disposition::DestroyWindow,
            WindowEvent::Destroy => {
                self.teardown();
                Disposition::Quit
            }
            WindowEvent::GetMinMaxInfo(info) => {
                self.apply_constraints(info);
                Disposition::Handled
            }
            WindowEvent::Other => Disposition::Default,
        }
    }

    fn apply_constraints(&self, info: &mut MinMaxInfo) {
        if self.max_size.is_set() {
            info.max_size = self.max_size;
            info.max_track_size = self.max_size;
        }
        if self.min_size.is_set() {
            info.min_track_size = self.min_size;
        }
    }

    fn teardown(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.inbox.detach();
        let dropped = self.queue.discard();
        if dropped > 0 {
            warn!(window = %self.handle, dropped, "window destroyed with pending dispatch tasks");
        }
        debug!(window = %self.handle, "window torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Embed,
        Resize,
        Navigate(String),
        NavigateToString(String),
        Init(String),
        Eval(String),
        NotifyPosition,
        Focus,
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
        inbox: Option<Inbox>,
    }

    struct FakeBrowser {
        recorder: Rc<RefCell<Recorder>>,
        embeds: bool,
    }

    impl Browser for FakeBrowser {
        fn embed(&mut self, _: WindowHandle, inbox: Inbox) -> bool {
            let mut rec = self.recorder.borrow_mut();
            rec.calls.push(Call::Embed);
            rec.inbox = Some(inbox);
            self.embeds
        }
        fn resize(&mut self) {
            self.recorder.borrow_mut().calls.push(Call::Resize);
        }
        fn navigate(&mut self, url: &str) {
            self.recorder.borrow_mut().calls.push(Call::Navigate(url.into()));
        }
        fn navigate_to_string(&mut self, html: &str) {
            self.recorder
                .borrow_mut()
                .calls
                .push(Call::NavigateToString(html.into()));
        }
        fn init(&mut self, script: &str) {
            self.recorder.borrow_mut().calls.push(Call::Init(script.into()));
        }
        fn eval(&mut self, script: &str) {
            self.recorder.borrow_mut().calls.push(Call::Eval(script.into()));
        }
        fn notify_parent_window_position_changed(&mut self) {
            self.recorder.borrow_mut().calls.push(Call::NotifyPosition);
        }
        fn focus(&mut self) {
            self.recorder.borrow_mut().calls.push(Call::Focus);
        }
    }

    struct Fixture {
        controller: WindowController,
        recorder: Rc<RefCell<Recorder>>,
        wakes: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn calls(&self) -> Vec<Call> {
            self.recorder.borrow().calls.clone()
        }

        fn clear(&self) {
            self.recorder.borrow_mut().calls.clear();
        }

        fn inbox(&self) -> Inbox {
            self.recorder.borrow().inbox.clone().expect("embedded")
        }
    }

    fn fixture_with(settings: WindowSettings, embeds: bool) -> Fixture {
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&wakes);
        let waker: Arc<dyn Wake> = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let browser = FakeBrowser {
            recorder: Rc::clone(&recorder),
            embeds,
        };
        let controller = WindowController::new(
            WindowHandle::from_raw(0x10),
            Box::new(browser),
            &settings,
            waker,
        );
        Fixture {
            controller,
            recorder,
            wakes,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(WindowSettings::default(), true)
    }

    fn echo(raw: &str) -> std::result::Result<Value, String> {
        serde_json::from_str(raw).map_err(|e| e.to_string())
    }

    #[test]
    fn embed_attaches_then_resizes() {
        let mut fx = fixture();
        fx.controller.embed().unwrap();
        assert_eq!(fx.calls(), vec![Call::Embed, Call::Resize]);
    }

    #[test]
    fn failed_embed_is_an_error() {
        let mut fx = fixture_with(WindowSettings::default(), false);
        assert!(matches!(fx.controller.embed(), Err(Error::EmbedFailed)));
        assert_eq!(fx.calls(), vec![Call::Embed]);
    }

    #[test]
    fn move_and_moving_notify_browser() {
        let mut fx = fixture();
        assert_eq!(fx.controller.route(WindowEvent::Move), Disposition::Handled);
        assert_eq!(fx.controller.route(WindowEvent::Moving), Disposition::Handled);
        assert_eq!(fx.calls(), vec![Call::NotifyPosition, Call::NotifyPosition]);
    }

    #[test]
    fn size_resizes_browser() {
        let mut fx = fixture();
        assert_eq!(fx.controller.route(WindowEvent::Size), Disposition::Handled);
        assert_eq!(fx.calls(), vec![Call::Resize]);
    }

    #[test]
    fn non_client_click_refocuses_then_defaults() {
        let mut fx = fixture();
        assert_eq!(
            fx.controller.route(WindowEvent::NonClientLeftButtonDown),
            Disposition::FocusThenDefault
        );
        assert!(fx.calls().is_empty());
    }

    #[test]
    fn activate_focuses_only_with_auto_focus() {
        let mut fx = fixture();
        fx.controller.route(WindowEvent::Activate { inactive: false });
        assert!(fx.calls().is_empty());

        let mut fx = fixture_with(
            WindowSettings {
                auto_focus: true,
                ..Default::default()
            },
            true,
        );
        fx.controller.route(WindowEvent::Activate { inactive: true });
        assert!(fx.calls().is_empty());
        assert_eq!(
            fx.controller.route(WindowEvent::Activate { inactive: false }),
            Disposition::Handled
        );
        assert_eq!(fx.calls(), vec![Call::Focus]);
    }

    #[test]
    fn close_destroys_and_destroy_quits() {
        let mut fx = fixture();
        assert_eq!(fx.controller.route(WindowEvent::Close), Disposition::DestroyWindow);
        assert!(!fx.controller.is_destroyed());
        assert_eq!(fx.controller.route(WindowEvent::Destroy), Disposition::Quit);
        assert!(fx.controller.is_destroyed());
    }

    #[test]
    fn other_events_take_default_path() {
        let mut fx = fixture();
        assert_eq!(fx.controller.route(WindowEvent::Other), Disposition::Default);
        assert!(fx.calls().is_empty());
    }

    #[test]
    fn min_max_info_untouched_without_constraints() {
        let mut fx = fixture();
        let original = MinMaxInfo {
            max_size: Size::new(1, 2),
            max_track_size: Size::new(3, 4),
            min_track_size: Size::new(5, 6),
        };
        let mut info = original;
        fx.controller.route(WindowEvent::GetMinMaxInfo(&mut info));
        assert_eq!(info, original);
    }

    #[test]
    fn min_max_info_applies_stored_constraints() {
        let mut fx = fixture();
        let change = fx.controller.set_size(Size::new(1024, 768), SizeHint::Max);
        assert_eq!(change.apply, None);
        fx.controller.set_size(Size::new(320, 200), SizeHint::Min);

        let mut info = MinMaxInfo::default();
        assert_eq!(
            fx.controller.route(WindowEvent::GetMinMaxInfo(&mut info)),
            Disposition::Handled
        );
        assert_eq!(info.max_size, Size::new(1024, 768));
        assert_eq!(info.max_track_size, Size::new(1024, 768));
        assert_eq!(info.min_track_size, Size::new(320, 200));
    }

    #[test]
    fn partial_constraints_are_ignored() {
        let mut fx = fixture_with(
            WindowSettings {
                min_size: Some(Size::new(300, 0)),
                max_size: Some(Size::new(0, 900)),
                ..Default::default()
            },
            true,
        );
        let mut info = MinMaxInfo::default();
        fx.controller.route(WindowEvent::GetMinMaxInfo(&mut info));
        assert_eq!(info, MinMaxInfo::default());
    }

    #[test]
    fn set_size_hints() {
        let mut fx = fixture();
        assert_eq!(
            fx.controller.set_size(Size::new(800, 600), SizeHint::None),
            SizeChange {
                resizable: true,
                apply: Some(Size::new(800, 600)),
            }
        );
        assert_eq!(
            fx.controller.set_size(Size::new(500, 400), SizeHint::Fixed),
            SizeChange {
                resizable: false,
                apply: Some(Size::new(500, 400)),
            }
        );
        assert!(fx.controller.set_size(Size::new(1, 1), SizeHint::Min).resizable);
    }

    #[test]
    fn install_api_injects_script_once() {
        let mut fx = fixture();
        fx.controller.install_api(echo);
        fx.controller.install_api(echo);
        let inits: Vec<_> = fx
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Init(_)))
            .collect();
        assert_eq!(inits, vec![Call::Init(API_INIT_SCRIPT.to_string())]);
        assert!(fx.controller.inbox().is_attached());
    }

    #[test]
    fn content_message_round_trip() {
        let mut fx = fixture();
        fx.controller.embed().unwrap();
        fx.controller.install_api(echo);
        fx.clear();

        fx.inbox()
            .deliver(r#"{"id":1,"method":"__webview2_api__","params":["ping"]}"#);
        assert_eq!(fx.wakes.load(Ordering::SeqCst), 1);
        assert!(fx.calls().is_empty(), "nothing runs before the drain");

        assert_eq!(fx.controller.drain().unwrap(), 1);
        assert_eq!(
            fx.calls(),
            vec![Call::Eval(
                r#"window.postMessage("{\"id\":1,\"payload\":\"ping\"}")"#.to_string()
            )]
        );
    }

    #[test]
    fn post_message_is_queued() {
        let mut fx = fixture();
        fx.controller.post_message("hello").unwrap();
        assert!(fx.calls().is_empty());
        assert_eq!(fx.controller.pending(), 1);
        fx.controller.drain().unwrap();
        assert_eq!(
            fx.calls(),
            vec![Call::Eval(r#"window.postMessage("hello")"#.to_string())]
        );
    }

    #[test]
    fn destroy_discards_pending_and_detaches_bridge() {
        let mut fx = fixture();
        fx.controller.embed().unwrap();
        fx.controller.install_api(echo);
        fx.inbox()
            .deliver(r#"{"id":1,"method":"__webview2_api__","params":[1]}"#);
        assert_eq!(fx.controller.pending(), 1);
        fx.clear();

        fx.controller.route(WindowEvent::Destroy);
        assert_eq!(fx.controller.pending(), 0);
        assert!(!fx.controller.inbox().is_attached());

        let wakes = fx.wakes.load(Ordering::SeqCst);
        fx.controller.post_message("late").unwrap();
        assert_eq!(fx.controller.pending(), 0);
        assert_eq!(fx.wakes.load(Ordering::SeqCst), wakes);
        assert_eq!(fx.controller.drain().unwrap(), 0);
        assert!(fx.calls().is_empty());
    }

    #[test]
    fn passthrough_operations_reach_browser() {
        let mut fx = fixture();
        fx.controller.navigate("https://example.com/");
        fx.controller.set_html("<p>hi</p>");
        fx.controller.init("window.a = 1");
        fx.controller.eval("window.a");
        fx.controller.resize_browser();
        fx.controller.focus_browser();
        assert_eq!(
            fx.calls(),
            vec![
                Call::Navigate("https://example.com/".into()),
                Call::NavigateToString("<p>hi</p>".into()),
                Call::Init("window.a = 1".into()),
                Call::Eval("window.a".into()),
                Call::Resize,
                Call::Focus,
            ]
        );
    }
}
