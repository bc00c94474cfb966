//! Content message in, page script out, across threads.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::{json, Value};
use webview_bridge::{
    ApiCall, ApiHandler, Browser, Disposition, Inbox, Responder, Wake, WindowController,
    WindowEvent, WindowHandle, WindowRegistry, WindowSettings,
};

/// Shares its inbox and evaluated scripts with the test.
#[derive(Clone, Default)]
struct Page {
    inbox: Arc<Mutex<Option<Inbox>>>,
    scripts: Arc<Mutex<Vec<String>>>,
}

impl Page {
    fn post(&self, raw: &str) {
        let inbox = self.inbox.lock().unwrap().clone().expect("embedded");
        inbox.deliver(raw);
    }

    fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }
}

impl Browser for Page {
    fn embed(&mut self, _: WindowHandle, inbox: Inbox) -> bool {
        *self.inbox.lock().unwrap() = Some(inbox);
        true
    }
    fn resize(&mut self) {}
    fn navigate(&mut self, _: &str) {}
    fn navigate_to_string(&mut self, _: &str) {}
    fn init(&mut self, _: &str) {}
    fn eval(&mut self, script: &str) {
        self.scripts.lock().unwrap().push(script.to_string());
    }
    fn notify_parent_window_position_changed(&mut self) {}
    fn focus(&mut self) {}
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn window(raw: isize, wakes: &Arc<AtomicUsize>) -> (WindowController, Page) {
    let page = Page::default();
    let counter = Arc::clone(wakes);
    let waker: Arc<dyn Wake> = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let mut controller = WindowController::new(
        WindowHandle::from_raw(raw),
        Box::new(page.clone()),
        &WindowSettings::default(),
        waker,
    );
    controller.embed().unwrap();
    (controller, page)
}

/// Answers on a worker thread, after the message handler has returned.
struct Worker {
    replies: Arc<Mutex<Vec<thread::JoinHandle<()>>>>,
}

impl ApiHandler for Worker {
    fn call(&self, call: ApiCall, reply: Responder) {
        let handle = thread::spawn(move || {
            let param: Value = serde_json::from_str(&call.param).unwrap();
            reply.resolve(json!({ "got": param })).unwrap();
        });
        self.replies.lock().unwrap().push(handle);
    }
}

#[test]
fn request_from_content_is_answered_on_owning_thread() {
    init_tracing();
    let wakes = Arc::new(AtomicUsize::new(0));
    let (mut controller, page) = window(0x100, &wakes);
    let replies = Arc::new(Mutex::new(Vec::new()));
    controller.install_api(Worker {
        replies: Arc::clone(&replies),
    });

    // The browser engine delivers content messages on its own thread.
    let sender = page.clone();
    thread::spawn(move || {
        sender.post(r#"{"id":0,"method":"__webview2_api__","params":[{"n":1}]}"#);
        sender.post(r#"{"id":1,"method":"bogus","params":[1]}"#);
        sender.post("{");
    })
    .join()
    .unwrap();
    for reply in replies.lock().unwrap().drain(..) {
        reply.join().unwrap();
    }

    assert!(page.scripts().is_empty());
    assert_eq!(wakes.load(Ordering::SeqCst), 1);
    assert_eq!(controller.drain().unwrap(), 1);
    assert_eq!(
        page.scripts(),
        vec![r#"window.postMessage("{\"id\":0,\"payload\":{\"got\":{\"n\":1}}}")"#.to_string()]
    );
}

#[test]
fn registry_routes_events_to_the_right_window() {
    init_tracing();
    let wakes = Arc::new(AtomicUsize::new(0));
    let registry: WindowRegistry<Rc<RefCell<WindowController>>> = WindowRegistry::new();

    let (first, first_page) = window(0x1, &wakes);
    let (second, second_page) = window(0x2, &wakes);
    registry.register(WindowHandle::from_raw(0x1), Rc::new(RefCell::new(first)));
    registry.register(WindowHandle::from_raw(0x2), Rc::new(RefCell::new(second)));

    let target = registry.lookup(WindowHandle::from_raw(0x2)).unwrap();
    target.borrow().post_message("for two").unwrap();
    target.borrow_mut().drain().unwrap();

    assert!(first_page.scripts().is_empty());
    assert_eq!(
        second_page.scripts(),
        vec![r#"window.postMessage("for two")"#.to_string()]
    );

    assert_eq!(
        target.borrow_mut().route(WindowEvent::Destroy),
        Disposition::Quit
    );
    registry.remove(WindowHandle::from_raw(0x2));
    assert!(registry.lookup(WindowHandle::from_raw(0x2)).is_none());
    assert!(registry.lookup(WindowHandle::from_raw(0x3)).is_none());
    assert_eq!(registry.len(), 1);
}

#[test]
fn responses_after_teardown_never_run() {
    init_tracing();
    let wakes = Arc::new(AtomicUsize::new(0));
    let (mut controller, page) = window(0x7, &wakes);
    controller.install_api(|raw: &str| -> Result<Value, String> {
        serde_json::from_str(raw).map_err(|e| e.to_string())
    });

    page.post(r#"{"id":3,"method":"__webview2_api__","params":["late"]}"#);
    assert_eq!(controller.pending(), 1);
    controller.route(WindowEvent::Destroy);

    page.post(r#"{"id":4,"method":"__webview2_api__","params":["later"]}"#);
    assert_eq!(controller.drain().unwrap(), 0);
    assert!(page.scripts().is_empty());
}
