use std::path::PathBuf;
use std::sync::mpsc;

use tracing::{debug, error, warn};
use webview_bridge::{Browser, Inbox, WindowHandle};

use windows::core::*;
use windows::Win32::Foundation::*;
use windows::Win32::System::Com::CoTaskMemFree;
use windows::Win32::UI::WindowsAndMessaging::GetClientRect;

use webview2_com::Microsoft::Web::WebView2::Win32::*;
use webview2_com::{
    CreateCoreWebView2ControllerCompletedHandler, CreateCoreWebView2EnvironmentCompletedHandler,
    PermissionRequestedEventHandler, WebMessageReceivedEventHandler,
};

use super::windows::wide;

/// Maximum IPC message size in bytes (10 MB). Messages exceeding this
/// are dropped to prevent memory exhaustion from the webview.
const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

fn log_failure(op: &'static str, result: Result<()>) {
    if let Err(err) = result {
        warn!(op, %err, "WebView2 call failed");
    }
}

fn async_error(err: webview2_com::Error) -> Error {
    Error::new(E_FAIL, format!("{err:?}"))
}

/// The WebView2 engine embedded in one native window.
pub struct EdgeBrowser {
    debug: bool,
    data_path: Option<PathBuf>,
    hwnd: HWND,
    controller: Option<ICoreWebView2Controller>,
    webview: Option<ICoreWebView2>,
}

impl EdgeBrowser {
    pub fn new(debug: bool, data_path: Option<PathBuf>) -> Self {
        Self {
            debug,
            data_path,
            hwnd: HWND::default(),
            controller: None,
            webview: None,
        }
    }

    unsafe fn create_environment(&self) -> Result<ICoreWebView2Environment> {
        let data_path = self
            .data_path
            .as_ref()
            .map(|p| wide(&p.to_string_lossy()));
        let (tx, rx) = mpsc::channel();

        CreateCoreWebView2EnvironmentCompletedHandler::wait_for_async_operation(
            Box::new(move |handler| {
                let folder = data_path
                    .as_ref()
                    .map_or(PCWSTR::null(), |p| PCWSTR(p.as_ptr()));
                CreateCoreWebView2EnvironmentWithOptions(PCWSTR::null(), folder, None, &handler)?;
                Ok(())
            }),
            Box::new(move |error_code, env| {
                error_code?;
                let env = env.ok_or_else(|| Error::from(E_FAIL))?;
                let _ = tx.send(env);
                Ok(())
            }),
        )
        .map_err(async_error)?;

        rx.try_recv().map_err(|_| Error::from(E_FAIL))
    }

    unsafe fn create_controller(
        &self,
        env: &ICoreWebView2Environment,
    ) -> Result<ICoreWebView2Controller> {
        let env = env.clone();
        let hwnd = self.hwnd;
        let (tx, rx) = mpsc::channel();

        CreateCoreWebView2ControllerCompletedHandler::wait_for_async_operation(
            Box::new(move |handler| {
                env.CreateCoreWebView2Controller(hwnd, &handler)?;
                Ok(())
            }),
            Box::new(move |error_code, controller| {
                error_code?;
                let controller = controller.ok_or_else(|| Error::from(E_FAIL))?;
                let _ = tx.send(controller);
                Ok(())
            }),
        )
        .map_err(async_error)?;

        rx.try_recv().map_err(|_| Error::from(E_FAIL))
    }

    unsafe fn attach(&mut self, inbox: Inbox) -> Result<()> {
        let env = self.create_environment()?;
        let controller = self.create_controller(&env)?;
        controller.SetIsVisible(true)?;

        let webview = controller.CoreWebView2()?;
        let settings = webview.Settings()?;
        settings.SetAreDevToolsEnabled(self.debug)?;

        let mut permission_token = std::mem::zeroed();
        webview.add_PermissionRequested(
            &PermissionRequestedEventHandler::create(Box::new(|_webview, args| {
                if let Some(args) = args {
                    let mut kind = COREWEBVIEW2_PERMISSION_KIND(0);
                    args.PermissionKind(&mut kind)?;
                    if kind == COREWEBVIEW2_PERMISSION_KIND_CLIPBOARD_READ {
                        args.SetState(COREWEBVIEW2_PERMISSION_STATE_ALLOW)?;
                    }
                }
                Ok(())
            })),
            &mut permission_token,
        )?;

        let mut message_token = std::mem::zeroed();
        webview.add_WebMessageReceived(
            &WebMessageReceivedEventHandler::create(Box::new(move |_webview, args| {
                if let Some(args) = args {
                    let mut message = PWSTR::null();
                    args.TryGetWebMessageAsString(&mut message)?;
                    let text = message.to_string();
                    CoTaskMemFree(Some(message.0 as *const _));
                    let text = text.map_err(|_| Error::from(E_INVALIDARG))?;

                    if text.len() > MAX_MESSAGE_SIZE {
                        warn!(len = text.len(), "dropping oversized web message");
                        return Ok(());
                    }
                    inbox.deliver(&text);
                }
                Ok(())
            })),
            &mut message_token,
        )?;

        self.controller = Some(controller);
        self.webview = Some(webview);
        Ok(())
    }

    fn webview(&self, op: &'static str) -> Option<&ICoreWebView2> {
        if self.webview.is_none() {
            debug!(op, "webview not attached, call ignored");
        }
        self.webview.as_ref()
    }
}

impl Browser for EdgeBrowser {
    fn embed(&mut self, window: WindowHandle, inbox: Inbox) -> bool {
        self.hwnd = HWND(window.as_raw() as *mut _);
        match unsafe { self.attach(inbox) } {
            Ok(()) => {
                debug!(%window, "WebView2 attached");
                true
            }
            Err(err) => {
                error!(%window, %err, "WebView2 initialization failed");
                false
            }
        }
    }

    fn resize(&mut self) {
        if let Some(ref controller) = self.controller {
            unsafe {
                let mut rect = RECT::default();
                log_failure("GetClientRect", GetClientRect(self.hwnd, &mut rect));
                log_failure("SetBounds", controller.SetBounds(rect));
            }
        }
    }

    fn navigate(&mut self, url: &str) {
        if let Some(webview) = self.webview("Navigate") {
            let url = wide(url);
            unsafe { log_failure("Navigate", webview.Navigate(PCWSTR(url.as_ptr()))) };
        }
    }

    fn navigate_to_string(&mut self, html: &str) {
        if let Some(webview) = self.webview("NavigateToString") {
            let html = wide(html);
            unsafe {
                log_failure(
                    "NavigateToString",
                    webview.NavigateToString(PCWSTR(html.as_ptr())),
                )
            };
        }
    }

    fn init(&mut self, script: &str) {
        if let Some(webview) = self.webview("AddScriptToExecuteOnDocumentCreated") {
            let script = wide(script);
            unsafe {
                log_failure(
                    "AddScriptToExecuteOnDocumentCreated",
                    webview.AddScriptToExecuteOnDocumentCreated(PCWSTR(script.as_ptr()), None),
                )
            };
        }
    }

    fn eval(&mut self, script: &str) {
        if let Some(webview) = self.webview("ExecuteScript") {
            let script = wide(script);
            unsafe {
                log_failure(
                    "ExecuteScript",
                    webview.ExecuteScript(PCWSTR(script.as_ptr()), None),
                )
            };
        }
    }

    fn notify_parent_window_position_changed(&mut self) {
        if let Some(ref controller) = self.controller {
            unsafe {
                log_failure(
                    "NotifyParentWindowPositionChanged",
                    controller.NotifyParentWindowPositionChanged(),
                )
            };
        }
    }

    fn focus(&mut self) {
        if let Some(ref controller) = self.controller {
            unsafe {
                log_failure(
                    "MoveFocus",
                    controller.MoveFocus(COREWEBVIEW2_MOVE_FOCUS_REASON_PROGRAMMATIC),
                )
            };
        }
    }
}

impl Drop for EdgeBrowser {
    fn drop(&mut self) {
        self.webview = None;
        if let Some(controller) = self.controller.take() {
            unsafe { log_failure("Close", controller.Close()) };
        }
    }
}
