use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, warn};
use webview_bridge::{
    ApiHandler, Disposition, MinMaxInfo, Size, SizeHint, Wake, WindowController, WindowEvent,
    WindowHandle, WindowRegistry, WindowSettings,
};

use windows::core::*;
use windows::Win32::Foundation::*;
use windows::Win32::Graphics::Gdi::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::SetFocus;
use windows::Win32::UI::WindowsAndMessaging::*;

use super::webview2::EdgeBrowser;
use crate::window_manager::{
    Command, PENDING_CLOSES, PENDING_FOCUSES, PENDING_MOVES, PENDING_RESIZES,
};

/// Thread message that asks the pump to drain a window's dispatch queue.
/// `wParam` carries the window handle.
const WM_APP_DISPATCH: u32 = WM_APP + 1;

const CLASS_NAME: PCWSTR = w!("NativeWebView2Class");

pub(super) fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// One registered window. The controller sits in a `RefCell` because the
/// window procedure re-enters while the controller is already in use.
struct WindowSlot {
    id: u32,
    controller: RefCell<WindowController>,
}

type Registry = WindowRegistry<Rc<WindowSlot>>;

/// Wakes the UI thread by posting it a thread message.
struct ThreadWaker {
    thread_id: u32,
    hwnd: isize,
}

impl Wake for ThreadWaker {
    fn wake(&self) {
        let posted = unsafe {
            PostThreadMessageW(
                self.thread_id,
                WM_APP_DISPATCH,
                WPARAM(self.hwnd as usize),
                LPARAM(0),
            )
        };
        if let Err(err) = posted {
            warn!(%err, "failed to wake UI thread");
        }
    }
}

/// Windows platform state.
pub struct WindowsPlatform {
    /// Boxed so its address can live in each window's `GWLP_USERDATA`.
    registry: Box<Registry>,
    windows: HashMap<u32, HWND>,
    class_registered: bool,
    thread_id: u32,
    quit: bool,
}

impl WindowsPlatform {
    pub fn new() -> napi::Result<Self> {
        // Initialize COM for WebView2
        unsafe {
            CoInitializeEx(None, COINIT_APARTMENTTHREADED)
                .ok()
                .map_err(|e| napi::Error::from_reason(format!("COM init failed: {}", e)))?;
        }

        Ok(Self {
            registry: Box::new(WindowRegistry::new()),
            windows: HashMap::new(),
            class_registered: false,
            thread_id: unsafe { GetCurrentThreadId() },
            quit: false,
        })
    }

    fn ensure_class_registered(&mut self) -> napi::Result<()> {
        if self.class_registered {
            return Ok(());
        }

        unsafe {
            let hinstance = GetModuleHandleW(None)
                .map_err(|e| napi::Error::from_reason(format!("GetModuleHandle failed: {}", e)))?;
            let icon = LoadIconW(None, IDI_APPLICATION).unwrap_or_default();

            let wc = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                style: CS_HREDRAW | CS_VREDRAW,
                lpfnWndProc: Some(Self::wnd_proc),
                hInstance: hinstance.into(),
                hIcon: icon,
                hIconSm: icon,
                hCursor: LoadCursorW(None, IDC_ARROW).unwrap_or_default(),
                hbrBackground: HBRUSH((COLOR_WINDOW.0 + 1) as _),
                lpszClassName: CLASS_NAME,
                ..Default::default()
            };

            if RegisterClassExW(&wc) == 0 {
                return Err(napi::Error::from_reason(format!(
                    "RegisterClassEx failed: {}",
                    Error::from_win32()
                )));
            }
            self.class_registered = true;
        }

        Ok(())
    }

    unsafe extern "system" fn wnd_proc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        if msg == WM_NCCREATE {
            let create = &*(lparam.0 as *const CREATESTRUCTW);
            SetWindowLongPtrW(hwnd, GWLP_USERDATA, create.lpCreateParams as isize);
            return DefWindowProcW(hwnd, msg, wparam, lparam);
        }

        let registry = GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *const Registry;
        if registry.is_null() {
            return DefWindowProcW(hwnd, msg, wparam, lparam);
        }
        let handle = WindowHandle::from_raw(hwnd.0 as isize);
        // Messages sent during CreateWindowExW arrive before registration.
        let Some(slot) = (*registry).lookup(handle) else {
            return DefWindowProcW(hwnd, msg, wparam, lparam);
        };

        match msg {
            WM_SIZE => {
                let width = (lparam.0 & 0xFFFF) as f64;
                let height = ((lparam.0 >> 16) & 0xFFFF) as f64;
                PENDING_RESIZES.with(|p| p.borrow_mut().push((slot.id, width, height)));
            }
            WM_MOVE => {
                let x = (lparam.0 & 0xFFFF) as i16 as f64;
                let y = ((lparam.0 >> 16) & 0xFFFF) as i16 as f64;
                PENDING_MOVES.with(|p| p.borrow_mut().push((slot.id, x, y)));
            }
            // Low word WA_INACTIVE (0) means deactivation.
            WM_ACTIVATE if wparam.0 & 0xFFFF != 0 => {
                PENDING_FOCUSES.with(|p| p.borrow_mut().push(slot.id));
            }
            _ => {}
        }

        // The borrow ends before the disposition runs: DestroyWindow re-enters
        // this procedure with WM_DESTROY.
        let disposition = {
            let Ok(mut controller) = slot.controller.try_borrow_mut() else {
                return DefWindowProcW(hwnd, msg, wparam, lparam);
            };
            match msg {
                WM_GETMINMAXINFO => {
                    let mmi = &mut *(lparam.0 as *mut MINMAXINFO);
                    let mut info = MinMaxInfo {
                        max_size: from_point(mmi.ptMaxSize),
                        max_track_size: from_point(mmi.ptMaxTrackSize),
                        min_track_size: from_point(mmi.ptMinTrackSize),
                    };
                    let disposition = controller.route(WindowEvent::GetMinMaxInfo(&mut info));
                    mmi.ptMaxSize = to_point(info.max_size);
                    mmi.ptMaxTrackSize = to_point(info.max_track_size);
                    mmi.ptMinTrackSize = to_point(info.min_track_size);
                    disposition
                }
                _ => controller.route(translate(msg, wparam)),
            }
        };

        match disposition {
            Disposition::Handled => LRESULT(0),
            Disposition::Default => DefWindowProcW(hwnd, msg, wparam, lparam),
            Disposition::FocusThenDefault => {
                let _ = SetFocus(hwnd);
                DefWindowProcW(hwnd, msg, wparam, lparam)
            }
            Disposition::DestroyWindow => {
                if let Err(err) = DestroyWindow(hwnd) {
                    warn!(window = %handle, %err, "DestroyWindow failed");
                }
                LRESULT(0)
            }
            Disposition::Quit => {
                (*registry).remove(handle);
                PENDING_CLOSES.with(|p| p.borrow_mut().push(slot.id));
                debug!(id = slot.id, window = %handle, "window destroyed");
                if (*registry).is_empty() {
                    PostQuitMessage(0);
                }
                LRESULT(0)
            }
        }
    }

    pub fn create_window(&mut self, id: u32, settings: &WindowSettings) -> napi::Result<()> {
        self.ensure_class_registered()?;

        let mut style = WS_OVERLAPPEDWINDOW;
        if !settings.resizable {
            style &= !(WS_THICKFRAME | WS_MAXIMIZEBOX);
        }

        let title_wide = wide(&settings.title);
        let registry: *const Registry = &*self.registry;

        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                CLASS_NAME,
                PCWSTR(title_wide.as_ptr()),
                style,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                settings.size.width,
                settings.size.height,
                None,
                None,
                GetModuleHandleW(None).unwrap_or_default(),
                Some(registry as *const c_void),
            )
            .map_err(|e| napi::Error::from_reason(format!("CreateWindow failed: {}", e)))?
        };

        unsafe {
            let _ = ShowWindow(hwnd, SW_SHOW);
            let _ = UpdateWindow(hwnd);
            let _ = SetFocus(hwnd);
        }

        let handle = WindowHandle::from_raw(hwnd.0 as isize);
        let waker: Arc<dyn Wake> = Arc::new(ThreadWaker {
            thread_id: self.thread_id,
            hwnd: handle.as_raw(),
        });
        let browser = EdgeBrowser::new(settings.debug, settings.data_path.clone());
        let mut controller = WindowController::new(handle, Box::new(browser), settings, waker);

        if let Err(err) = controller.embed() {
            unsafe {
                let _ = DestroyWindow(hwnd);
            }
            return Err(napi::Error::from_reason(format!("Window {}: {}", id, err)));
        }

        self.registry.register(
            handle,
            Rc::new(WindowSlot {
                id,
                controller: RefCell::new(controller),
            }),
        );
        self.windows.insert(id, hwnd);
        self.quit = false;
        debug!(id, window = %handle, "window created");
        Ok(())
    }

    fn slot(&self, id: u32) -> napi::Result<(HWND, Rc<WindowSlot>)> {
        self.windows
            .get(&id)
            .and_then(|&hwnd| {
                let slot = self.registry.lookup(WindowHandle::from_raw(hwnd.0 as isize))?;
                Some((hwnd, slot))
            })
            .ok_or_else(|| napi::Error::from_reason(format!("Window {} not found", id)))
    }

    /// Run `f` against a window's controller. Never called from the window
    /// procedure, so a busy controller means a re-entrant command.
    fn with_controller<R>(
        &self,
        id: u32,
        f: impl FnOnce(&mut WindowController) -> R,
    ) -> napi::Result<R> {
        let (_, slot) = self.slot(id)?;
        let mut controller = slot
            .controller
            .try_borrow_mut()
            .map_err(|_| napi::Error::from_reason(format!("Window {} is busy", id)))?;
        Ok(f(&mut controller))
    }

    pub fn set_title(&self, id: u32, title: &str) -> napi::Result<()> {
        let (hwnd, _) = self.slot(id)?;
        let title_wide = wide(title);
        unsafe {
            SetWindowTextW(hwnd, PCWSTR(title_wide.as_ptr()))
                .map_err(|e| napi::Error::from_reason(format!("SetWindowText failed: {}", e)))?;
        }
        Ok(())
    }

    pub fn set_size(&self, id: u32, size: Size, hint: SizeHint) -> napi::Result<()> {
        let (hwnd, _) = self.slot(id)?;
        let change = self.with_controller(id, |c| c.set_size(size, hint))?;

        unsafe {
            let resize_bits = (WS_THICKFRAME | WS_MAXIMIZEBOX).0 as isize;
            let style = GetWindowLongPtrW(hwnd, GWL_STYLE);
            let style = if change.resizable {
                style | resize_bits
            } else {
                style & !resize_bits
            };
            SetWindowLongPtrW(hwnd, GWL_STYLE, style);

            if let Some(size) = change.apply {
                let mut rect = RECT {
                    left: 0,
                    top: 0,
                    right: size.width,
                    bottom: size.height,
                };
                let _ = AdjustWindowRect(&mut rect, WS_OVERLAPPEDWINDOW, FALSE);
                SetWindowPos(
                    hwnd,
                    None,
                    rect.left,
                    rect.top,
                    rect.right - rect.left,
                    rect.bottom - rect.top,
                    SWP_NOZORDER | SWP_NOACTIVATE | SWP_NOMOVE | SWP_FRAMECHANGED,
                )
                .map_err(|e| napi::Error::from_reason(format!("SetWindowPos failed: {}", e)))?;
            }
        }

        if change.apply.is_some() {
            self.with_controller(id, |c| c.resize_browser())?;
        }
        Ok(())
    }

    pub fn focus(&self, id: u32) -> napi::Result<()> {
        let (hwnd, _) = self.slot(id)?;
        unsafe {
            let _ = SetForegroundWindow(hwnd);
            let _ = SetFocus(hwnd);
        }
        self.with_controller(id, |c| c.focus_browser())
    }

    /// Destroy the window. Teardown happens in the window procedure's
    /// `WM_DESTROY`; closing an unknown or already closed window is a no-op.
    pub fn close(&mut self, id: u32) -> napi::Result<()> {
        let Some(hwnd) = self.windows.remove(&id) else {
            debug!(id, "close ignored, window already gone");
            return Ok(());
        };
        if self
            .registry
            .lookup(WindowHandle::from_raw(hwnd.0 as isize))
            .is_none()
        {
            return Ok(());
        }
        unsafe {
            DestroyWindow(hwnd)
                .map_err(|e| napi::Error::from_reason(format!("DestroyWindow failed: {}", e)))?;
        }
        Ok(())
    }

    pub fn install_api(&self, id: u32, handler: impl ApiHandler + 'static) -> napi::Result<()> {
        self.with_controller(id, |c| c.install_api(handler))
    }

    fn drain(slot: &WindowSlot) {
        match slot.controller.try_borrow_mut() {
            Ok(mut controller) => {
                if let Err(err) = controller.drain() {
                    warn!(id = slot.id, %err, "dispatch drain failed");
                }
            }
            // Left queued; the sweep after the next pump retries.
            Err(_) => debug!(id = slot.id, "window busy, drain deferred"),
        }
    }

    /// Pump the Windows message loop: process all pending messages without
    /// blocking. Returns `false` once a quit has been posted.
    pub fn pump_events(&mut self) -> bool {
        unsafe {
            let mut msg = MSG::default();
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                match msg.message {
                    WM_QUIT => {
                        debug!("last window closed");
                        self.quit = true;
                    }
                    WM_APP_DISPATCH if msg.hwnd.0.is_null() => {
                        let handle = WindowHandle::from_raw(msg.wParam.0 as isize);
                        if let Some(slot) = self.registry.lookup(handle) {
                            Self::drain(&slot);
                        }
                    }
                    _ => {
                        let _ = TranslateMessage(&msg);
                        DispatchMessageW(&msg);
                    }
                }
            }
        }

        // Modal loops (WebView2 startup) swallow thread messages, so sweep
        // every window that still has queued work.
        let registry = &self.registry;
        self.windows.retain(|_, hwnd| {
            match registry.lookup(WindowHandle::from_raw(hwnd.0 as isize)) {
                Some(slot) => {
                    if slot.controller.try_borrow().is_ok_and(|c| c.pending() > 0) {
                        Self::drain(&slot);
                    }
                    true
                }
                None => false,
            }
        });

        !self.quit
    }

    /// Process a command.
    pub fn process_command(&mut self, cmd: Command) -> napi::Result<()> {
        match cmd {
            Command::CreateWindow { id, settings } => self.create_window(id, &settings),
            Command::Navigate { id, url } => self.with_controller(id, |c| c.navigate(&url)),
            Command::SetHtml { id, html } => self.with_controller(id, |c| c.set_html(&html)),
            Command::Init { id, script } => self.with_controller(id, |c| c.init(&script)),
            Command::Eval { id, script } => self.with_controller(id, |c| c.eval(&script)),
            Command::PostMessage { id, message } => self
                .with_controller(id, |c| c.post_message(&message))?
                .map_err(|e| napi::Error::from_reason(format!("Window {}: {}", id, e))),
            Command::SetTitle { id, title } => self.set_title(id, &title),
            Command::SetSize { id, size, hint } => self.set_size(id, size, hint),
            Command::SetApiHandler { id, handler } => self.install_api(id, handler),
            Command::Focus { id } => self.focus(id),
            Command::Close { id } => self.close(id),
        }
    }
}

fn translate(msg: u32, wparam: WPARAM) -> WindowEvent<'static> {
    match msg {
        WM_MOVE => WindowEvent::Move,
        WM_MOVING => WindowEvent::Moving,
        WM_NCLBUTTONDOWN => WindowEvent::NonClientLeftButtonDown,
        WM_SIZE => WindowEvent::Size,
        WM_ACTIVATE => WindowEvent::Activate {
            inactive: wparam.0 & 0xFFFF == 0,
        },
        WM_CLOSE => WindowEvent::Close,
        WM_DESTROY => WindowEvent::Destroy,
        _ => WindowEvent::Other,
    }
}

fn from_point(p: POINT) -> Size {
    Size::new(p.x, p.y)
}

fn to_point(s: Size) -> POINT {
    POINT {
        x: s.width,
        y: s.height,
    }
}
