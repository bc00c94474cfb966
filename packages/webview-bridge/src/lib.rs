//! Platform-independent core of the WebView2 host.
//!
//! A [`WindowController`] owns one native window's embedded [`Browser`] and
//! routes the window's OS events to it. Page content talks to the host through
//! a JSON RPC channel ([`protocol`]); requests are answered by an
//! [`ApiHandler`] on any thread, and responses travel back through a
//! [`DispatchQueue`] drained on the window's own thread.

pub mod bridge;
pub mod browser;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod settings;

pub use bridge::{ApiCall, ApiHandler, Bridge, Inbox, Responder};
pub use browser::Browser;
pub use controller::{Disposition, MinMaxInfo, SizeChange, WindowController, WindowEvent};
pub use dispatch::{DispatchQueue, Dispatcher, Task, Wake};
pub use error::{Error, Result};
pub use registry::{WindowHandle, WindowRegistry};
pub use settings::{Size, SizeHint, WindowSettings};
