use std::path::PathBuf;

use napi_derive::napi;
use webview_bridge::{Size, WindowSettings};

/// Options for creating a new native window.
#[napi(object)]
#[derive(Debug, Clone, Default)]
pub struct WindowOptions {
    /// Window title. Default: ""
    pub title: Option<String>,
    /// Outer width in pixels. Default: 640
    pub width: Option<f64>,
    /// Outer height in pixels. Default: 480
    pub height: Option<f64>,
    /// Minimum tracking width. Ignored unless both minimum dimensions are positive.
    pub min_width: Option<f64>,
    /// Minimum tracking height
    pub min_height: Option<f64>,
    /// Maximum width. Ignored unless both maximum dimensions are positive.
    pub max_width: Option<f64>,
    /// Maximum height
    pub max_height: Option<f64>,
    /// Allow resizing. Default: true
    pub resizable: Option<bool>,
    /// Enable devtools. Default: false
    pub debug: Option<bool>,
    /// Focus the webview whenever the window is activated. Default: false
    pub auto_focus: Option<bool>,
    /// WebView2 user-data folder. Default: chosen by the runtime
    pub data_path: Option<String>,
}

fn size_pair(width: Option<f64>, height: Option<f64>) -> Option<Size> {
    match (width, height) {
        (None, None) => None,
        (w, h) => Some(Size::new(
            w.unwrap_or(0.0) as i32,
            h.unwrap_or(0.0) as i32,
        )),
    }
}

impl From<WindowOptions> for WindowSettings {
    fn from(options: WindowOptions) -> Self {
        let defaults = WindowSettings::default();
        Self {
            title: options.title.unwrap_or(defaults.title),
            size: Size::new(
                options.width.map_or(defaults.size.width, |w| w as i32),
                options.height.map_or(defaults.size.height, |h| h as i32),
            ),
            min_size: size_pair(options.min_width, options.min_height),
            max_size: size_pair(options.max_width, options.max_height),
            resizable: options.resizable.unwrap_or(defaults.resizable),
            debug: options.debug.unwrap_or(defaults.debug),
            auto_focus: options.auto_focus.unwrap_or(defaults.auto_focus),
            data_path: options
                .data_path
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        }
    }
}
