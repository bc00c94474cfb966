use std::path::PathBuf;

/// Width and height in pixels. A zero component means "unset" wherever a
/// size is used as a constraint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Both components are positive.
    pub const fn is_set(self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// How `set_size` interprets the requested size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SizeHint {
    /// Resize the window; the user can resize it too.
    #[default]
    None,
    /// Resize the window and lock its size.
    Fixed,
    /// Record the minimum tracking size.
    Min,
    /// Record the maximum size.
    Max,
}

/// Everything a window is created with.
#[derive(Debug, Clone)]
pub struct WindowSettings {
    pub title: String,
    pub size: Size,
    pub min_size: Option<Size>,
    pub max_size: Option<Size>,
    pub resizable: bool,
    /// Enables the browser's developer tools.
    pub debug: bool,
    /// Keep the browser focused whenever the window is activated.
    pub auto_focus: bool,
    /// User-data folder for the browser engine. Engine default when `None`.
    pub data_path: Option<PathBuf>,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: String::new(),
            size: Size::new(640, 480),
            min_size: None,
            max_size: None,
            resizable: true,
            debug: false,
            auto_focus: false,
            data_path: None,
        }
    }
}
