use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// Opaque identifier of a native window (the raw `HWND` value on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(isize);

impl WindowHandle {
    pub const fn from_raw(raw: isize) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> isize {
        self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Maps native window handles to the logical window that owns them.
///
/// Owned by whatever constructs windows. Lookups may come from the
/// window procedure while another window registers, so the map sits behind
/// a reader-writer lock.
pub struct WindowRegistry<W> {
    windows: RwLock<HashMap<WindowHandle, W>>,
}

impl<W: Clone> WindowRegistry<W> {
    pub fn new() -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Associate `handle` with `window`, returning the previous association.
    pub fn register(&self, handle: WindowHandle, window: W) -> Option<W> {
        self.windows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, window)
    }

    pub fn lookup(&self, handle: WindowHandle) -> Option<W> {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
    }

    /// Drop the association for a destroyed window.
    pub fn remove(&self, handle: WindowHandle) -> Option<W> {
        self.windows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<W: Clone> Default for WindowRegistry<W> {
    fn default() -> Self {
        Self::new()
    }
}
