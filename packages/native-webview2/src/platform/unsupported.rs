use crate::window_manager::Command;

/// WebView2 only exists on Windows. This type has no values, so every
/// platform operation is unreachable once `new` has failed.
pub enum UnsupportedPlatform {}

impl UnsupportedPlatform {
    pub fn new() -> napi::Result<Self> {
        Err(napi::Error::from_reason(
            "Unsupported platform. Only Windows is supported.",
        ))
    }

    pub fn process_command(&mut self, _cmd: Command) -> napi::Result<()> {
        match *self {}
    }

    pub fn pump_events(&mut self) -> bool {
        match *self {}
    }
}
