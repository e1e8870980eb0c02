pub use systray_core::*;

mod tray;
pub use tray::{BackendChoice, TrayManager};

#[cfg(feature = "gtk")]
pub use systray_gtk as gtk;

#[cfg(feature = "fallback")]
pub use systray_fallback as fallback;
