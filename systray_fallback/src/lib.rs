//! Tray backend for desktops without GTK: the icon goes through the host's generic tray API
//! and the menu is an in-process [`Popup`].

mod backend;
pub mod headless;
pub mod host;
pub mod popup;

pub use backend::FallbackBackend;
pub use host::{HostTray, IconHandle, MouseListener};
pub use popup::{Popup, RowId, RowSnapshot};

use systray_core::{Backend, BackendFactory};

/// A factory that builds a [`FallbackBackend`] drawing into `popup`.
pub fn factory<H: HostTray + 'static>(host: H, popup: Popup) -> BackendFactory {
    BackendFactory::new(backend::NAME, move |services| {
        let backend = FallbackBackend::new(host, popup, services)?;
        Ok(Box::new(backend) as Box<dyn Backend>)
    })
}
