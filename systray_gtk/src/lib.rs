//! GTK backends: the classic `GtkStatusIcon` and the libappindicator variant.
//!
//! Both share one adapter, [`GtkBackend`], parameterized by a [`Flavor`]. The toolkit itself
//! is reached through the [`Gtk`] trait so the adapter can run against real bindings or the
//! in-memory [`headless::HeadlessGtk`].

mod backend;
pub mod headless;
pub mod native;

pub use backend::{Flavor, GtkBackend};
pub use native::{Gtk, SignalId, Widget};

use systray_core::{Backend, BackendFactory};

/// A factory that builds a [`GtkBackend`] of `flavor` on the tray's UI thread.
pub fn factory<G: Gtk + 'static>(gtk: G, flavor: Flavor) -> BackendFactory {
    BackendFactory::new(flavor.name(), move |services| {
        let backend = GtkBackend::new(gtk, flavor, services)?;
        Ok(Box::new(backend) as Box<dyn Backend>)
    })
}

pub fn status_icon<G: Gtk + 'static>(gtk: G) -> BackendFactory {
    factory(gtk, Flavor::StatusIcon)
}

pub fn app_indicator<G: Gtk + 'static>(gtk: G) -> BackendFactory {
    factory(gtk, Flavor::AppIndicator)
}
