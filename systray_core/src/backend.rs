//! The contract every host backend implements.
//!
//! All methods are invoked on the backend's UI thread, one at a time. Native peers are only
//! ever touched from there.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::attributes::IconSizes;
use crate::dispatch::Dispatcher;
use crate::ids::{MenuId, PeerHandle};
use crate::image::ImageCache;
use crate::menu::{Entry, WeakEntry};

/// A property of an entry whose new value must be pushed to the native peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Text,
    Image,
    Shortcut,
    Enabled,
    Checked,
    Tooltip,
    Callback,
}

/// Where a new peer goes.
#[derive(Debug)]
pub struct PeerRequest<'a> {
    pub entry: &'a Entry,
    /// The logical menu the entry is appended to.
    pub menu: MenuId,
    /// Insertion position among the siblings that already have peers.
    pub index: usize,
}

/// A host backend: GTK status icon, app indicator, or the fallback desktop tray.
///
/// Operations that a backend cannot honor must be silent no-ops rather than errors.
pub trait Backend: Send {
    fn name(&self) -> &'static str;

    /// Sets up the native icon and the native peer of the root menu.
    fn create_tray(&mut self, root: MenuId, image: Option<&Path>, tooltip: &str)
    -> anyhow::Result<()>;

    /// Binds a native peer to `request.entry`. For submenus this also creates the peer of the
    /// nested menu, keyed by its [`MenuId`].
    fn create_peer(&mut self, request: PeerRequest<'_>) -> anyhow::Result<PeerHandle>;

    /// Pushes the entry's current value of `property` to its peer.
    fn apply_property(
        &mut self,
        peer: PeerHandle,
        entry: &Entry,
        property: Property,
    ) -> anyhow::Result<()>;

    /// Releases the peer and any native resources hanging off it, including its image.
    fn destroy_peer(&mut self, peer: PeerHandle) -> anyhow::Result<()>;

    fn set_tray_image(&mut self, image: Option<&Path>) -> anyhow::Result<()>;

    fn set_tray_tooltip(&mut self, tooltip: &str) -> anyhow::Result<()>;

    /// Toggles presence in the notification area.
    fn set_tray_visible(&mut self, visible: bool) -> anyhow::Result<()>;

    /// Destroys every remaining peer and releases the tray. Must not fail.
    fn shutdown(&mut self);
}

/// What a backend is handed when it is built on the UI thread.
#[derive(Clone)]
pub struct Services {
    pub images: Arc<ImageCache>,
    pub sizes: IconSizes,
    pub activations: ActivationSink,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("images", &self.images.dir())
            .field("sizes", &self.sizes)
            .finish_non_exhaustive()
    }
}

/// Runs activation callbacks off the UI thread.
///
/// Native activate handlers hold a [`WeakEntry`] and call [`ActivationSink::activate`]; the
/// entry's callback is read once on the callback thread.
#[derive(Clone, Debug)]
pub struct ActivationSink {
    callbacks: Dispatcher,
}

impl ActivationSink {
    pub(crate) fn new(callbacks: Dispatcher) -> Self {
        ActivationSink { callbacks }
    }

    pub fn activate(&self, target: &WeakEntry) {
        let Some(entry) = target.upgrade() else {
            debug!("Activation for a dropped entry ignored");
            return;
        };
        let id = entry.id();
        if self.callbacks.submit(move || entry.activate()).is_err() {
            debug!(entry = %id, "Activation after shutdown ignored");
        }
    }
}

/// Builds a backend on the UI thread.
pub struct BackendFactory {
    name: &'static str,
    build: Box<dyn FnOnce(Services) -> anyhow::Result<Box<dyn Backend>> + Send>,
}

impl std::fmt::Debug for BackendFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendFactory")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl BackendFactory {
    pub fn new<F>(name: &'static str, build: F) -> Self
    where
        F: FnOnce(Services) -> anyhow::Result<Box<dyn Backend>> + Send + 'static,
    {
        BackendFactory {
            name,
            build: Box::new(build),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn build(self, services: Services) -> anyhow::Result<Box<dyn Backend>> {
        (self.build)(services)
    }
}
