use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::attributes::{IconSizes, TrayAttributes};
use crate::backend::{ActivationSink, Backend, BackendFactory, Services};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::ids::{MenuId, TrayId};
use crate::image::{ImageCache, ImageSource};
use crate::menu::Menu;

/// Lifecycle of a tray, shared by every backend.
///
/// ```text
/// Uninitialized --create--> Visible <--set_enabled--> Hidden
/// {Visible, Hidden} --shutdown--> Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayState {
    Uninitialized,
    Visible,
    Hidden,
    Terminated,
}

struct TrayProps {
    image: Option<ImageSource>,
    tooltip: String,
    enabled: bool,
    state: TrayState,
}

pub(crate) struct Shared {
    id: TrayId,
    backend_name: &'static str,
    ui: Dispatcher,
    callbacks: Dispatcher,
    images: Arc<ImageCache>,
    sizes: IconSizes,
    // Only locked on the UI thread.
    backend: Mutex<Box<dyn Backend>>,
    props: Mutex<TrayProps>,
    root: Menu,
}

impl Shared {
    /// Enqueues `job` to run against the backend on the UI thread.
    pub(crate) fn run<F>(self: &Arc<Self>, job: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Backend) + Send + 'static,
    {
        self.ui.submit(self.bind(job))
    }

    fn bind<F>(self: &Arc<Self>, job: F) -> impl FnOnce() + Send + 'static
    where
        F: FnOnce(&mut dyn Backend) + Send + 'static,
    {
        let shared = Arc::clone(self);
        move || {
            let mut backend = shared.backend.lock().unwrap_or_else(PoisonError::into_inner);
            job(backend.as_mut());
        }
    }

    fn props(&self) -> MutexGuard<'_, TrayProps> {
        self.props.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn normalize_tray_image(&self) -> Option<PathBuf> {
        let source = self.props().image.clone()?;
        normalize_or_log(&self.images, &source, self.sizes.tray)
    }
}

fn normalize_or_log(images: &ImageCache, source: &ImageSource, size: u32) -> Option<PathBuf> {
    match images.normalize(source, size) {
        Ok(path) => Some(path),
        Err(err) => {
            warn!(?source, "{}", Error::from(err));
            None
        }
    }
}

/// A tray icon with its popup menu, bound to one backend.
///
/// Every mutation returns before the native side has been updated; [`Tray::flush`] waits for
/// everything queued so far. Dropping the tray shuts it down.
pub struct Tray {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Tray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tray")
            .field("id", &self.shared.id)
            .field("backend", &self.shared.backend_name)
            .field("state", &self.state())
            .finish()
    }
}

impl Tray {
    /// Spawns the UI thread, builds the backend on it and installs the icon.
    ///
    /// Any failure up to the installed icon is reported as [`Error::BackendUnavailable`] so
    /// the caller can try another backend.
    pub fn new(factory: BackendFactory, attr: TrayAttributes) -> Result<Self> {
        let backend_name = factory.name();
        let unavailable = |reason: String| Error::BackendUnavailable {
            backend: backend_name,
            reason,
        };

        let images = match &attr.cache_dir {
            Some(dir) => ImageCache::new(dir.clone()),
            None => ImageCache::open_default(),
        }
        .map(Arc::new)
        .map_err(|e| unavailable(format!("image cache: {e}")))?;

        let id = TrayId::next();
        let ui = Dispatcher::spawn(format!("systray-ui-{id}"))
            .map_err(|e| unavailable(format!("could not spawn UI thread: {e}")))?;
        let callbacks = match Dispatcher::spawn(format!("systray-callbacks-{id}")) {
            Ok(callbacks) => callbacks,
            Err(e) => {
                ui.shutdown();
                return Err(unavailable(format!("could not spawn callback thread: {e}")));
            }
        };

        debug!(tray = %id, backend = backend_name, "Creating tray");

        let root_id = MenuId::next();
        let services = Services {
            images: images.clone(),
            sizes: attr.sizes,
            activations: ActivationSink::new(callbacks.clone()),
        };
        let tooltip = attr.tooltip.clone();
        let icon = attr.icon.clone();
        let enabled = attr.enabled;

        let built = ui.submit_and_wait(move || -> anyhow::Result<Box<dyn Backend>> {
            let mut backend = factory.build(services.clone())?;
            let image = icon
                .as_ref()
                .and_then(|source| normalize_or_log(&services.images, source, services.sizes.tray));
            backend.create_tray(root_id, image.as_deref(), &tooltip)?;
            if !enabled {
                backend.set_tray_visible(false)?;
            }
            Ok(backend)
        });

        let backend = match built {
            Ok(Ok(backend)) => backend,
            Ok(Err(err)) => {
                ui.shutdown();
                callbacks.shutdown();
                return Err(unavailable(format!("{err:#}")));
            }
            Err(err) => {
                ui.shutdown();
                callbacks.shutdown();
                return Err(unavailable(err.to_string()));
            }
        };

        let shared = Arc::new_cyclic(|weak| Shared {
            id,
            backend_name,
            ui,
            callbacks,
            images,
            sizes: attr.sizes,
            backend: Mutex::new(backend),
            props: Mutex::new(TrayProps {
                image: attr.icon,
                tooltip: attr.tooltip,
                enabled,
                state: if enabled {
                    TrayState::Visible
                } else {
                    TrayState::Hidden
                },
            }),
            root: Menu::root(root_id, weak.clone()),
        });

        info!(tray = %id, backend = backend_name, "Tray created");
        Ok(Tray { shared })
    }

    pub fn id(&self) -> TrayId {
        self.shared.id
    }

    pub fn backend_name(&self) -> &'static str {
        self.shared.backend_name
    }

    /// The root menu.
    pub fn menu(&self) -> Menu {
        self.shared.root.clone()
    }

    pub fn state(&self) -> TrayState {
        self.shared.props().state
    }

    pub fn image(&self) -> Option<ImageSource> {
        self.shared.props().image.clone()
    }

    pub fn tooltip(&self) -> String {
        self.shared.props().tooltip.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.props().enabled
    }

    pub fn set_image(&self, image: Option<ImageSource>) -> Result<()> {
        self.shared.props().image = image;
        let shared = Arc::clone(&self.shared);
        self.shared.run(move |backend| {
            // Resolved at dispatch time so the latest image wins when several are queued.
            let path = shared.normalize_tray_image();
            if let Err(err) = backend.set_tray_image(path.as_deref()) {
                warn!("{}", Error::native("set_tray_image", &err));
            }
        })
    }

    pub fn set_tooltip(&self, tooltip: impl Into<String>) -> Result<()> {
        self.shared.props().tooltip = tooltip.into();
        let shared = Arc::clone(&self.shared);
        self.shared.run(move |backend| {
            let tooltip = shared.props().tooltip.clone();
            if let Err(err) = backend.set_tray_tooltip(&tooltip) {
                warn!("{}", Error::native("set_tray_tooltip", &err));
            }
        })
    }

    /// `false` takes the icon out of the notification area, `true` puts it back.
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        {
            let mut props = self.shared.props();
            if props.state == TrayState::Terminated {
                return Err(Error::QueueClosed);
            }
            props.enabled = enabled;
            props.state = if enabled {
                TrayState::Visible
            } else {
                TrayState::Hidden
            };
        }
        let shared = Arc::clone(&self.shared);
        self.shared.run(move |backend| {
            let enabled = shared.props().enabled;
            if let Err(err) = backend.set_tray_visible(enabled) {
                warn!("{}", Error::native("set_tray_visible", &err));
            }
        })
    }

    /// Blocks until every job queued before this call has run.
    pub fn flush(&self) -> Result<()> {
        self.shared.ui.submit_and_wait(|| ())
    }

    /// Tears down the backend, drains both queues and joins their threads. Idempotent and
    /// best-effort; mutations afterwards fail with [`Error::QueueClosed`].
    ///
    /// Returns only once the UI thread has finished, even when another thread is already
    /// shutting the same tray down.
    pub fn shutdown(&self) {
        let first = {
            let mut props = self.shared.props();
            let first = props.state != TrayState::Terminated;
            props.state = TrayState::Terminated;
            first
        };

        // The teardown is the last job the UI thread ever runs.
        let shared = Arc::clone(&self.shared);
        self.shared.ui.shutdown_with(self.shared.bind(move |backend| {
            backend.shutdown();
            shared.root.clear_peers();
        }));
        self.shared.callbacks.shutdown();
        if first {
            info!(tray = %self.shared.id, "Tray shut down");
        }
    }
}

impl Drop for Tray {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{PeerRequest, Property};
    use crate::ids::PeerHandle;
    use crate::menu::Entry;
    use std::path::Path;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        CreateTray(String),
        Create(String, usize),
        Apply(String, Property),
        Destroy(u64),
        Visible(bool),
        Tooltip(String),
        Shutdown,
    }

    struct Recording {
        calls: Arc<Mutex<Vec<Call>>>,
        next: u64,
    }

    impl Backend for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn create_tray(&mut self, _: MenuId, _: Option<&Path>, tooltip: &str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::CreateTray(tooltip.to_string()));
            Ok(())
        }

        fn create_peer(&mut self, request: PeerRequest<'_>) -> anyhow::Result<PeerHandle> {
            self.next += 1;
            self.calls
                .lock()
                .unwrap()
                .push(Call::Create(request.entry.text(), request.index));
            Ok(PeerHandle::from_raw(self.next).unwrap())
        }

        fn apply_property(&mut self, _: PeerHandle, entry: &Entry, property: Property) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Apply(entry.text(), property));
            Ok(())
        }

        fn destroy_peer(&mut self, peer: PeerHandle) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Destroy(peer.into_raw()));
            Ok(())
        }

        fn set_tray_image(&mut self, _: Option<&Path>) -> anyhow::Result<()> {
            Ok(())
        }

        fn set_tray_tooltip(&mut self, tooltip: &str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Tooltip(tooltip.to_string()));
            Ok(())
        }

        fn set_tray_visible(&mut self, visible: bool) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Visible(visible));
            Ok(())
        }

        fn shutdown(&mut self) {
            self.calls.lock().unwrap().push(Call::Shutdown);
        }
    }

    fn recording_tray(dir: &Path) -> (Tray, Arc<Mutex<Vec<Call>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let factory = {
            let calls = calls.clone();
            BackendFactory::new("recording", move |_| {
                Ok(Box::new(Recording { calls, next: 0 }) as Box<dyn Backend>)
            })
        };
        let tray = Tray::new(
            factory,
            TrayAttributes::default()
                .with_tooltip("tip")
                .with_cache_dir(dir),
        )
        .unwrap();
        (tray, calls)
    }

    #[test]
    fn factory_failure_is_backend_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let factory = BackendFactory::new("broken", |_| anyhow::bail!("no display"));
        let err = Tray::new(factory, TrayAttributes::default().with_cache_dir(tmp.path()))
            .unwrap_err();
        match err {
            Error::BackendUnavailable { backend, reason } => {
                assert_eq!(backend, "broken");
                assert!(reason.contains("no display"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn setters_reach_the_backend_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let (tray, calls) = recording_tray(tmp.path());

        let entry = tray.menu().add_item("File", |_| {}).unwrap();
        tray.flush().unwrap();
        entry.set_text("Files").unwrap();
        entry.set_enabled(false).unwrap();
        tray.flush().unwrap();

        let calls = calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                Call::CreateTray("tip".into()),
                Call::Create("File".into(), 0),
                Call::Apply("Files".into(), Property::Text),
                Call::Apply("Files".into(), Property::Enabled),
            ]
        );
    }

    #[test]
    fn removal_destroys_subtree_children_first() {
        let tmp = tempfile::tempdir().unwrap();
        let (tray, calls) = recording_tray(tmp.path());

        let sub = tray.menu().add_submenu("More").unwrap();
        sub.menu().unwrap().add_item("Inner", |_| {}).unwrap();
        tray.flush().unwrap();
        let sub_peer = sub.peer().unwrap().into_raw();
        let inner_peer = sub.menu().unwrap().entries()[0].peer().unwrap().into_raw();

        tray.menu().remove(&sub).unwrap();
        tray.flush().unwrap();

        let calls = calls.lock().unwrap().clone();
        let tail = &calls[calls.len() - 2..];
        assert_eq!(tail, &[Call::Destroy(inner_peer), Call::Destroy(sub_peer)]);
        assert!(sub.peer().is_none());
    }

    #[test]
    fn enabled_toggles_drive_the_state_machine() {
        let tmp = tempfile::tempdir().unwrap();
        let (tray, calls) = recording_tray(tmp.path());
        assert_eq!(tray.state(), TrayState::Visible);

        tray.set_enabled(false).unwrap();
        assert_eq!(tray.state(), TrayState::Hidden);
        tray.set_enabled(true).unwrap();
        assert_eq!(tray.state(), TrayState::Visible);
        tray.flush().unwrap();
        assert!(calls.lock().unwrap().contains(&Call::Visible(true)));

        tray.shutdown();
        assert_eq!(tray.state(), TrayState::Terminated);
        assert!(matches!(tray.set_enabled(true), Err(Error::QueueClosed)));
        assert_eq!(tray.state(), TrayState::Terminated);
        assert_eq!(calls.lock().unwrap().last(), Some(&Call::Shutdown));
    }

    #[test]
    fn mutation_after_shutdown_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (tray, _calls) = recording_tray(tmp.path());
        let entry = tray.menu().add_item("File", |_| {}).unwrap();

        tray.shutdown();
        tray.shutdown();

        assert!(matches!(entry.set_text("x"), Err(Error::QueueClosed)));
        assert!(matches!(tray.set_tooltip("x"), Err(Error::QueueClosed)));
        assert!(matches!(tray.flush(), Err(Error::QueueClosed)));
        // The model still records the value.
        assert_eq!(entry.text(), "x");
    }

    #[test]
    fn structural_changes_after_shutdown_leave_the_tree_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let (tray, _calls) = recording_tray(tmp.path());
        let kept = tray.menu().add_item("Kept", |_| {}).unwrap();
        tray.shutdown();

        let late = Entry::item("Late");
        assert!(matches!(tray.menu().add(&late), Err(Error::QueueClosed)));
        assert!(!late.is_attached());
        assert_eq!(tray.menu().len(), 1);

        assert!(matches!(tray.menu().remove(&kept), Err(Error::QueueClosed)));
        assert_eq!(kept.parent(), Some(tray.menu()));
        assert_eq!(tray.menu().entries(), vec![kept]);
    }

    #[test]
    fn nothing_reaches_the_backend_after_its_teardown() {
        let tmp = tempfile::tempdir().unwrap();
        let (tray, calls) = recording_tray(tmp.path());
        let tray = Arc::new(tray);

        let writer = {
            let tray = tray.clone();
            std::thread::spawn(move || {
                let mut n = 0u32;
                while tray.set_tooltip(format!("t{n}")).is_ok() {
                    n += 1;
                }
            })
        };
        let closers: Vec<_> = (0..2)
            .map(|_| {
                let tray = tray.clone();
                let calls = calls.clone();
                std::thread::spawn(move || {
                    tray.shutdown();
                    assert_eq!(calls.lock().unwrap().last(), Some(&Call::Shutdown));
                })
            })
            .collect();

        for closer in closers {
            closer.join().unwrap();
        }
        writer.join().unwrap();
        assert_eq!(calls.lock().unwrap().last(), Some(&Call::Shutdown));
    }

    #[test]
    fn removed_entries_absorb_mutations() {
        let tmp = tempfile::tempdir().unwrap();
        let (tray, calls) = recording_tray(tmp.path());
        let entry = tray.menu().add_item("File", |_| {}).unwrap();
        tray.menu().remove(&entry).unwrap();
        tray.flush().unwrap();
        let before = calls.lock().unwrap().len();

        entry.set_text("ghost").unwrap();
        tray.flush().unwrap();
        assert_eq!(calls.lock().unwrap().len(), before);
    }
}
