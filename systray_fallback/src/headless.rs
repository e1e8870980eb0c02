//! A [`HostTray`] that keeps its icons in memory.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, bail};
use dpi::PhysicalPosition;
use image::RgbaImage;

use crate::host::{HostTray, IconHandle, MouseListener};

/// An icon as the host currently sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIcon {
    pub handle: IconHandle,
    pub installed: bool,
    pub tooltip: Option<String>,
    pub size: (u32, u32),
    /// How often the cached image was flushed.
    pub flushes: usize,
}

struct IconState {
    installed: bool,
    disposed: bool,
    tooltip: Option<String>,
    size: (u32, u32),
    flushes: usize,
    listener: Option<Arc<dyn Fn(PhysicalPosition<i32>) + Send + Sync>>,
}

struct State {
    supported: bool,
    next: u64,
    icons: BTreeMap<IconHandle, IconState>,
    adds: usize,
    removes: usize,
}

/// Shared in-memory host. Every clone sees the same icons.
#[derive(Clone)]
pub struct HeadlessHost {
    state: Arc<Mutex<State>>,
}

impl Default for HeadlessHost {
    fn default() -> Self {
        HeadlessHost {
            state: Arc::new(Mutex::new(State {
                supported: true,
                next: 0,
                icons: BTreeMap::new(),
                adds: 0,
                removes: 0,
            })),
        }
    }
}

impl std::fmt::Debug for HeadlessHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("HeadlessHost")
            .field("supported", &state.supported)
            .field("icons", &state.icons.len())
            .finish()
    }
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A desktop without a notification area.
    pub fn unsupported() -> Self {
        let host = Self::default();
        host.lock().supported = false;
        host
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The most recently created icon that is not disposed.
    pub fn icon(&self) -> Option<HostIcon> {
        let state = self.lock();
        state
            .icons
            .iter()
            .rev()
            .find(|(_, icon)| !icon.disposed)
            .map(|(handle, icon)| HostIcon {
                handle: *handle,
                installed: icon.installed,
                tooltip: icon.tooltip.clone(),
                size: icon.size,
                flushes: icon.flushes,
            })
    }

    /// Number of icons currently in the notification area.
    pub fn installed(&self) -> usize {
        self.lock().icons.values().filter(|i| i.installed).count()
    }

    /// Total `add` and `remove` calls so far.
    pub fn add_remove_counts(&self) -> (usize, usize) {
        let state = self.lock();
        (state.adds, state.removes)
    }

    /// Simulates a mouse press on the installed icon. Returns whether a listener ran.
    ///
    /// The listener runs on the calling thread.
    pub fn press(&self, position: PhysicalPosition<i32>) -> bool {
        let listener = {
            let state = self.lock();
            state
                .icons
                .values()
                .rev()
                .find(|icon| icon.installed)
                .and_then(|icon| icon.listener.clone())
        };
        match listener {
            Some(listener) => {
                listener(position);
                true
            }
            None => false,
        }
    }
}

impl State {
    fn icon(&mut self, handle: IconHandle) -> anyhow::Result<&mut IconState> {
        match self.icons.get_mut(&handle) {
            Some(icon) if !icon.disposed => Ok(icon),
            _ => bail!("host has no icon {handle:?}"),
        }
    }
}

impl HostTray for HeadlessHost {
    fn is_supported(&self) -> bool {
        self.lock().supported
    }

    fn create_icon(&mut self, image: &RgbaImage) -> anyhow::Result<IconHandle> {
        let mut state = self.lock();
        if !state.supported {
            bail!("no notification area");
        }
        state.next += 1;
        let handle = IconHandle(state.next);
        state.icons.insert(
            handle,
            IconState {
                installed: false,
                disposed: false,
                tooltip: None,
                size: image.dimensions(),
                flushes: 0,
                listener: None,
            },
        );
        Ok(handle)
    }

    fn add_icon(&mut self, handle: IconHandle) -> anyhow::Result<()> {
        let mut state = self.lock();
        let icon = state.icon(handle).context("adding tray icon")?;
        if icon.installed {
            bail!("icon {handle:?} is already in the notification area");
        }
        icon.installed = true;
        state.adds += 1;
        Ok(())
    }

    fn remove_icon(&mut self, handle: IconHandle) {
        let mut state = self.lock();
        if let Ok(icon) = state.icon(handle) {
            if icon.installed {
                icon.installed = false;
                state.removes += 1;
            }
        }
    }

    fn set_image(&mut self, handle: IconHandle, image: &RgbaImage) {
        if let Ok(icon) = self.lock().icon(handle) {
            icon.size = image.dimensions();
        }
    }

    fn flush_image(&mut self, handle: IconHandle) {
        if let Ok(icon) = self.lock().icon(handle) {
            icon.flushes += 1;
        }
    }

    fn set_tooltip(&mut self, handle: IconHandle, tooltip: Option<&str>) {
        if let Ok(icon) = self.lock().icon(handle) {
            icon.tooltip = tooltip.map(str::to_owned);
        }
    }

    fn set_mouse_listener(&mut self, handle: IconHandle, listener: MouseListener) {
        if let Ok(icon) = self.lock().icon(handle) {
            icon.listener = Some(Arc::from(listener));
        }
    }

    fn dispose_icon(&mut self, handle: IconHandle) {
        if let Ok(icon) = self.lock().icon(handle) {
            icon.installed = false;
            icon.disposed = true;
            icon.listener = None;
        }
    }
}
