use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use image::RgbaImage;
use systray_core::{
    Backend, Entry, EntryKind, Error, MenuId, PeerHandle, PeerRequest, Property, Services,
};
use tracing::{debug, trace, warn};

use crate::host::{HostTray, IconHandle};
use crate::popup::{ClickHandler, Popup, RowId};

pub(crate) const NAME: &str = "fallback";

/// Registers the icon through a [`HostTray`] and draws the menu as an in-process
/// [`Popup`].
///
/// The host icon carries no label, so only the popup rows show entry text and mnemonics.
pub struct FallbackBackend<H> {
    host: H,
    popup: Popup,
    services: Services,
    icon: Option<IconHandle>,
    // Whether the icon should be in the notification area.
    visible: bool,
    installed: bool,
    tooltip: String,
    rows: HashMap<PeerHandle, RowId>,
    next_peer: u64,
}

impl<H> std::fmt::Debug for FallbackBackend<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackBackend")
            .field("icon", &self.icon)
            .field("visible", &self.visible)
            .field("installed", &self.installed)
            .field("rows", &self.rows.len())
            .finish()
    }
}

fn load_bitmap(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path).with_context(|| format!("loading {}", path.display()))?;
    Ok(image.into_rgba8())
}

impl<H: HostTray> FallbackBackend<H> {
    pub fn new(host: H, popup: Popup, services: Services) -> Result<Self> {
        if !host.is_supported() {
            bail!("the desktop has no notification area");
        }
        Ok(FallbackBackend {
            host,
            popup,
            services,
            icon: None,
            visible: true,
            installed: false,
            tooltip: String::new(),
            rows: HashMap::new(),
            next_peer: 0,
        })
    }

    fn row(&self, peer: PeerHandle) -> Result<RowId> {
        self.rows
            .get(&peer)
            .copied()
            .ok_or_else(|| anyhow!("unknown peer {peer:?}"))
    }

    fn install(&mut self) -> Result<()> {
        let Some(icon) = self.icon else {
            // Added once the first image arrives.
            return Ok(());
        };
        if self.installed {
            return Ok(());
        }
        self.host.add_icon(icon).context("adding the tray icon")?;
        self.host.set_tooltip(icon, Some(&self.tooltip));
        self.installed = true;
        Ok(())
    }

    fn uninstall(&mut self) {
        if let (Some(icon), true) = (self.icon, self.installed) {
            self.host.remove_icon(icon);
            self.installed = false;
        }
    }

    fn create_icon(&mut self, bitmap: &RgbaImage) -> Result<IconHandle> {
        let icon = self.host.create_icon(bitmap).context("creating the tray icon")?;
        self.host.set_tooltip(icon, Some(&self.tooltip));
        let popup = self.popup.clone();
        self.host
            .set_mouse_listener(icon, Box::new(move |position| popup.show_at(position)));
        Ok(icon)
    }

    fn set_icon_image(&mut self, path: &Path) -> Result<()> {
        let bitmap = load_bitmap(path)?;
        let icon = match self.icon {
            Some(icon) => {
                self.host.set_image(icon, &bitmap);
                icon
            }
            None => {
                let icon = self.create_icon(&bitmap)?;
                self.icon = Some(icon);
                if self.visible {
                    self.install()?;
                }
                icon
            }
        };
        // Some hosts keep a lazily scaled copy around after the first flush.
        self.host.flush_image(icon);
        self.host.flush_image(icon);
        Ok(())
    }

    fn update_text(&mut self, peer: PeerHandle, entry: &Entry) -> Result<()> {
        let row = self.row(peer)?;
        if entry.kind() == EntryKind::Separator {
            return Ok(());
        }
        self.popup.set_text(row, &entry.text(), entry.shortcut())
    }

    fn update_sensitivity(&mut self, peer: PeerHandle, entry: &Entry) -> Result<()> {
        let row = self.row(peer)?;
        self.popup.set_enabled(row, entry.is_sensitive())?;

        let on_click = match entry.kind() {
            EntryKind::Item | EntryKind::Checkbox if entry.has_callback() => {
                let sink = self.services.activations.clone();
                let target = entry.downgrade();
                Some(Arc::new(move || sink.activate(&target)) as ClickHandler)
            }
            _ => None,
        };
        self.popup.set_on_click(row, on_click)
    }

    /// An icon that cannot be normalized behaves like no icon.
    fn update_icon(&mut self, peer: PeerHandle, entry: &Entry) -> Result<()> {
        let row = self.row(peer)?;
        let path = entry.image().and_then(|source| {
            self.services
                .images
                .normalize(&source, self.services.sizes.entry)
                .map_err(|err| warn!(entry = %entry.id(), "{}", Error::from(err)))
                .ok()
        });
        self.popup.set_icon(row, path)
    }
}

impl<H: HostTray> Backend for FallbackBackend<H> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn create_tray(&mut self, root: MenuId, image: Option<&Path>, tooltip: &str) -> Result<()> {
        self.popup.reset(root);
        self.tooltip = tooltip.to_owned();
        if let Some(path) = image {
            self.set_icon_image(path)?;
            self.popup.set_title_image(Some(path.to_owned()));
        }
        debug!(icon = ?self.icon, "Fallback tray created");
        Ok(())
    }

    fn create_peer(&mut self, request: PeerRequest<'_>) -> Result<PeerHandle> {
        let PeerRequest { entry, menu, index } = request;
        let nested = entry.menu().map(|nested| nested.id());
        let row = self.popup.insert(menu, index, entry.kind(), nested)?;

        self.next_peer += 1;
        let Some(peer) = PeerHandle::from_raw(self.next_peer) else {
            self.popup.remove(row);
            bail!("peer handle space exhausted");
        };
        self.rows.insert(peer, row);

        self.update_text(peer, entry)?;
        self.update_sensitivity(peer, entry)?;
        self.popup.set_checked(row, entry.is_checked())?;
        self.popup.set_tooltip(row, entry.tooltip())?;
        self.update_icon(peer, entry)?;

        trace!(?peer, entry = %entry.id(), %menu, index, "Row created");
        Ok(peer)
    }

    fn apply_property(&mut self, peer: PeerHandle, entry: &Entry, property: Property) -> Result<()> {
        match property {
            Property::Text | Property::Shortcut => self.update_text(peer, entry),
            Property::Enabled | Property::Callback => self.update_sensitivity(peer, entry),
            Property::Checked => self.popup.set_checked(self.row(peer)?, entry.is_checked()),
            Property::Tooltip => self.popup.set_tooltip(self.row(peer)?, entry.tooltip()),
            Property::Image => self.update_icon(peer, entry),
        }
    }

    fn destroy_peer(&mut self, peer: PeerHandle) -> Result<()> {
        let row = self
            .rows
            .remove(&peer)
            .ok_or_else(|| anyhow!("unknown peer {peer:?}"))?;
        self.popup.remove(row);
        Ok(())
    }

    fn set_tray_image(&mut self, image: Option<&Path>) -> Result<()> {
        match image {
            Some(path) => self.set_icon_image(path)?,
            None => trace!("Host icons always need an image, keeping the current one"),
        }
        self.popup.set_title_image(image.map(Path::to_owned));
        Ok(())
    }

    fn set_tray_tooltip(&mut self, tooltip: &str) -> Result<()> {
        self.tooltip = tooltip.to_owned();
        if let Some(icon) = self.icon {
            self.host.set_tooltip(icon, Some(tooltip));
        }
        Ok(())
    }

    /// Hiding removes the icon from the notification area; showing adds it back with the
    /// last tooltip.
    fn set_tray_visible(&mut self, visible: bool) -> Result<()> {
        self.visible = visible;
        if visible {
            self.install()
        } else {
            self.popup.hide();
            self.uninstall();
            Ok(())
        }
    }

    fn shutdown(&mut self) {
        debug!(rows = self.rows.len(), "Shutting down fallback tray");
        self.uninstall();
        if let Some(icon) = self.icon.take() {
            self.host.dispose_icon(icon);
        }
        self.rows.clear();
        self.popup.clear();
    }
}
