use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use systray_core::{
    Backend, Entry, EntryKind, Error, MenuId, PeerHandle, PeerRequest, Property, Services,
};
use tracing::{debug, trace, warn};

use crate::native::{Gtk, SignalId, Widget};

/// Which GTK notification-area API a [`GtkBackend`] drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// `GtkStatusIcon`, the XEmbed system tray.
    StatusIcon,
    /// libappindicator, exported over D-Bus by the desktop shell.
    AppIndicator,
}

impl Flavor {
    /// The name trays built with this flavor report.
    pub fn name(self) -> &'static str {
        match self {
            Flavor::StatusIcon => "gtk-status-icon",
            Flavor::AppIndicator => "app-indicator",
        }
    }

    /// Indicators have no per-item or per-icon tooltips.
    fn supports_tooltips(self) -> bool {
        self == Flavor::StatusIcon
    }

    /// Indicator shells render item icons themselves, if at all.
    fn supports_entry_images(self) -> bool {
        self == Flavor::StatusIcon
    }
}

struct NativeMenu {
    widget: Widget,
    // In display order.
    items: Vec<PeerHandle>,
}

// `item` is floating only between its constructor and `menu_shell_insert`, both inside
// `create_peer`; from then on the native menu owns it and `widget_destroy` tears it down.
struct Peer {
    item: Widget,
    kind: EntryKind,
    menu: MenuId,
    submenu: Option<MenuId>,
    image: Option<Widget>,
    // Whether `image` is the entry's own icon rather than a spacer.
    has_icon: bool,
    signal: Option<SignalId>,
}

impl Peer {
    /// Only `GtkImageMenuItem`s carry an image; check items and separators do not.
    fn shows_images(&self) -> bool {
        !matches!(self.kind, EntryKind::Separator | EntryKind::Checkbox)
    }
}

/// Drives a GTK status icon or app indicator through a [`Gtk`] toolkit.
///
/// Keeps one native menu per logical [`MenuId`] and the widgets bound to every
/// [`PeerHandle`]. Within each menu either every item shows an image or none does; items
/// without an icon of their own get a transparent spacer while a sibling has one.
pub struct GtkBackend<G> {
    gtk: G,
    flavor: Flavor,
    services: Services,
    icon: Option<Widget>,
    tooltip: String,
    menus: HashMap<MenuId, NativeMenu>,
    peers: HashMap<PeerHandle, Peer>,
    next_peer: u64,
}

impl<G> std::fmt::Debug for GtkBackend<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GtkBackend")
            .field("flavor", &self.flavor)
            .field("icon", &self.icon)
            .field("tooltip", &self.tooltip)
            .field("menus", &self.menus.len())
            .field("peers", &self.peers.len())
            .finish()
    }
}

impl<G: Gtk> GtkBackend<G> {
    /// Initializes the toolkit. Must run on the UI thread.
    pub fn new(mut gtk: G, flavor: Flavor, services: Services) -> Result<Self> {
        gtk.init()
            .with_context(|| format!("{} needs an initialized GTK", flavor.name()))?;
        debug!(?flavor, "GTK initialized");

        Ok(GtkBackend {
            gtk,
            flavor,
            services,
            icon: None,
            tooltip: String::new(),
            menus: HashMap::new(),
            peers: HashMap::new(),
            next_peer: 0,
        })
    }

    fn icon(&self) -> Result<Widget> {
        self.icon
            .ok_or_else(|| anyhow!("{} has no tray icon yet", self.flavor.name()))
    }

    fn peer(&self, handle: PeerHandle) -> Result<&Peer> {
        self.peers
            .get(&handle)
            .ok_or_else(|| anyhow!("unknown peer {handle:?}"))
    }

    fn render_text(&mut self, handle: PeerHandle, entry: &Entry) -> Result<()> {
        let peer = self.peer(handle)?;
        if peer.kind == EntryKind::Separator {
            return Ok(());
        }
        let item = peer.item;
        self.gtk.menu_item_set_label(item, &entry.rendered_text());
        self.gtk.widget_show_all(item);
        Ok(())
    }

    /// Sensitivity and the `activate` connection follow the entry's callback.
    fn update_sensitivity(&mut self, handle: PeerHandle, entry: &Entry) -> Result<()> {
        let peer = self.peer(handle)?;
        let (item, kind, signal) = (peer.item, peer.kind, peer.signal);
        if kind == EntryKind::Separator {
            return Ok(());
        }

        self.gtk.widget_set_sensitive(item, entry.is_sensitive());

        let wants_signal = matches!(kind, EntryKind::Item | EntryKind::Checkbox)
            && entry.has_callback();
        let signal = match (wants_signal, signal) {
            (true, None) => {
                let sink = self.services.activations.clone();
                let target = entry.downgrade();
                let id = self
                    .gtk
                    .signal_connect_activate(item, Box::new(move || sink.activate(&target)));
                Some(id)
            }
            (false, Some(id)) => {
                self.gtk.signal_handler_disconnect(item, id);
                None
            }
            (_, current) => current,
        };
        if let Some(peer) = self.peers.get_mut(&handle) {
            peer.signal = signal;
        }
        Ok(())
    }

    fn update_checked(&mut self, handle: PeerHandle, entry: &Entry) -> Result<()> {
        let peer = self.peer(handle)?;
        if peer.kind != EntryKind::Checkbox {
            return Ok(());
        }
        let (item, signal) = (peer.item, peer.signal);

        // Programmatic changes must not look like a click.
        if let Some(id) = signal {
            self.gtk.signal_handler_block(item, id);
        }
        self.gtk.check_menu_item_set_active(item, entry.is_checked());
        if let Some(id) = signal {
            self.gtk.signal_handler_unblock(item, id);
        }
        Ok(())
    }

    fn update_tooltip(&mut self, handle: PeerHandle, entry: &Entry) -> Result<()> {
        if !self.flavor.supports_tooltips() {
            trace!(?handle, "Item tooltips unsupported by app indicators");
            return Ok(());
        }
        let item = self.peer(handle)?.item;
        self.gtk
            .widget_set_tooltip_text(item, entry.tooltip().as_deref());
        Ok(())
    }

    /// Loads the entry's icon, replacing whatever image the item showed before.
    ///
    /// An icon that cannot be normalized behaves like no icon.
    fn update_image(&mut self, handle: PeerHandle, entry: &Entry) -> Result<()> {
        if !self.flavor.supports_entry_images() {
            trace!(?handle, "Item icons unsupported by app indicators");
            return Ok(());
        }
        let peer = self.peer(handle)?;
        let (item, menu) = (peer.item, peer.menu);
        if !peer.shows_images() {
            self.sweep(menu);
            return Ok(());
        }

        let path = entry.image().and_then(|source| {
            self.services
                .images
                .normalize(&source, self.services.sizes.entry)
                .map_err(|err| warn!(entry = %entry.id(), "{}", Error::from(err)))
                .ok()
        });

        let image = match path {
            Some(path) => match self.gtk.image_new_from_file(&path) {
                Ok(image) => Some(image),
                Err(err) => {
                    warn!(entry = %entry.id(), "Loading {} failed: {err:#}", path.display());
                    None
                }
            },
            None => None,
        };

        self.replace_image(handle, image, image.is_some());
        if image.is_some() {
            self.gtk.widget_show_all(item);
        }
        self.sweep(menu);
        Ok(())
    }

    fn replace_image(&mut self, handle: PeerHandle, image: Option<Widget>, has_icon: bool) {
        let Some(peer) = self.peers.get_mut(&handle) else {
            return;
        };
        let (item, old) = (peer.item, peer.image.take());
        peer.image = image;
        peer.has_icon = has_icon;

        if let Some(old) = old {
            self.gtk.image_menu_item_set_image(item, None);
            self.gtk.widget_destroy(old);
        }
        if let Some(image) = image {
            self.gtk.image_menu_item_set_image(item, Some(image));
            self.gtk.image_menu_item_set_always_show_image(item, true);
        }
    }

    /// Restores "all items show an image, or none do" for `menu`.
    fn sweep(&mut self, menu: MenuId) {
        if !self.flavor.supports_entry_images() {
            return;
        }
        let Some(native) = self.menus.get(&menu) else {
            return;
        };
        let handles = native.items.clone();
        let any_icon = handles
            .iter()
            .filter_map(|h| self.peers.get(h))
            .any(|p| p.has_icon);

        let spacer = if any_icon {
            match self.services.images.spacer(self.services.sizes.entry) {
                Ok(path) => Some(path),
                Err(err) => {
                    warn!("{}", Error::from(err));
                    None
                }
            }
        } else {
            None
        };

        for handle in handles {
            let Some(peer) = self.peers.get(&handle) else {
                continue;
            };
            if !peer.shows_images() {
                continue;
            }
            let (item, has_icon, has_image) = (peer.item, peer.has_icon, peer.image.is_some());
            match (&spacer, has_image) {
                _ if has_icon => self.gtk.image_menu_item_set_always_show_image(item, true),
                (Some(_), true) => self.gtk.image_menu_item_set_always_show_image(item, true),
                (Some(path), false) => {
                    let image = self.load_spacer(path);
                    self.replace_image(handle, image, false);
                    self.gtk.widget_show_all(item);
                }
                (None, true) => self.replace_image(handle, None, false),
                (None, false) => {}
            }
        }
    }

    fn load_spacer(&mut self, path: &Path) -> Option<Widget> {
        self.gtk
            .image_new_from_file(path)
            .map_err(|err| warn!("Loading spacer failed: {err:#}"))
            .ok()
    }
}

impl<G: Gtk> Backend for GtkBackend<G> {
    fn name(&self) -> &'static str {
        self.flavor.name()
    }

    fn create_tray(&mut self, root: MenuId, image: Option<&Path>, tooltip: &str) -> Result<()> {
        let menu = self.gtk.menu_new();
        self.menus.insert(
            root,
            NativeMenu {
                widget: menu,
                items: Vec::new(),
            },
        );
        self.tooltip = tooltip.to_owned();

        let icon = match self.flavor {
            Flavor::StatusIcon => {
                let icon = self.gtk.status_icon_new().context("creating GtkStatusIcon")?;
                self.gtk.status_icon_set_from_file(icon, image);
                self.gtk.status_icon_set_tooltip_text(icon, tooltip);
                self.gtk.status_icon_attach_menu(icon, menu);
                self.gtk.status_icon_set_visible(icon, true);
                icon
            }
            Flavor::AppIndicator => {
                let id = format!("systray-{}", root);
                let indicator = self
                    .gtk
                    .app_indicator_new(&id, image)
                    .context("creating AppIndicator")?;
                self.gtk.app_indicator_set_menu(indicator, menu);
                self.gtk.app_indicator_set_status(indicator, true);
                indicator
            }
        };
        self.icon = Some(icon);
        debug!(backend = self.name(), ?icon, "Tray created");
        Ok(())
    }

    fn create_peer(&mut self, request: PeerRequest<'_>) -> Result<PeerHandle> {
        let PeerRequest { entry, menu, index } = request;
        let parent = self
            .menus
            .get(&menu)
            .map(|m| m.widget)
            .ok_or_else(|| anyhow!("menu {menu} has no native peer"))?;

        self.next_peer += 1;
        let handle = PeerHandle::from_raw(self.next_peer)
            .ok_or_else(|| anyhow!("peer handle space exhausted"))?;

        let kind = entry.kind();
        let item = match kind {
            EntryKind::Separator => self.gtk.separator_menu_item_new(),
            EntryKind::Checkbox => self
                .gtk
                .check_menu_item_new_with_mnemonic(&entry.rendered_text()),
            EntryKind::Item | EntryKind::Status | EntryKind::Submenu => self
                .gtk
                .image_menu_item_new_with_mnemonic(&entry.rendered_text()),
        };

        let submenu = match (kind, entry.menu()) {
            (EntryKind::Submenu, Some(nested)) => {
                let widget = self.gtk.menu_new();
                self.gtk.menu_item_set_submenu(item, widget);
                self.menus.insert(
                    nested.id(),
                    NativeMenu {
                        widget,
                        items: Vec::new(),
                    },
                );
                Some(nested.id())
            }
            _ => None,
        };

        self.peers.insert(
            handle,
            Peer {
                item,
                kind,
                menu,
                submenu,
                image: None,
                has_icon: false,
                signal: None,
            },
        );

        self.gtk.menu_shell_insert(parent, item, index);
        if let Some(native) = self.menus.get_mut(&menu) {
            let index = index.min(native.items.len());
            native.items.insert(index, handle);
        }

        self.update_sensitivity(handle, entry)?;
        self.update_checked(handle, entry)?;
        self.update_tooltip(handle, entry)?;
        if entry.has_image() {
            // Sweeps the menu as well.
            self.update_image(handle, entry)?;
        } else {
            self.sweep(menu);
        }
        self.gtk.widget_show_all(item);

        trace!(?handle, entry = %entry.id(), %menu, index, "Peer created");
        Ok(handle)
    }

    fn apply_property(&mut self, peer: PeerHandle, entry: &Entry, property: Property) -> Result<()> {
        match property {
            Property::Text | Property::Shortcut => self.render_text(peer, entry),
            Property::Enabled | Property::Callback => self.update_sensitivity(peer, entry),
            Property::Checked => self.update_checked(peer, entry),
            Property::Tooltip => self.update_tooltip(peer, entry),
            Property::Image => self.update_image(peer, entry),
        }
    }

    fn destroy_peer(&mut self, handle: PeerHandle) -> Result<()> {
        let peer = self
            .peers
            .remove(&handle)
            .ok_or_else(|| anyhow!("unknown peer {handle:?}"))?;

        if let Some(id) = peer.signal {
            self.gtk.signal_handler_disconnect(peer.item, id);
        }
        if let Some(image) = peer.image {
            self.gtk.image_menu_item_set_image(peer.item, None);
            self.gtk.widget_destroy(image);
        }
        if let Some(nested) = peer.submenu.and_then(|id| self.menus.remove(&id)) {
            if !nested.items.is_empty() {
                debug!(?handle, "Submenu destroyed with {} live items", nested.items.len());
            }
            self.gtk.widget_destroy(nested.widget);
        }
        self.gtk.widget_destroy(peer.item);

        if let Some(native) = self.menus.get_mut(&peer.menu) {
            native.items.retain(|h| *h != handle);
        }
        self.sweep(peer.menu);

        trace!(?handle, "Peer destroyed");
        Ok(())
    }

    fn set_tray_image(&mut self, image: Option<&Path>) -> Result<()> {
        let icon = self.icon()?;
        match self.flavor {
            Flavor::StatusIcon => self.gtk.status_icon_set_from_file(icon, image),
            Flavor::AppIndicator => self.gtk.app_indicator_set_icon(icon, image),
        }
        Ok(())
    }

    fn set_tray_tooltip(&mut self, tooltip: &str) -> Result<()> {
        self.tooltip = tooltip.to_owned();
        match self.flavor {
            Flavor::StatusIcon => {
                let icon = self.icon()?;
                self.gtk.status_icon_set_tooltip_text(icon, tooltip);
            }
            Flavor::AppIndicator => trace!("Tray tooltips unsupported by app indicators"),
        }
        Ok(())
    }

    fn set_tray_visible(&mut self, visible: bool) -> Result<()> {
        let icon = self.icon()?;
        match self.flavor {
            Flavor::StatusIcon => self.gtk.status_icon_set_visible(icon, visible),
            Flavor::AppIndicator => self.gtk.app_indicator_set_status(icon, visible),
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        debug!(backend = self.name(), peers = self.peers.len(), "Shutting down");

        let handles: Vec<PeerHandle> = self.peers.keys().copied().collect();
        for handle in handles {
            let Some(peer) = self.peers.remove(&handle) else {
                continue;
            };
            if let Some(id) = peer.signal {
                self.gtk.signal_handler_disconnect(peer.item, id);
            }
            if let Some(image) = peer.image {
                self.gtk.widget_destroy(image);
            }
            self.gtk.widget_destroy(peer.item);
        }

        for (_, menu) in self.menus.drain() {
            self.gtk.widget_destroy(menu.widget);
        }

        if let Some(icon) = self.icon.take() {
            match self.flavor {
                Flavor::StatusIcon => self.gtk.status_icon_set_visible(icon, false),
                Flavor::AppIndicator => self.gtk.app_indicator_set_status(icon, false),
            }
            self.gtk.object_unref(icon);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use image::{Rgba, RgbaImage};
    use systray_core::{Entry, ImageSource, Tray, TrayAttributes};

    use super::*;
    use crate::headless::{HeadlessGtk, WidgetKind};

    fn tray(gtk: &HeadlessGtk, flavor: Flavor, dir: &tempfile::TempDir) -> Tray {
        let attr = TrayAttributes::default()
            .with_tooltip("Sync")
            .with_cache_dir(dir.path());
        Tray::new(crate::factory(gtk.clone(), flavor), attr).unwrap()
    }

    fn red() -> ImageSource {
        RgbaImage::from_pixel(40, 40, Rgba([255, 0, 0, 255])).into()
    }

    fn file_name(path: &Option<std::path::PathBuf>) -> String {
        path.as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    #[test]
    fn labels_carry_the_mnemonic() {
        let dir = tempfile::tempdir().unwrap();
        let gtk = HeadlessGtk::new();
        let tray = tray(&gtk, Flavor::StatusIcon, &dir);

        let entry = Entry::item("Open Project").with_shortcut('P');
        tray.menu().add(&entry).unwrap();
        tray.flush().unwrap();
        assert_eq!(gtk.root_items()[0].label, "O_pen Project");

        entry.set_shortcut(Some('j')).unwrap();
        tray.flush().unwrap();
        assert_eq!(gtk.root_items()[0].label, "Open Pro_ject");
    }

    #[test]
    fn spacers_keep_menu_columns_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let gtk = HeadlessGtk::new();
        let tray = tray(&gtk, Flavor::StatusIcon, &dir);
        let menu = tray.menu();

        let a = Entry::item("A").with_image(red());
        menu.add(&a).unwrap();
        menu.add_item("B", |_| {}).unwrap();
        menu.add_separator().unwrap();
        tray.flush().unwrap();

        let items = gtk.root_items();
        assert_eq!(items.len(), 3);
        assert!(file_name(&items[0].image).ends_with("_16.png"));
        assert!(!file_name(&items[0].image).starts_with("spacer"));
        assert_eq!(file_name(&items[1].image), "spacer_16.png");
        assert!(items[0].always_show_image && items[1].always_show_image);
        assert_eq!(items[2].kind, WidgetKind::SeparatorMenuItem);
        assert_eq!(items[2].image, None);

        menu.remove(&a).unwrap();
        tray.flush().unwrap();
        let items = gtk.root_items();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.image.is_none()));
    }

    #[test]
    fn check_items_are_left_out_of_the_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let gtk = HeadlessGtk::new();
        let tray = tray(&gtk, Flavor::StatusIcon, &dir);
        let menu = tray.menu();

        menu.add(&Entry::item("Logo").with_image(red())).unwrap();
        let mute = menu.add_checkbox("Mute", false, |_| {}).unwrap();
        menu.add(&Entry::checkbox("Loud", true).with_image(red()))
            .unwrap();
        menu.add_item("Plain", |_| {}).unwrap();
        tray.flush().unwrap();
        mute.set_image(Some(red())).unwrap();
        tray.flush().unwrap();

        let items = gtk.root_items();
        assert_eq!(items[1].kind, WidgetKind::CheckMenuItem);
        assert_eq!(items[1].image, None);
        assert_eq!(items[2].image, None);
        assert_eq!(file_name(&items[3].image), "spacer_16.png");
        assert!(gtk.criticals().is_empty(), "{:?}", gtk.criticals());
    }

    #[test]
    fn image_changes_resweep_the_menu() {
        let dir = tempfile::tempdir().unwrap();
        let gtk = HeadlessGtk::new();
        let tray = tray(&gtk, Flavor::StatusIcon, &dir);
        let menu = tray.menu();

        let a = menu.add_item("A", |_| {}).unwrap();
        menu.add_item("B", |_| {}).unwrap();
        tray.flush().unwrap();
        assert!(gtk.root_items().iter().all(|i| i.image.is_none()));

        a.set_image(Some(red())).unwrap();
        tray.flush().unwrap();
        assert!(gtk.root_items().iter().all(|i| i.image.is_some()));

        a.set_image(None).unwrap();
        tray.flush().unwrap();
        assert!(gtk.root_items().iter().all(|i| i.image.is_none()));
    }

    #[test]
    fn undecodable_icon_behaves_as_no_icon() {
        let dir = tempfile::tempdir().unwrap();
        let gtk = HeadlessGtk::new();
        let tray = tray(&gtk, Flavor::StatusIcon, &dir);

        let broken = Entry::item("Broken").with_image(ImageSource::from(b"nope".to_vec()));
        tray.menu().add(&broken).unwrap();
        tray.menu().add_item("Other", |_| {}).unwrap();
        tray.flush().unwrap();

        assert!(gtk.root_items().iter().all(|i| i.image.is_none()));
    }

    #[test]
    fn sensitivity_follows_enabled_and_callback() {
        let dir = tempfile::tempdir().unwrap();
        let gtk = HeadlessGtk::new();
        let tray = tray(&gtk, Flavor::StatusIcon, &dir);
        let menu = tray.menu();

        let item = Entry::item("Plain");
        menu.add(&item).unwrap();
        menu.add_status("Up to date").unwrap();
        menu.add_submenu("More").unwrap();
        tray.flush().unwrap();

        let items = gtk.root_items();
        assert!(!items[0].sensitive, "no callback yet");
        assert!(!items[1].sensitive, "status lines are inert");
        assert!(items[2].sensitive);

        item.set_callback(Some(std::sync::Arc::new(|_: &Entry| {}))).unwrap();
        tray.flush().unwrap();
        assert!(gtk.root_items()[0].sensitive);
        assert_eq!(gtk.signal_handlers(gtk.root_items()[0].widget), 1);

        item.set_enabled(false).unwrap();
        tray.flush().unwrap();
        assert!(!gtk.root_items()[0].sensitive);
        assert!(!gtk.activate(gtk.root_items()[0].widget));

        item.set_callback(None).unwrap();
        tray.flush().unwrap();
        assert_eq!(gtk.signal_handlers(gtk.root_items()[0].widget), 0);
    }

    #[test]
    fn clicks_run_callbacks_off_the_ui_thread() {
        let dir = tempfile::tempdir().unwrap();
        let gtk = HeadlessGtk::new();
        let tray = tray(&gtk, Flavor::StatusIcon, &dir);

        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        let entry = tray
            .menu()
            .add_checkbox("Sync", false, move |entry| {
                let thread = std::thread::current().name().map(str::to_owned);
                tx.lock().unwrap().send((entry.is_checked(), thread)).unwrap();
            })
            .unwrap();
        tray.flush().unwrap();

        let widget = gtk.root_items()[0].widget;
        assert!(gtk.activate(widget));
        let (checked, thread) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(checked);
        assert!(thread.unwrap().starts_with("systray-callbacks"));
        assert!(entry.is_checked());
        assert!(gtk.root_items()[0].active);

        // Programmatic changes do not fire the callback.
        entry.set_checked(false).unwrap();
        tray.flush().unwrap();
        assert!(!gtk.root_items()[0].active);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn removal_destroys_item_and_image() {
        let dir = tempfile::tempdir().unwrap();
        let gtk = HeadlessGtk::new();
        let tray = tray(&gtk, Flavor::StatusIcon, &dir);

        let entry = Entry::item("Logo").with_image(red());
        tray.menu().add(&entry).unwrap();
        tray.flush().unwrap();
        let snapshot = gtk.root_items()[0].clone();
        let image = snapshot.image_widget.unwrap();

        tray.menu().remove(&entry).unwrap();
        tray.flush().unwrap();
        assert!(gtk.is_destroyed(snapshot.widget));
        assert!(gtk.is_destroyed(image));
        assert!(gtk.root_items().is_empty());
        assert!(gtk.leaked().is_empty());
    }

    #[test]
    fn submenus_get_their_own_native_menu() {
        let dir = tempfile::tempdir().unwrap();
        let gtk = HeadlessGtk::new();
        let tray = tray(&gtk, Flavor::StatusIcon, &dir);

        let more = tray.menu().add_submenu("More").unwrap();
        let nested = more.menu().unwrap();
        nested.add_item("Deep", |_| {}).unwrap();
        nested.add(&Entry::item("Pic").with_image(red())).unwrap();
        tray.flush().unwrap();

        let submenu = gtk.root_items()[0].submenu.unwrap();
        let items = gtk.items(submenu);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "Deep");
        assert_eq!(file_name(&items[0].image), "spacer_16.png");
        // Spacers do not leak into the parent menu.
        assert_eq!(gtk.root_items()[0].image, None);

        tray.menu().remove(&more).unwrap();
        tray.flush().unwrap();
        assert!(gtk.is_destroyed(submenu));
        assert!(gtk.is_destroyed(items[1].widget));
    }

    #[test]
    fn indicator_drops_tooltips_and_item_icons() {
        let dir = tempfile::tempdir().unwrap();
        let gtk = HeadlessGtk::new();
        let tray = tray(&gtk, Flavor::AppIndicator, &dir);
        assert_eq!(tray.backend_name(), "app-indicator");

        let entry = Entry::item("A").with_image(red()).with_tooltip("tip");
        tray.menu().add(&entry).unwrap();
        tray.set_tooltip("ignored").unwrap();
        tray.flush().unwrap();

        let icon = gtk.tray_icon().unwrap();
        assert_eq!(icon.kind, WidgetKind::Indicator);
        assert_eq!(icon.tooltip, None);
        assert!(icon.visible);
        assert!(!gtk.click_tray_icon(), "indicators have no mouse popup");

        let items = gtk.root_items();
        assert_eq!(items[0].image, None);
        assert_eq!(items[0].tooltip, None);
        // The model keeps the value.
        assert_eq!(tray.tooltip(), "ignored");
    }

    #[test]
    fn status_icon_follows_tray_state() {
        let dir = tempfile::tempdir().unwrap();
        let gtk = HeadlessGtk::new();
        let tray = tray(&gtk, Flavor::StatusIcon, &dir);

        tray.set_image(Some(red())).unwrap();
        tray.set_tooltip("Syncing").unwrap();
        tray.flush().unwrap();
        let icon = gtk.tray_icon().unwrap();
        assert_eq!(icon.tooltip.as_deref(), Some("Syncing"));
        assert!(file_name(&icon.file).ends_with("_22.png"));
        assert!(gtk.click_tray_icon());

        tray.set_enabled(false).unwrap();
        tray.flush().unwrap();
        assert!(!gtk.tray_icon().unwrap().visible);
        assert!(!gtk.click_tray_icon());
    }

    #[test]
    fn missing_display_is_backend_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let gtk = HeadlessGtk::without_display("cannot open display");
        let attr = TrayAttributes::default().with_cache_dir(dir.path());
        let err = Tray::new(crate::status_icon(gtk), attr).unwrap_err();
        assert!(
            matches!(err, Error::BackendUnavailable { backend: "gtk-status-icon", .. }),
            "{err:?}"
        );
    }

    #[test]
    fn shutdown_releases_every_widget() {
        let dir = tempfile::tempdir().unwrap();
        let gtk = HeadlessGtk::new();
        let tray = tray(&gtk, Flavor::StatusIcon, &dir);

        let menu = tray.menu();
        menu.add(&Entry::item("A").with_image(red())).unwrap();
        menu.add_checkbox("B", true, |_| {}).unwrap();
        let sub = menu.add_submenu("C").unwrap();
        sub.menu().unwrap().add_item("D", |_| {}).unwrap();
        tray.flush().unwrap();
        assert!(gtk.live_widgets() > 0);

        tray.shutdown();
        assert_eq!(gtk.live_widgets(), 0);
        assert!(gtk.leaked().is_empty());
        assert!(gtk.criticals().is_empty());
    }
}
