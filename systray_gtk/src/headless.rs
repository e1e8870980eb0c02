//! An in-process [`Gtk`] toolkit that keeps its widget tree in memory.
//!
//! It follows the GTK rules the adapter depends on: new menu items start out floating,
//! `gtk_check_menu_item_set_active` emits `activate`, setting an image clears
//! `always-show-image`, and insensitive widgets ignore clicks. Calls GTK would reject with a
//! type assertion are ignored and recorded in [`HeadlessGtk::criticals`]. Handles are cheap clones of
//! one shared toolkit, so a test can inspect what a backend did on its UI thread.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, bail};
use tracing::{trace, warn};

use crate::native::{ActivateHandler, Gtk, SignalId, Widget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Menu,
    ImageMenuItem,
    CheckMenuItem,
    SeparatorMenuItem,
    Image,
    StatusIcon,
    Indicator,
}

impl WidgetKind {
    fn is_menu_item(self) -> bool {
        matches!(
            self,
            WidgetKind::ImageMenuItem | WidgetKind::CheckMenuItem | WidgetKind::SeparatorMenuItem
        )
    }
}

/// A menu item as currently shown.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSnapshot {
    pub widget: Widget,
    pub kind: WidgetKind,
    pub label: String,
    pub sensitive: bool,
    pub active: bool,
    pub tooltip: Option<String>,
    pub image_widget: Option<Widget>,
    /// File the attached image was loaded from.
    pub image: Option<PathBuf>,
    pub always_show_image: bool,
    pub submenu: Option<Widget>,
}

/// The notification-area object (status icon or indicator).
#[derive(Debug, Clone, PartialEq)]
pub struct IconSnapshot {
    pub widget: Widget,
    pub kind: WidgetKind,
    pub file: Option<PathBuf>,
    pub tooltip: Option<String>,
    pub visible: bool,
    pub menu: Option<Widget>,
}

struct Handler {
    id: SignalId,
    blocked: bool,
    callback: Arc<dyn Fn() + Send + Sync>,
}

struct Node {
    kind: WidgetKind,
    label: String,
    sensitive: bool,
    tooltip: Option<String>,
    active: bool,
    image: Option<Widget>,
    always_show_image: bool,
    file: Option<PathBuf>,
    children: Vec<Widget>,
    submenu: Option<Widget>,
    parent: Option<Widget>,
    floating: bool,
    destroyed: bool,
    visible: bool,
    handlers: Vec<Handler>,
}

impl Node {
    fn new(kind: WidgetKind, floating: bool) -> Self {
        Node {
            kind,
            label: String::new(),
            sensitive: true,
            tooltip: None,
            active: false,
            image: None,
            always_show_image: false,
            file: None,
            children: Vec::new(),
            submenu: None,
            parent: None,
            floating,
            destroyed: false,
            visible: false,
            handlers: Vec::new(),
        }
    }
}

#[derive(Default)]
struct State {
    next_widget: u64,
    next_signal: u64,
    init_error: Option<String>,
    initialized: bool,
    nodes: BTreeMap<Widget, Node>,
    leaked: Vec<Widget>,
    criticals: Vec<String>,
    popups: usize,
}

impl State {
    fn create(&mut self, kind: WidgetKind, floating: bool) -> Widget {
        self.next_widget += 1;
        let widget = Widget::from_raw(self.next_widget);
        self.nodes.insert(widget, Node::new(kind, floating));
        widget
    }

    fn node(&mut self, widget: Widget) -> Option<&mut Node> {
        match self.nodes.get_mut(&widget) {
            Some(node) if !node.destroyed => Some(node),
            _ => {
                trace!(?widget, "Call on a destroyed or unknown widget ignored");
                None
            }
        }
    }

    /// `node`, but only if `widget` is an image menu item, as `GTK_IS_IMAGE_MENU_ITEM` demands.
    fn image_menu_item(&mut self, widget: Widget, func: &str) -> Option<&mut Node> {
        let kind = self.node(widget)?.kind;
        if kind != WidgetKind::ImageMenuItem {
            let critical = format!(
                "{func}: assertion 'GTK_IS_IMAGE_MENU_ITEM (image_menu_item)' failed on {widget:?} ({kind:?})"
            );
            warn!("{critical}");
            self.criticals.push(critical);
            return None;
        }
        self.node(widget)
    }

    fn destroy(&mut self, widget: Widget) {
        let Some(node) = self.nodes.get_mut(&widget) else {
            return;
        };
        if node.destroyed {
            return;
        }
        node.destroyed = true;
        if node.floating {
            self.leaked.push(widget);
        }
        let parent = node.parent.take();
        let mut owned = std::mem::take(&mut node.children);
        owned.extend(node.submenu.take());
        owned.extend(node.image.take());

        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| *c != widget);
            if parent.image == Some(widget) {
                parent.image = None;
            }
            if parent.submenu == Some(widget) {
                parent.submenu = None;
            }
        }
        for child in owned {
            if let Some(node) = self.nodes.get_mut(&child) {
                // Owned by the container being destroyed.
                node.floating = false;
                node.parent = None;
            }
            self.destroy(child);
        }
    }

    fn unblocked_handlers(&self, widget: Widget) -> Vec<Arc<dyn Fn() + Send + Sync>> {
        self.nodes
            .get(&widget)
            .map(|node| {
                node.handlers
                    .iter()
                    .filter(|h| !h.blocked)
                    .map(|h| h.callback.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn snapshot_item(&self, widget: Widget) -> Option<ItemSnapshot> {
        let node = self.nodes.get(&widget)?;
        let image = node.image.and_then(|img| self.nodes.get(&img));
        Some(ItemSnapshot {
            widget,
            kind: node.kind,
            label: node.label.clone(),
            sensitive: node.sensitive,
            active: node.active,
            tooltip: node.tooltip.clone(),
            image_widget: node.image,
            image: image.and_then(|img| img.file.clone()),
            always_show_image: node.always_show_image,
            submenu: node.submenu,
        })
    }
}

/// Shared in-memory toolkit. Every clone sees the same widgets.
#[derive(Clone, Default)]
pub struct HeadlessGtk {
    state: Arc<Mutex<State>>,
}

impl std::fmt::Debug for HeadlessGtk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("HeadlessGtk")
            .field("widgets", &state.nodes.len())
            .field("initialized", &state.initialized)
            .finish()
    }
}

impl HeadlessGtk {
    pub fn new() -> Self {
        Self::default()
    }

    /// A toolkit whose `gtk_init_check` fails, as on a machine without a display.
    pub fn without_display(reason: impl Into<String>) -> Self {
        let gtk = Self::default();
        gtk.lock().init_error = Some(reason.into());
        gtk
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The most recently created notification-area object that is still alive.
    pub fn tray_icon(&self) -> Option<IconSnapshot> {
        let state = self.lock();
        state
            .nodes
            .iter()
            .rev()
            .find(|(_, n)| {
                !n.destroyed && matches!(n.kind, WidgetKind::StatusIcon | WidgetKind::Indicator)
            })
            .map(|(widget, n)| IconSnapshot {
                widget: *widget,
                kind: n.kind,
                file: n.file.clone(),
                tooltip: n.tooltip.clone(),
                visible: n.visible,
                menu: n.submenu,
            })
    }

    /// The children of `menu`, in display order.
    pub fn items(&self, menu: Widget) -> Vec<ItemSnapshot> {
        let state = self.lock();
        let Some(node) = state.nodes.get(&menu) else {
            return Vec::new();
        };
        node.children
            .iter()
            .filter_map(|child| state.snapshot_item(*child))
            .collect()
    }

    /// The children of the menu attached to the tray icon.
    pub fn root_items(&self) -> Vec<ItemSnapshot> {
        match self.tray_icon().and_then(|icon| icon.menu) {
            Some(menu) => self.items(menu),
            None => Vec::new(),
        }
    }

    /// Finds a live menu item by its rendered label, searching nested menus too.
    pub fn find_item(&self, label: &str) -> Option<ItemSnapshot> {
        let state = self.lock();
        state
            .nodes
            .iter()
            .filter(|(_, n)| !n.destroyed && n.kind.is_menu_item() && n.parent.is_some())
            .find(|(_, n)| n.label == label)
            .and_then(|(widget, _)| state.snapshot_item(*widget))
    }

    /// Simulates a click. Returns whether the item reacted.
    ///
    /// Handlers run on the calling thread.
    pub fn activate(&self, item: Widget) -> bool {
        let handlers = {
            let mut state = self.lock();
            let Some(node) = state.node(item) else {
                return false;
            };
            if !node.sensitive
                || !matches!(node.kind, WidgetKind::ImageMenuItem | WidgetKind::CheckMenuItem)
            {
                return false;
            }
            if node.kind == WidgetKind::CheckMenuItem {
                node.active = !node.active;
            }
            state.unblocked_handlers(item)
        };
        for handler in handlers {
            handler();
        }
        true
    }

    /// Simulates a click on the notification-area icon. Only status icons pop a menu up.
    pub fn click_tray_icon(&self) -> bool {
        let Some(icon) = self.tray_icon() else {
            return false;
        };
        if icon.kind != WidgetKind::StatusIcon || !icon.visible || icon.menu.is_none() {
            return false;
        }
        self.lock().popups += 1;
        true
    }

    pub fn popup_count(&self) -> usize {
        self.lock().popups
    }

    pub fn is_destroyed(&self, widget: Widget) -> bool {
        self.lock()
            .nodes
            .get(&widget)
            .is_some_and(|n| n.destroyed)
    }

    pub fn is_floating(&self, widget: Widget) -> bool {
        self.lock()
            .nodes
            .get(&widget)
            .is_some_and(|n| n.floating)
    }

    /// Widgets that are not destroyed yet.
    pub fn live_widgets(&self) -> usize {
        self.lock().nodes.values().filter(|n| !n.destroyed).count()
    }

    /// Widgets destroyed while still holding a floating reference.
    pub fn leaked(&self) -> Vec<Widget> {
        self.lock().leaked.clone()
    }

    /// Calls GTK would have refused with a critical warning.
    pub fn criticals(&self) -> Vec<String> {
        self.lock().criticals.clone()
    }

    pub fn signal_handlers(&self, widget: Widget) -> usize {
        self.lock()
            .nodes
            .get(&widget)
            .map_or(0, |n| n.handlers.len())
    }
}

impl Gtk for HeadlessGtk {
    fn init(&mut self) -> anyhow::Result<()> {
        let mut state = self.lock();
        if let Some(reason) = &state.init_error {
            bail!("gtk_init_check failed: {reason}");
        }
        state.initialized = true;
        Ok(())
    }

    fn menu_new(&mut self) -> Widget {
        self.lock().create(WidgetKind::Menu, false)
    }

    fn image_menu_item_new_with_mnemonic(&mut self, label: &str) -> Widget {
        let mut state = self.lock();
        let widget = state.create(WidgetKind::ImageMenuItem, true);
        if let Some(node) = state.node(widget) {
            node.label = label.to_owned();
        }
        widget
    }

    fn check_menu_item_new_with_mnemonic(&mut self, label: &str) -> Widget {
        let mut state = self.lock();
        let widget = state.create(WidgetKind::CheckMenuItem, true);
        if let Some(node) = state.node(widget) {
            node.label = label.to_owned();
        }
        widget
    }

    fn separator_menu_item_new(&mut self) -> Widget {
        self.lock().create(WidgetKind::SeparatorMenuItem, true)
    }

    fn menu_item_set_submenu(&mut self, item: Widget, submenu: Widget) {
        let mut state = self.lock();
        if let Some(node) = state.node(submenu) {
            node.parent = Some(item);
        }
        if let Some(node) = state.node(item) {
            node.submenu = Some(submenu);
        }
    }

    fn menu_shell_insert(&mut self, menu: Widget, item: Widget, position: usize) {
        let mut state = self.lock();
        if let Some(node) = state.node(item) {
            node.floating = false;
            node.parent = Some(menu);
        }
        if let Some(node) = state.node(menu) {
            let position = position.min(node.children.len());
            node.children.insert(position, item);
        }
    }

    fn menu_item_set_label(&mut self, item: Widget, label: &str) {
        if let Some(node) = self.lock().node(item) {
            node.label = label.to_owned();
        }
    }

    fn widget_set_sensitive(&mut self, widget: Widget, sensitive: bool) {
        if let Some(node) = self.lock().node(widget) {
            node.sensitive = sensitive;
        }
    }

    fn widget_set_tooltip_text(&mut self, widget: Widget, text: Option<&str>) {
        if let Some(node) = self.lock().node(widget) {
            node.tooltip = text.map(str::to_owned);
        }
    }

    fn check_menu_item_set_active(&mut self, item: Widget, active: bool) {
        let handlers = {
            let mut state = self.lock();
            let Some(node) = state.node(item) else {
                return;
            };
            if node.active == active {
                return;
            }
            node.active = active;
            state.unblocked_handlers(item)
        };
        for handler in handlers {
            handler();
        }
    }

    fn signal_connect_activate(&mut self, widget: Widget, handler: ActivateHandler) -> SignalId {
        let mut state = self.lock();
        state.next_signal += 1;
        let id = SignalId(state.next_signal);
        if let Some(node) = state.node(widget) {
            node.handlers.push(Handler {
                id,
                blocked: false,
                callback: Arc::from(handler),
            });
        }
        id
    }

    fn signal_handler_block(&mut self, widget: Widget, id: SignalId) {
        if let Some(node) = self.lock().node(widget) {
            node.handlers
                .iter_mut()
                .filter(|h| h.id == id)
                .for_each(|h| h.blocked = true);
        }
    }

    fn signal_handler_unblock(&mut self, widget: Widget, id: SignalId) {
        if let Some(node) = self.lock().node(widget) {
            node.handlers
                .iter_mut()
                .filter(|h| h.id == id)
                .for_each(|h| h.blocked = false);
        }
    }

    fn signal_handler_disconnect(&mut self, widget: Widget, id: SignalId) {
        if let Some(node) = self.lock().node(widget) {
            node.handlers.retain(|h| h.id != id);
        }
    }

    fn image_new_from_file(&mut self, path: &Path) -> anyhow::Result<Widget> {
        if !path.is_file() {
            return Err(anyhow!("no image file at {}", path.display()));
        }
        let mut state = self.lock();
        let widget = state.create(WidgetKind::Image, true);
        if let Some(node) = state.node(widget) {
            node.file = Some(path.to_owned());
        }
        Ok(widget)
    }

    fn image_menu_item_set_image(&mut self, item: Widget, image: Option<Widget>) {
        let mut state = self.lock();
        let previous = match state.image_menu_item(item, "gtk_image_menu_item_set_image") {
            Some(node) => {
                // Themes reset this whenever the image changes.
                node.always_show_image = false;
                std::mem::replace(&mut node.image, image)
            }
            None => return,
        };
        if let Some(previous) = previous.filter(|p| Some(*p) != image) {
            // The item held the only reference.
            if let Some(node) = state.nodes.get_mut(&previous) {
                node.parent = None;
            }
            state.destroy(previous);
        }
        if let Some(node) = image.and_then(|img| state.node(img)) {
            node.floating = false;
            node.parent = Some(item);
        }
    }

    fn image_menu_item_set_always_show_image(&mut self, item: Widget, always: bool) {
        let mut state = self.lock();
        if let Some(node) =
            state.image_menu_item(item, "gtk_image_menu_item_set_always_show_image")
        {
            node.always_show_image = always;
        }
    }

    fn widget_show_all(&mut self, widget: Widget) {
        let mut state = self.lock();
        let mut pending = vec![widget];
        while let Some(current) = pending.pop() {
            if let Some(node) = state.node(current) {
                node.visible = true;
                pending.extend(node.children.iter().copied());
                pending.extend(node.submenu);
                pending.extend(node.image);
            }
        }
    }

    fn widget_destroy(&mut self, widget: Widget) {
        self.lock().destroy(widget);
    }

    fn object_unref(&mut self, object: Widget) {
        // The last reference of a toplevel object.
        self.lock().destroy(object);
    }

    fn status_icon_new(&mut self) -> anyhow::Result<Widget> {
        let mut state = self.lock();
        if !state.initialized {
            bail!("GtkStatusIcon created before gtk_init");
        }
        Ok(state.create(WidgetKind::StatusIcon, false))
    }

    fn status_icon_set_from_file(&mut self, icon: Widget, path: Option<&Path>) {
        if let Some(node) = self.lock().node(icon) {
            node.file = path.map(Path::to_owned);
        }
    }

    fn status_icon_set_tooltip_text(&mut self, icon: Widget, text: &str) {
        if let Some(node) = self.lock().node(icon) {
            node.tooltip = Some(text.to_owned());
        }
    }

    fn status_icon_set_visible(&mut self, icon: Widget, visible: bool) {
        if let Some(node) = self.lock().node(icon) {
            node.visible = visible;
        }
    }

    fn status_icon_attach_menu(&mut self, icon: Widget, menu: Widget) {
        if let Some(node) = self.lock().node(icon) {
            node.submenu = Some(menu);
        }
    }

    fn app_indicator_new(&mut self, id: &str, icon: Option<&Path>) -> anyhow::Result<Widget> {
        let mut state = self.lock();
        if !state.initialized {
            bail!("AppIndicator {id} created before gtk_init");
        }
        let widget = state.create(WidgetKind::Indicator, false);
        if let Some(node) = state.node(widget) {
            node.label = id.to_owned();
            node.file = icon.map(Path::to_owned);
        }
        Ok(widget)
    }

    fn app_indicator_set_icon(&mut self, indicator: Widget, icon: Option<&Path>) {
        if let Some(node) = self.lock().node(indicator) {
            node.file = icon.map(Path::to_owned);
        }
    }

    fn app_indicator_set_status(&mut self, indicator: Widget, active: bool) {
        if let Some(node) = self.lock().node(indicator) {
            node.visible = active;
        }
    }

    fn app_indicator_set_menu(&mut self, indicator: Widget, menu: Widget) {
        if let Some(node) = self.lock().node(indicator) {
            node.submenu = Some(menu);
        }
    }
}
