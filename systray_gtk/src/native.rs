//! The slice of GTK / GObject / AppIndicator the adapter consumes.
//!
//! Implementations wrap the real toolkit bindings; [`crate::headless::HeadlessGtk`] is an
//! in-process implementation. Every method is called on the UI thread only.

use std::fmt;
use std::path::Path;

/// Handle to a native GTK object (widget, menu, status icon or indicator).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Widget(u64);

impl Widget {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn into_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "widget#{}", self.0)
    }
}

/// Handler id returned by `g_signal_connect_object`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SignalId(pub u64);

/// Native `activate` handler. Invoked by the toolkit on the UI thread.
pub type ActivateHandler = Box<dyn Fn() + Send + Sync>;

pub trait Gtk: Send {
    /// `gtk_init_check`.
    fn init(&mut self) -> anyhow::Result<()>;

    fn menu_new(&mut self) -> Widget;

    /// Returns a *floating* reference; see [`Gtk::menu_shell_insert`].
    fn image_menu_item_new_with_mnemonic(&mut self, label: &str) -> Widget;

    /// Returns a *floating* reference.
    fn check_menu_item_new_with_mnemonic(&mut self, label: &str) -> Widget;

    /// Returns a *floating* reference.
    fn separator_menu_item_new(&mut self) -> Widget;

    fn menu_item_set_submenu(&mut self, item: Widget, submenu: Widget);

    /// Inserts `item` into `menu`. The menu sinks the item's floating reference.
    fn menu_shell_insert(&mut self, menu: Widget, item: Widget, position: usize);

    fn menu_item_set_label(&mut self, item: Widget, label: &str);

    fn widget_set_sensitive(&mut self, widget: Widget, sensitive: bool);

    fn widget_set_tooltip_text(&mut self, widget: Widget, text: Option<&str>);

    /// GTK emits `activate` from here; callers block their handler around it.
    fn check_menu_item_set_active(&mut self, item: Widget, active: bool);

    fn signal_connect_activate(&mut self, widget: Widget, handler: ActivateHandler) -> SignalId;

    fn signal_handler_block(&mut self, widget: Widget, id: SignalId);

    fn signal_handler_unblock(&mut self, widget: Widget, id: SignalId);

    fn signal_handler_disconnect(&mut self, widget: Widget, id: SignalId);

    fn image_new_from_file(&mut self, path: &Path) -> anyhow::Result<Widget>;

    fn image_menu_item_set_image(&mut self, item: Widget, image: Option<Widget>);

    /// Must be re-asserted after every `image_menu_item_set_image`.
    fn image_menu_item_set_always_show_image(&mut self, item: Widget, always: bool);

    fn widget_show_all(&mut self, widget: Widget);

    fn widget_destroy(&mut self, widget: Widget);

    fn object_unref(&mut self, object: Widget);

    fn status_icon_new(&mut self) -> anyhow::Result<Widget>;

    fn status_icon_set_from_file(&mut self, icon: Widget, path: Option<&Path>);

    fn status_icon_set_tooltip_text(&mut self, icon: Widget, text: &str);

    fn status_icon_set_visible(&mut self, icon: Widget, visible: bool);

    /// Pops `menu` up at the pointer when the icon is clicked.
    fn status_icon_attach_menu(&mut self, icon: Widget, menu: Widget);

    fn app_indicator_new(&mut self, id: &str, icon: Option<&Path>) -> anyhow::Result<Widget>;

    fn app_indicator_set_icon(&mut self, indicator: Widget, icon: Option<&Path>);

    /// `APP_INDICATOR_STATUS_ACTIVE` when `true`, `PASSIVE` otherwise.
    fn app_indicator_set_status(&mut self, indicator: Widget, active: bool);

    fn app_indicator_set_menu(&mut self, indicator: Widget, menu: Widget);
}
