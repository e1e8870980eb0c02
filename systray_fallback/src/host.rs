//! The host operating system's generic tray API, as a desktop toolkit exposes it.

use dpi::PhysicalPosition;
use image::RgbaImage;

/// Handle to a host tray icon.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IconHandle(pub u64);

/// Called by the host with the pointer position of a mouse press on the icon.
pub type MouseListener = Box<dyn Fn(PhysicalPosition<i32>) + Send + Sync>;

pub trait HostTray: Send {
    /// Whether the desktop exposes a notification area at all.
    fn is_supported(&self) -> bool;

    /// Creates an icon that is not yet shown.
    fn create_icon(&mut self, image: &RgbaImage) -> anyhow::Result<IconHandle>;

    /// Installs the icon in the notification area.
    fn add_icon(&mut self, icon: IconHandle) -> anyhow::Result<()>;

    /// Removes the icon from the notification area. It may be added again later.
    fn remove_icon(&mut self, icon: IconHandle);

    fn set_image(&mut self, icon: IconHandle, image: &RgbaImage);

    /// Drops any scaled copies the host cached of the icon's image.
    fn flush_image(&mut self, icon: IconHandle);

    fn set_tooltip(&mut self, icon: IconHandle, tooltip: Option<&str>);

    fn set_mouse_listener(&mut self, icon: IconHandle, listener: MouseListener);

    /// Releases the icon for good.
    fn dispose_icon(&mut self, icon: IconHandle);
}
