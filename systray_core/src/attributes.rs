use std::path::PathBuf;

use crate::image::ImageSource;

/// Pixel sizes images are normalized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconSizes {
    /// Size of the icon in the notification area.
    pub tray: u32,
    /// Size of per-entry icons and of the transparent spacer.
    pub entry: u32,
}

impl Default for IconSizes {
    fn default() -> Self {
        IconSizes { tray: 22, entry: 16 }
    }
}

/// Configuration of a tray at construction time.
#[derive(Debug, Clone)]
pub struct TrayAttributes {
    pub tooltip: String,
    pub icon: Option<ImageSource>,
    pub sizes: IconSizes,
    /// Overrides the per-user image cache directory.
    pub cache_dir: Option<PathBuf>,
    /// Whether the icon starts out in the notification area.
    pub enabled: bool,
}

impl Default for TrayAttributes {
    fn default() -> Self {
        TrayAttributes {
            tooltip: String::new(),
            icon: None,
            sizes: IconSizes::default(),
            cache_dir: None,
            enabled: true,
        }
    }
}

impl TrayAttributes {
    /// Set the tooltip for the tray icon.
    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = tooltip.into();
        self
    }

    /// Set the icon for the tray.
    pub fn with_icon(mut self, icon: Option<ImageSource>) -> Self {
        self.icon = icon;
        self
    }

    pub fn with_sizes(mut self, sizes: IconSizes) -> Self {
        self.sizes = sizes;
        self
    }

    /// Store normalized images under `dir` instead of the per-user cache.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}
