//! Drives the GTK status-icon adapter on the in-memory toolkit and prints the native menu.

use std::error::Error;

use image::{Rgba, RgbaImage};
use systray::gtk::Widget;
use systray::gtk::headless::HeadlessGtk;
use systray::{BackendChoice, Entry, TrayAttributes, TrayManager};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn dump(gtk: &HeadlessGtk, menu: Widget, depth: usize) {
    for item in gtk.items(menu) {
        let image = item
            .image
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned());
        info!(
            "{:indent$}{:?} {:?} sensitive={} image={:?}",
            "",
            item.kind,
            item.label,
            item.sensitive,
            image,
            indent = depth * 2
        );
        if let Some(submenu) = item.submenu {
            dump(gtk, submenu, depth + 1);
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let gtk = HeadlessGtk::new();
    let tray = TrayManager::new().create_tray(
        BackendChoice::status_icon(gtk.clone()),
        TrayAttributes::default().with_tooltip("GTK demo"),
    )?;

    let logo = RgbaImage::from_pixel(24, 24, Rgba([220, 80, 0, 255]));
    let menu = tray.menu();
    let open = Entry::item("Open Project")
        .with_shortcut('p')
        .with_image(logo)
        .with_callback(|_| {});
    menu.add(&open)?;
    menu.add_item("Save", |_| {})?;
    menu.add_separator()?;
    menu.add_status("Nothing to sync")?;
    let recent = menu.add_submenu("Recent")?;
    if let Some(nested) = recent.menu() {
        nested.add_item("notes.txt", |_| {})?;
    }
    menu.add_item("Quit", |_| {})?;
    tray.flush()?;

    let Some(root) = gtk.tray_icon().and_then(|icon| icon.menu) else {
        return Err("status icon has no menu".into());
    };
    info!("With an icon on \"Open Project\":");
    dump(&gtk, root, 1);

    menu.remove(&open)?;
    tray.flush()?;
    info!("After removing it, spacers are gone:");
    dump(&gtk, root, 1);

    tray.shutdown();
    info!(live = gtk.live_widgets(), leaked = gtk.leaked().len(), "Toolkit after shutdown");
    Ok(())
}
