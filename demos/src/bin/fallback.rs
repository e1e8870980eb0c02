//! Builds a tray on the first backend that comes up and drives its popup headlessly.
//!
//! Both GTK choices are handed a toolkit without a display, so the fallback adapter wins.
//! Run with `RUST_LOG=debug` to follow the UI thread.

use std::error::Error;
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use dpi::PhysicalPosition;
use image::{Rgba, RgbaImage};
use systray::fallback::headless::HeadlessHost;
use systray::fallback::{Popup, RowSnapshot};
use systray::gtk::headless::HeadlessGtk;
use systray::{BackendChoice, Entry, ImageSource, TrayAttributes, TrayManager};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuAction {
    Open,
    DarkMode,
    OptionA,
    OptionB,
    Exit,
}

fn load_icon(path: Option<&Path>) -> Result<ImageSource, Box<dyn Error>> {
    match path {
        Some(path) => Ok(image::open(path)?.into_rgba8().into()),
        None => Ok(RgbaImage::from_fn(32, 32, |x, y| {
            if (x + y) % 8 < 4 {
                Rgba([40, 120, 220, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
        .into()),
    }
}

fn print_rows(rows: &[RowSnapshot], depth: usize) {
    for row in rows {
        info!(
            "{:indent$}{:?} {:?} enabled={} checked={}",
            "",
            row.kind,
            row.text,
            row.enabled,
            row.checked,
            indent = depth * 2
        );
        print_rows(&row.children, depth + 1);
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let icon_path = std::env::args().nth(1);
    let icon = load_icon(icon_path.as_deref().map(Path::new))?;

    let host = HeadlessHost::new();
    let popup = Popup::new();
    let tray = TrayManager::new().create_first_available(
        [
            BackendChoice::app_indicator(HeadlessGtk::without_display("no indicator service")),
            BackendChoice::status_icon(HeadlessGtk::without_display("cannot open display")),
            BackendChoice::fallback(host.clone(), popup.clone()),
        ],
        TrayAttributes::default()
            .with_tooltip("Demo tray")
            .with_icon(Some(icon.clone())),
    )?;
    info!(backend = tray.backend_name(), "Tray is up");

    let (tx, rx) = mpsc::channel();
    let action = |action: MenuAction| {
        let tx = std::sync::Mutex::new(tx.clone());
        move |entry: &Entry| {
            let _ = tx
                .lock()
                .map(|tx| tx.send((action, entry.text(), entry.is_checked())));
        }
    };

    let menu = tray.menu();
    let open = Entry::item("Open")
        .with_shortcut('o')
        .with_image(icon)
        .with_callback(action(MenuAction::Open));
    menu.add(&open)?;
    menu.add_checkbox("Dark Mode", false, action(MenuAction::DarkMode))?;
    let options = menu.add_submenu("Options")?;
    if let Some(nested) = options.menu() {
        nested.add_item("Option A", action(MenuAction::OptionA))?;
        nested.add_item("Option B", action(MenuAction::OptionB))?;
    }
    menu.add_status("Idle")?;
    menu.add_separator()?;
    menu.add_item("Exit", action(MenuAction::Exit))?;
    tray.flush()?;

    host.press(PhysicalPosition::new(1180, 12));
    info!(at = ?popup.shown_at(), "Popup shown");
    print_rows(&popup.rows(), 0);

    for text in ["Dark Mode", "Option B", "Exit"] {
        if let Some(row) = popup.find(text) {
            popup.click(row.id);
        }
        let (action, text, checked) = rx.recv_timeout(Duration::from_secs(5))?;
        info!(?action, text, checked, "Activated");
        if action == MenuAction::Exit {
            break;
        }
    }

    tray.set_enabled(false)?;
    tray.set_tooltip("Paused")?;
    tray.set_enabled(true)?;
    tray.flush()?;
    info!(icon = ?host.icon(), "Icon after toggling");

    tray.shutdown();
    Ok(())
}
