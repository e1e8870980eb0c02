use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use image::{Rgba, RgbaImage};
use systray::fallback::headless::HeadlessHost;
use systray::fallback::Popup;
use systray::gtk::headless::{HeadlessGtk, WidgetKind};
use systray::{
    BackendChoice, Entry, Error, ImageSource, Tray, TrayAttributes, TrayManager, TrayState,
};

fn attributes(dir: &tempfile::TempDir) -> TrayAttributes {
    TrayAttributes::default()
        .with_tooltip("Backup")
        .with_icon(Some(icon_a()))
        .with_cache_dir(dir.path())
}

fn icon_a() -> ImageSource {
    RgbaImage::from_pixel(48, 48, Rgba([200, 30, 30, 255])).into()
}

fn gtk_tray(gtk: &HeadlessGtk, dir: &tempfile::TempDir) -> Tray {
    TrayManager::new()
        .create_tray(BackendChoice::status_icon(gtk.clone()), attributes(dir))
        .unwrap()
}

#[test]
fn s1_single_item_activates_once() {
    let dir = tempfile::tempdir().unwrap();
    let gtk = HeadlessGtk::new();
    let tray = gtk_tray(&gtk, &dir);

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    tray.menu()
        .add_item("File", move |entry| tx.lock().unwrap().send(entry.text()).unwrap())
        .unwrap();
    tray.flush().unwrap();

    let items = gtk.root_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].label, "File");
    assert!(items[0].sensitive);

    assert!(gtk.activate(items[0].widget));
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "File");
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn s2_spacers_fill_in_for_missing_icons() {
    let dir = tempfile::tempdir().unwrap();
    let gtk = HeadlessGtk::new();
    let tray = gtk_tray(&gtk, &dir);
    let menu = tray.menu();

    menu.add(&Entry::item("Open").with_image(icon_a())).unwrap();
    menu.add_item("Save", |_| {}).unwrap();
    menu.add_separator().unwrap();
    menu.add_item("Quit", |_| {}).unwrap();
    tray.flush().unwrap();

    let items = gtk.root_items();
    let names: Vec<_> = items
        .iter()
        .map(|i| {
            i.image
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
        })
        .collect();

    let open = names[0].clone().unwrap();
    assert!(open.ends_with("_16.png") && !open.starts_with("spacer"));
    assert_eq!(names[1].as_deref(), Some("spacer_16.png"));
    assert_eq!(items[2].kind, WidgetKind::SeparatorMenuItem);
    assert_eq!(names[2], None);
    assert_eq!(names[3].as_deref(), Some("spacer_16.png"));
}

#[test]
fn s3_label_tracks_text_and_shortcut() {
    let dir = tempfile::tempdir().unwrap();
    let gtk = HeadlessGtk::new();
    let tray = gtk_tray(&gtk, &dir);

    let entry = tray.menu().add_item("Open Project", |_| {}).unwrap();
    entry.set_shortcut(Some('p')).unwrap();
    tray.flush().unwrap();
    assert_eq!(gtk.root_items()[0].label, "O_pen Project");

    entry.set_text("Reopen").unwrap();
    tray.flush().unwrap();
    assert_eq!(gtk.root_items()[0].label, "Reo_pen");

    entry.set_shortcut(None).unwrap();
    tray.flush().unwrap();
    assert_eq!(gtk.root_items()[0].label, "Reopen");
}

#[test]
fn s4_enabled_toggles_from_three_threads() {
    let dir = tempfile::tempdir().unwrap();
    let host = HeadlessHost::new();
    let tray = Arc::new(
        TrayManager::new()
            .create_tray(
                BackendChoice::fallback(host.clone(), Popup::new()),
                attributes(&dir),
            )
            .unwrap(),
    );

    for enabled in [false, true, false] {
        let tray = tray.clone();
        thread::spawn(move || tray.set_enabled(enabled).unwrap())
            .join()
            .unwrap();
    }
    tray.flush().unwrap();

    assert_eq!(tray.state(), TrayState::Hidden);
    assert_eq!(host.installed(), 0);
    assert_eq!(tray.tooltip(), "Backup");
    assert_eq!(host.icon().unwrap().tooltip.as_deref(), Some("Backup"));
}

#[test]
fn s5_removal_leaves_no_native_leaks() {
    let dir = tempfile::tempdir().unwrap();
    let gtk = HeadlessGtk::new();
    let tray = gtk_tray(&gtk, &dir);
    let menu = tray.menu();

    let logo = Entry::item("Logo").with_image(icon_a());
    menu.add(&logo).unwrap();
    menu.add(&Entry::item("Other").with_image(icon_a())).unwrap();
    menu.add_item("Plain", |_| {}).unwrap();
    tray.flush().unwrap();

    let removed = gtk.root_items()[0].clone();
    let image = removed.image_widget.unwrap();

    menu.remove(&logo).unwrap();
    tray.flush().unwrap();

    assert!(gtk.is_destroyed(removed.widget));
    assert!(gtk.is_destroyed(image));
    assert!(gtk.leaked().is_empty());

    let items = gtk.root_items();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.image.is_some()));
}

#[test]
fn s6_mutation_after_shutdown_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let gtk = HeadlessGtk::new();
    let tray = gtk_tray(&gtk, &dir);

    let entry = tray.menu().add_item("File", |_| {}).unwrap();
    tray.flush().unwrap();
    tray.shutdown();

    assert!(matches!(entry.set_text("x"), Err(Error::QueueClosed)));
    assert!(matches!(tray.set_tooltip("late"), Err(Error::QueueClosed)));
    assert!(matches!(tray.flush(), Err(Error::QueueClosed)));
    assert_eq!(tray.state(), TrayState::Terminated);
    assert_eq!(gtk.live_widgets(), 0);

    // Idempotent.
    tray.shutdown();
}

#[test]
fn manager_falls_back_to_the_next_backend() {
    let dir = tempfile::tempdir().unwrap();
    let host = HeadlessHost::new();
    let choices = [
        BackendChoice::app_indicator(HeadlessGtk::without_display("no DISPLAY")),
        BackendChoice::status_icon(HeadlessGtk::without_display("no DISPLAY")),
        BackendChoice::fallback(host.clone(), Popup::new()),
    ];

    let tray = TrayManager::new()
        .create_first_available(choices, attributes(&dir))
        .unwrap();
    assert_eq!(tray.backend_name(), "fallback");
    tray.flush().unwrap();
    assert_eq!(host.installed(), 1);
}

#[test]
fn manager_reports_the_last_unavailable_backend() {
    let dir = tempfile::tempdir().unwrap();
    let err = TrayManager::new()
        .create_first_available(
            [
                BackendChoice::status_icon(HeadlessGtk::without_display("no DISPLAY")),
                BackendChoice::fallback(HeadlessHost::unsupported(), Popup::new()),
            ],
            attributes(&dir),
        )
        .unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable { backend: "fallback", .. }));

    let err = TrayManager::new()
        .create_first_available(Vec::new(), attributes(&dir))
        .unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable { .. }));
}
