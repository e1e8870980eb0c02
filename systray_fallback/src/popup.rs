//! The in-process popup menu shown when the host icon is pressed.
//!
//! The backend edits rows on the UI thread; the host's event thread shows the popup and
//! delivers clicks. Both go through a shared [`Popup`] handle.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow};
use dpi::PhysicalPosition;
use systray_core::{EntryKind, MenuId};
use tracing::trace;

/// Identifies one row of the popup.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId(u64);

/// Invoked on the clicking thread after a row reacted.
pub type ClickHandler = Arc<dyn Fn() + Send + Sync>;

/// A row as currently shown.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSnapshot {
    pub id: RowId,
    pub kind: EntryKind,
    pub text: String,
    pub mnemonic: Option<char>,
    pub icon: Option<PathBuf>,
    pub enabled: bool,
    pub checked: bool,
    pub tooltip: Option<String>,
    pub clickable: bool,
    /// Rows of the nested popup of a submenu row.
    pub children: Vec<RowSnapshot>,
}

struct Row {
    kind: EntryKind,
    text: String,
    mnemonic: Option<char>,
    icon: Option<PathBuf>,
    enabled: bool,
    checked: bool,
    tooltip: Option<String>,
    on_click: Option<ClickHandler>,
    menu: MenuId,
    nested: Option<MenuId>,
}

#[derive(Default)]
struct State {
    next_row: u64,
    root: Option<MenuId>,
    menus: HashMap<MenuId, Vec<RowId>>,
    rows: HashMap<RowId, Row>,
    title_image: Option<PathBuf>,
    shown_at: Option<PhysicalPosition<i32>>,
}

impl State {
    fn row(&mut self, id: RowId) -> Result<&mut Row> {
        self.rows
            .get_mut(&id)
            .ok_or_else(|| anyhow!("popup has no row {id:?}"))
    }

    fn snapshot(&self, id: RowId) -> Option<RowSnapshot> {
        let row = self.rows.get(&id)?;
        let children = row
            .nested
            .and_then(|menu| self.menus.get(&menu))
            .map(|rows| rows.iter().filter_map(|r| self.snapshot(*r)).collect())
            .unwrap_or_default();
        Some(RowSnapshot {
            id,
            kind: row.kind,
            text: row.text.clone(),
            mnemonic: row.mnemonic,
            icon: row.icon.clone(),
            enabled: row.enabled,
            checked: row.checked,
            tooltip: row.tooltip.clone(),
            clickable: row.on_click.is_some(),
            children,
        })
    }

    fn remove(&mut self, id: RowId) {
        let Some(row) = self.rows.remove(&id) else {
            return;
        };
        if let Some(rows) = self.menus.get_mut(&row.menu) {
            rows.retain(|r| *r != id);
        }
        if let Some(nested) = row.nested.and_then(|menu| self.menus.remove(&menu)) {
            for child in nested {
                self.remove(child);
            }
        }
    }
}

/// Shared handle to the popup model.
#[derive(Clone, Default)]
pub struct Popup {
    state: Arc<Mutex<State>>,
}

impl std::fmt::Debug for Popup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Popup")
            .field("rows", &state.rows.len())
            .field("shown_at", &state.shown_at)
            .finish()
    }
}

impl Popup {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Discards all rows and starts over with an empty root.
    pub(crate) fn reset(&self, root: MenuId) {
        let mut state = self.lock();
        state.rows.clear();
        state.menus.clear();
        state.menus.insert(root, Vec::new());
        state.root = Some(root);
        state.shown_at = None;
    }

    pub(crate) fn clear(&self) {
        let mut state = self.lock();
        state.rows.clear();
        state.menus.clear();
        state.root = None;
        state.title_image = None;
        state.shown_at = None;
    }

    /// Adds an empty row to `menu` at `index`; a submenu row also gets the nested popup
    /// `nested`.
    pub(crate) fn insert(
        &self,
        menu: MenuId,
        index: usize,
        kind: EntryKind,
        nested: Option<MenuId>,
    ) -> Result<RowId> {
        let mut state = self.lock();
        if !state.menus.contains_key(&menu) {
            return Err(anyhow!("popup has no menu {menu}"));
        }
        state.next_row += 1;
        let id = RowId(state.next_row);
        state.rows.insert(
            id,
            Row {
                kind,
                text: String::new(),
                mnemonic: None,
                icon: None,
                enabled: false,
                checked: false,
                tooltip: None,
                on_click: None,
                menu,
                nested,
            },
        );
        if let Some(nested) = nested {
            state.menus.insert(nested, Vec::new());
        }
        if let Some(rows) = state.menus.get_mut(&menu) {
            let index = index.min(rows.len());
            rows.insert(index, id);
        }
        Ok(id)
    }

    pub(crate) fn remove(&self, id: RowId) {
        self.lock().remove(id);
    }

    pub(crate) fn set_text(&self, id: RowId, text: &str, mnemonic: Option<char>) -> Result<()> {
        let mut state = self.lock();
        let row = state.row(id)?;
        row.text = text.to_owned();
        row.mnemonic = mnemonic;
        Ok(())
    }

    pub(crate) fn set_icon(&self, id: RowId, icon: Option<PathBuf>) -> Result<()> {
        self.lock().row(id)?.icon = icon;
        Ok(())
    }

    pub(crate) fn set_enabled(&self, id: RowId, enabled: bool) -> Result<()> {
        self.lock().row(id)?.enabled = enabled;
        Ok(())
    }

    pub(crate) fn set_checked(&self, id: RowId, checked: bool) -> Result<()> {
        self.lock().row(id)?.checked = checked;
        Ok(())
    }

    pub(crate) fn set_tooltip(&self, id: RowId, tooltip: Option<String>) -> Result<()> {
        self.lock().row(id)?.tooltip = tooltip;
        Ok(())
    }

    pub(crate) fn set_on_click(&self, id: RowId, on_click: Option<ClickHandler>) -> Result<()> {
        self.lock().row(id)?.on_click = on_click;
        Ok(())
    }

    pub(crate) fn set_title_image(&self, image: Option<PathBuf>) {
        self.lock().title_image = image;
    }

    /// Image shown in the popup's title bar. Follows the tray image.
    pub fn title_image(&self) -> Option<PathBuf> {
        self.lock().title_image.clone()
    }

    pub fn show_at(&self, position: PhysicalPosition<i32>) {
        trace!(?position, "Showing popup");
        self.lock().shown_at = Some(position);
    }

    pub fn hide(&self) {
        self.lock().shown_at = None;
    }

    /// Where the popup is shown, if it is.
    pub fn shown_at(&self) -> Option<PhysicalPosition<i32>> {
        self.lock().shown_at
    }

    /// Rows of the top-level popup, nested popups inlined as children.
    pub fn rows(&self) -> Vec<RowSnapshot> {
        let state = self.lock();
        let Some(root) = state.root.and_then(|root| state.menus.get(&root)) else {
            return Vec::new();
        };
        root.iter().filter_map(|id| state.snapshot(*id)).collect()
    }

    /// Finds a row anywhere in the popup by its text.
    pub fn find(&self, text: &str) -> Option<RowSnapshot> {
        fn search(rows: Vec<RowSnapshot>, text: &str) -> Option<RowSnapshot> {
            rows.into_iter().find_map(|row| {
                if row.text == text {
                    Some(row)
                } else {
                    search(row.children, text)
                }
            })
        }
        search(self.rows(), text)
    }

    /// Simulates a click on a row. Returns whether the row reacted.
    ///
    /// Disabled rows, separators, status lines and submenu headers ignore clicks. A clicked
    /// checkbox flips its mark and the popup closes before the handler runs.
    pub fn click(&self, id: RowId) -> bool {
        let handler = {
            let mut state = self.lock();
            let Some(row) = state.rows.get_mut(&id) else {
                return false;
            };
            if !row.enabled || !matches!(row.kind, EntryKind::Item | EntryKind::Checkbox) {
                return false;
            }
            let Some(handler) = row.on_click.clone() else {
                return false;
            };
            if row.kind == EntryKind::Checkbox {
                row.checked = !row.checked;
            }
            state.shown_at = None;
            handler
        };
        handler();
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn ids() -> (MenuId, MenuId) {
        (MenuId::from_raw(1_000_001), MenuId::from_raw(1_000_002))
    }

    #[test]
    fn rows_nest_under_submenus() {
        let (root, nested) = ids();
        let popup = Popup::new();
        popup.reset(root);

        let a = popup.insert(root, 0, EntryKind::Item, None).unwrap();
        let sub = popup.insert(root, 0, EntryKind::Submenu, Some(nested)).unwrap();
        let deep = popup.insert(nested, 0, EntryKind::Item, None).unwrap();
        popup.set_text(a, "A", None).unwrap();
        popup.set_text(sub, "More", Some('m')).unwrap();
        popup.set_text(deep, "Deep", None).unwrap();

        let rows = popup.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text, "More");
        assert_eq!(rows[0].children[0].text, "Deep");
        assert_eq!(popup.find("Deep").unwrap().id, deep);

        popup.remove(sub);
        assert!(popup.find("Deep").is_none());
        assert_eq!(popup.rows().len(), 1);
    }

    #[test]
    fn only_enabled_clickable_rows_react() {
        let (root, _) = ids();
        let popup = Popup::new();
        popup.reset(root);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        let row = popup.insert(root, 0, EntryKind::Checkbox, None).unwrap();
        assert!(!popup.click(row));

        popup
            .set_on_click(row, Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })))
            .unwrap();
        assert!(!popup.click(row), "still disabled");

        popup.set_enabled(row, true).unwrap();
        popup.show_at(PhysicalPosition::new(10, 20));
        assert!(popup.click(row));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(popup.rows()[0].checked);
        assert_eq!(popup.shown_at(), None);
    }

    #[test]
    fn inserting_into_an_unknown_menu_fails() {
        let (root, nested) = ids();
        let popup = Popup::new();
        popup.reset(root);
        assert!(popup.insert(nested, 0, EntryKind::Item, None).is_err());
    }
}
