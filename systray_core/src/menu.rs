//! The backend-agnostic menu tree.
//!
//! Entries and menus are shared handles that any thread may mutate. Every setter writes the
//! entry's property slot immediately and then enqueues a UI job that pushes the *current*
//! value to the native peer, so queued jobs for the same property may observe a newer value
//! than the one their setter wrote.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{trace, warn};

use crate::backend::{Backend, PeerRequest, Property};
use crate::error::{Error, Result};
use crate::ids::{EntryId, MenuId, PeerHandle};
use crate::image::ImageSource;
use crate::tray::Shared;

/// Activation callback. Runs on the tray's callback thread, never on the UI thread.
pub type Callback = Arc<dyn Fn(&Entry) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// A clickable leaf.
    Item,
    /// A clickable leaf with a checked state.
    Checkbox,
    /// A visual separator line.
    Separator,
    /// A non-interactive labeled line.
    Status,
    /// An entry whose activation opens a nested menu.
    Submenu,
}

struct Props {
    text: String,
    image: Option<ImageSource>,
    shortcut: Option<char>,
    enabled: bool,
    checked: bool,
    tooltip: Option<String>,
    callback: Option<Callback>,
}

struct EntryInner {
    id: EntryId,
    kind: EntryKind,
    props: Mutex<Props>,
    parent: Mutex<Weak<MenuInner>>,
    removed: AtomicBool,
    // Written and read only on the UI thread; 0 means no peer.
    peer: AtomicU64,
    submenu: Option<Menu>,
}

/// A logical menu entry.
#[derive(Clone)]
pub struct Entry {
    inner: Arc<EntryInner>,
}

/// Non-owning reference to an entry, held by native activate handlers.
#[derive(Clone, Debug)]
pub struct WeakEntry(Weak<EntryInner>);

impl WeakEntry {
    pub fn upgrade(&self) -> Option<Entry> {
        self.0.upgrade().map(|inner| Entry { inner })
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let props = self.props();
        f.debug_struct("Entry")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("text", &props.text)
            .field("enabled", &props.enabled)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Entry {}

impl Entry {
    fn new(kind: EntryKind, text: String, checked: bool) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<EntryInner>| EntryInner {
            id: EntryId::next(),
            kind,
            props: Mutex::new(Props {
                text,
                image: None,
                shortcut: None,
                enabled: true,
                checked,
                tooltip: None,
                callback: None,
            }),
            parent: Mutex::new(Weak::new()),
            removed: AtomicBool::new(false),
            peer: AtomicU64::new(0),
            submenu: (kind == EntryKind::Submenu)
                .then(|| Menu::new(MenuOwner::Entry(weak.clone()))),
        });
        Entry { inner }
    }

    pub fn item(text: impl Into<String>) -> Self {
        Self::new(EntryKind::Item, text.into(), false)
    }

    pub fn checkbox(text: impl Into<String>, checked: bool) -> Self {
        Self::new(EntryKind::Checkbox, text.into(), checked)
    }

    pub fn separator() -> Self {
        Self::new(EntryKind::Separator, String::new(), false)
    }

    pub fn status(text: impl Into<String>) -> Self {
        Self::new(EntryKind::Status, text.into(), false)
    }

    /// An entry owning an (initially empty) nested menu, see [`Entry::menu`].
    pub fn submenu(text: impl Into<String>) -> Self {
        Self::new(EntryKind::Submenu, text.into(), false)
    }

    pub fn with_callback<F>(self, callback: F) -> Self
    where
        F: Fn(&Entry) + Send + Sync + 'static,
    {
        self.props().callback = Some(Arc::new(callback));
        self
    }

    pub fn with_image(self, image: impl Into<ImageSource>) -> Self {
        self.props().image = Some(image.into());
        self
    }

    pub fn with_shortcut(self, key: char) -> Self {
        self.props().shortcut = Some(lowercase(key));
        self
    }

    pub fn with_tooltip(self, tooltip: impl Into<String>) -> Self {
        self.props().tooltip = Some(tooltip.into());
        self
    }

    pub fn with_enabled(self, enabled: bool) -> Self {
        self.props().enabled = enabled;
        self
    }

    pub fn id(&self) -> EntryId {
        self.inner.id
    }

    pub fn kind(&self) -> EntryKind {
        self.inner.kind
    }

    /// The nested menu of a [`EntryKind::Submenu`] entry.
    pub fn menu(&self) -> Option<&Menu> {
        self.inner.submenu.as_ref()
    }

    pub fn downgrade(&self) -> WeakEntry {
        WeakEntry(Arc::downgrade(&self.inner))
    }

    pub fn text(&self) -> String {
        self.props().text.clone()
    }

    pub fn image(&self) -> Option<ImageSource> {
        self.props().image.clone()
    }

    pub fn has_image(&self) -> bool {
        self.props().image.is_some()
    }

    /// The mnemonic key, always lower-cased.
    pub fn shortcut(&self) -> Option<char> {
        self.props().shortcut
    }

    /// The label as a toolkit should render it, with the mnemonic marked.
    pub fn rendered_text(&self) -> String {
        let props = self.props();
        mnemonic_label(&props.text, props.shortcut)
    }

    pub fn is_enabled(&self) -> bool {
        self.props().enabled
    }

    pub fn is_checked(&self) -> bool {
        self.props().checked
    }

    pub fn tooltip(&self) -> Option<String> {
        self.props().tooltip.clone()
    }

    pub fn callback(&self) -> Option<Callback> {
        self.props().callback.clone()
    }

    pub fn has_callback(&self) -> bool {
        self.props().callback.is_some()
    }

    /// Whether the native peer should accept input.
    ///
    /// Items and checkboxes need a callback, submenus only need to be enabled, status lines
    /// and separators never do.
    pub fn is_sensitive(&self) -> bool {
        let props = self.props();
        match self.inner.kind {
            EntryKind::Item | EntryKind::Checkbox => props.enabled && props.callback.is_some(),
            EntryKind::Submenu => props.enabled,
            EntryKind::Separator | EntryKind::Status => false,
        }
    }

    /// The menu this entry currently belongs to.
    pub fn parent(&self) -> Option<Menu> {
        self.inner.parent_menu().map(|inner| Menu { inner })
    }

    pub fn is_attached(&self) -> bool {
        self.parent().is_some()
    }

    pub fn set_text(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.update(Property::Text, |props| props.text = text)
    }

    /// `None` drops the image; in GTK menus this may put a spacer in its place.
    pub fn set_image(&self, image: Option<ImageSource>) -> Result<()> {
        self.update(Property::Image, |props| props.image = image)
    }

    /// Sets the mnemonic. Stored lower-cased; matching is case-insensitive.
    pub fn set_shortcut(&self, key: Option<char>) -> Result<()> {
        self.update(Property::Shortcut, |props| props.shortcut = key.map(lowercase))
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.update(Property::Enabled, |props| props.enabled = enabled)
    }

    pub fn set_checked(&self, checked: bool) -> Result<()> {
        self.update(Property::Checked, |props| props.checked = checked)
    }

    pub fn set_tooltip(&self, tooltip: Option<String>) -> Result<()> {
        self.update(Property::Tooltip, |props| props.tooltip = tooltip)
    }

    /// `None` makes the peer insensitive and suppresses activation.
    pub fn set_callback(&self, callback: Option<Callback>) -> Result<()> {
        self.update(Property::Callback, |props| props.callback = callback)
    }

    /// Runs the activation logic. Called on the callback thread by [`crate::ActivationSink`].
    ///
    /// A checkbox flips its checked slot first; the native toolkit has already toggled the
    /// peer, so nothing is re-applied.
    pub fn activate(&self) {
        let callback = {
            let mut props = self.props();
            if self.inner.kind == EntryKind::Checkbox {
                props.checked = !props.checked;
            }
            props.callback.clone()
        };

        match callback {
            Some(callback) => callback(self),
            None => trace!(entry = %self.inner.id, "Activation without callback ignored"),
        }
    }

    /// The native peer currently bound to this entry. Only meaningful on the UI thread.
    pub fn peer(&self) -> Option<PeerHandle> {
        PeerHandle::from_raw(self.inner.peer.load(Ordering::Acquire))
    }

    fn set_peer(&self, peer: Option<PeerHandle>) {
        let raw = peer.map(PeerHandle::into_raw).unwrap_or(0);
        self.inner.peer.store(raw, Ordering::Release);
    }

    fn take_peer(&self) -> Option<PeerHandle> {
        PeerHandle::from_raw(self.inner.peer.swap(0, Ordering::AcqRel))
    }

    fn props(&self) -> MutexGuard<'_, Props> {
        self.inner.props.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, property: Property, write: impl FnOnce(&mut Props)) -> Result<()> {
        write(&mut self.props());

        let Some(shared) = self.inner.context() else {
            trace!(entry = %self.inner.id, ?property, "Entry is detached, property stored only");
            return Ok(());
        };

        let entry = self.clone();
        shared.run(move |backend| apply_property(backend, &entry, property))
    }
}

impl EntryInner {
    fn parent_menu(&self) -> Option<Arc<MenuInner>> {
        self.parent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
    }

    fn context(&self) -> Option<Arc<Shared>> {
        self.parent_menu()?.context()
    }
}

fn lowercase(key: char) -> char {
    key.to_lowercase().next().unwrap_or(key)
}

/// Inserts an underscore before the first case-insensitive occurrence of `key` in `text`.
///
/// Text without a match, or no key at all, is returned unchanged.
pub fn mnemonic_label(text: &str, key: Option<char>) -> String {
    let Some(key) = key else {
        return text.to_string();
    };
    let key = lowercase(key);

    match text
        .char_indices()
        .find(|(_, ch)| ch.to_lowercase().eq(key.to_lowercase()))
    {
        Some((i, _)) => format!("{}_{}", &text[..i], &text[i..]),
        None => text.to_string(),
    }
}

enum MenuOwner {
    Tray(Weak<Shared>),
    Entry(Weak<EntryInner>),
}

struct MenuInner {
    id: MenuId,
    owner: MenuOwner,
    children: Mutex<Vec<Entry>>,
}

impl MenuInner {
    /// The live tray this menu is reachable from, if any.
    fn context(&self) -> Option<Arc<Shared>> {
        match &self.owner {
            MenuOwner::Tray(shared) => shared.upgrade(),
            MenuOwner::Entry(entry) => {
                let entry = entry.upgrade()?;
                if entry.removed.load(Ordering::Acquire) {
                    return None;
                }
                entry.context()
            }
        }
    }

    fn children(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An ordered list of entries: the root menu of a tray or the nested menu of a submenu.
#[derive(Clone)]
pub struct Menu {
    inner: Arc<MenuInner>,
}

impl std::fmt::Debug for Menu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Menu")
            .field("id", &self.inner.id)
            .field("entries", &*self.inner.children())
            .finish()
    }
}

impl PartialEq for Menu {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Menu {}

impl Menu {
    fn new(owner: MenuOwner) -> Self {
        Menu {
            inner: Arc::new(MenuInner {
                id: MenuId::next(),
                owner,
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn root(id: MenuId, shared: Weak<Shared>) -> Self {
        Menu {
            inner: Arc::new(MenuInner {
                id,
                owner: MenuOwner::Tray(shared),
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> MenuId {
        self.inner.id
    }

    /// The submenu entry owning this menu, `None` for a tray's root menu.
    pub fn owner(&self) -> Option<Entry> {
        match &self.inner.owner {
            MenuOwner::Tray(_) => None,
            MenuOwner::Entry(entry) => entry.upgrade().map(|inner| Entry { inner }),
        }
    }

    /// Whether this menu is reachable from a tray that has not been dropped.
    pub fn is_live(&self) -> bool {
        self.inner.context().is_some()
    }

    /// Snapshot of the direct children, in order.
    pub fn entries(&self) -> Vec<Entry> {
        self.inner.children().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.children().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.children().is_empty()
    }

    pub fn contains(&self, entry: &Entry) -> bool {
        self.inner.children().iter().any(|e| e == entry)
    }

    /// Looks up an entry anywhere below this menu.
    pub fn get(&self, id: EntryId) -> Option<Entry> {
        self.find(|entry| entry.id() == id)
    }

    /// Depth-first search of this menu and every nested menu.
    pub fn find(&self, predicate: impl Fn(&Entry) -> bool) -> Option<Entry> {
        self.find_dyn(&predicate)
    }

    fn find_dyn(&self, predicate: &dyn Fn(&Entry) -> bool) -> Option<Entry> {
        for entry in self.entries() {
            if predicate(&entry) {
                return Some(entry);
            }
            if let Some(found) = entry.menu().and_then(|menu| menu.find_dyn(predicate)) {
                return Some(found);
            }
        }
        None
    }

    /// Appends `entry`. Fails with [`Error::AlreadyAttached`] if it already has a parent.
    pub fn add(&self, entry: &Entry) -> Result<()> {
        if entry.inner.removed.load(Ordering::Acquire) {
            return Err(Error::AlreadyAttached(entry.id()));
        }
        if self.is_within(entry) {
            return Err(Error::WouldCycle(entry.id()));
        }

        {
            let mut children = self.inner.children();
            let mut parent = entry
                .inner
                .parent
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if parent.upgrade().is_some() {
                return Err(Error::AlreadyAttached(entry.id()));
            }
            *parent = Arc::downgrade(&self.inner);
            children.push(entry.clone());
        }

        if let Some(shared) = self.inner.context() {
            let menu = self.clone();
            let queued = entry.clone();
            if let Err(err) = shared.run(move |backend| attach_peer(backend, &menu, &queued)) {
                self.unlink(entry);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Detaches `entry` and destroys its native peer (recursively for submenus).
    ///
    /// A removed entry cannot be added again.
    pub fn remove(&self, entry: &Entry) -> Result<()> {
        let shared = self.inner.context();
        let pos = {
            let mut children = self.inner.children();
            let Some(pos) = children.iter().position(|e| e == entry) else {
                return Err(Error::NotAttached(entry.id()));
            };
            children.remove(pos);
            *entry
                .inner
                .parent
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Weak::new();
            entry.inner.removed.store(true, Ordering::Release);
            pos
        };

        if let Some(shared) = shared {
            let queued = entry.clone();
            if let Err(err) = shared.run(move |backend| detach_peer(backend, &queued)) {
                self.relink(entry, pos);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Undoes the tree half of an `add` whose UI job was refused.
    fn unlink(&self, entry: &Entry) {
        let mut children = self.inner.children();
        if let Some(pos) = children.iter().position(|e| e == entry) {
            children.remove(pos);
        }
        let mut parent = entry
            .inner
            .parent
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if parent.as_ptr() == Arc::as_ptr(&self.inner) {
            *parent = Weak::new();
        }
    }

    /// Undoes the tree half of a `remove` whose UI job was refused.
    fn relink(&self, entry: &Entry, pos: usize) {
        let mut children = self.inner.children();
        *entry
            .inner
            .parent
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(&self.inner);
        entry.inner.removed.store(false, Ordering::Release);
        let pos = pos.min(children.len());
        children.insert(pos, entry.clone());
    }

    /// Removes every entry.
    pub fn clear(&self) -> Result<()> {
        for entry in self.entries() {
            match self.remove(&entry) {
                Ok(()) | Err(Error::NotAttached(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    pub fn add_item<F>(&self, text: impl Into<String>, callback: F) -> Result<Entry>
    where
        F: Fn(&Entry) + Send + Sync + 'static,
    {
        self.add_new(Entry::item(text).with_callback(callback))
    }

    pub fn add_checkbox<F>(&self, text: impl Into<String>, checked: bool, callback: F) -> Result<Entry>
    where
        F: Fn(&Entry) + Send + Sync + 'static,
    {
        self.add_new(Entry::checkbox(text, checked).with_callback(callback))
    }

    pub fn add_separator(&self) -> Result<Entry> {
        self.add_new(Entry::separator())
    }

    pub fn add_status(&self, text: impl Into<String>) -> Result<Entry> {
        self.add_new(Entry::status(text))
    }

    pub fn add_submenu(&self, text: impl Into<String>) -> Result<Entry> {
        self.add_new(Entry::submenu(text))
    }

    fn add_new(&self, entry: Entry) -> Result<Entry> {
        self.add(&entry)?;
        Ok(entry)
    }

    /// Whether this menu is `entry`'s nested menu or lies somewhere beneath it.
    fn is_within(&self, entry: &Entry) -> bool {
        let mut current = self.inner.clone();
        loop {
            let owner = match &current.owner {
                MenuOwner::Tray(_) => return false,
                MenuOwner::Entry(owner) => match owner.upgrade() {
                    Some(owner) => owner,
                    None => return false,
                },
            };
            if Arc::ptr_eq(&owner, &entry.inner) {
                return true;
            }
            match owner.parent_menu() {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Index among the preceding siblings that already have peers.
    fn peer_index(&self, entry: &Entry) -> usize {
        self.entries()
            .iter()
            .take_while(|e| *e != entry)
            .filter(|e| e.peer().is_some())
            .count()
    }

    pub(crate) fn clear_peers(&self) {
        for entry in self.entries() {
            entry.set_peer(None);
            if let Some(menu) = entry.menu() {
                menu.clear_peers();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// UI-thread jobs
// ---------------------------------------------------------------------------

/// Binds a peer to `entry` and, for submenus, to its whole subtree.
fn attach_peer(backend: &mut dyn Backend, menu: &Menu, entry: &Entry) {
    // The entry may have been removed between enqueueing and now.
    if entry.parent().as_ref() != Some(menu) {
        trace!(entry = %entry.id(), "Entry no longer in menu, skipping peer creation");
        return;
    }

    // Already bound by the recursive attach of an enclosing submenu.
    if entry.peer().is_some() {
        return;
    }

    let request = PeerRequest {
        entry,
        menu: menu.id(),
        index: menu.peer_index(entry),
    };
    match backend.create_peer(request) {
        Ok(peer) => entry.set_peer(Some(peer)),
        Err(err) => {
            warn!(entry = %entry.id(), "{}", Error::native("create_peer", &err));
            return;
        }
    }

    if let Some(nested) = entry.menu() {
        for child in nested.entries() {
            attach_peer(backend, nested, &child);
        }
    }
}

/// Destroys the peers of `entry`'s subtree, children first.
fn detach_peer(backend: &mut dyn Backend, entry: &Entry) {
    if let Some(nested) = entry.menu() {
        for child in nested.entries() {
            detach_peer(backend, &child);
        }
    }

    if let Some(peer) = entry.take_peer() {
        if let Err(err) = backend.destroy_peer(peer) {
            warn!(entry = %entry.id(), "{}", Error::native("destroy_peer", &err));
        }
    }
}

fn apply_property(backend: &mut dyn Backend, entry: &Entry, property: Property) {
    let Some(peer) = entry.peer() else {
        trace!(entry = %entry.id(), ?property, "No peer yet, value applied on creation");
        return;
    };
    if let Err(err) = backend.apply_property(peer, entry, property) {
        warn!(entry = %entry.id(), ?property, "{}", Error::native("apply_property", &err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonic_marks_first_case_insensitive_match() {
        assert_eq!(mnemonic_label("Open Project", Some('p')), "O_pen Project");
        assert_eq!(mnemonic_label("Open Project", Some('P')), "O_pen Project");
        assert_eq!(mnemonic_label("Quit", Some('q')), "_Quit");
        assert_eq!(mnemonic_label("Quit", Some('z')), "Quit");
        assert_eq!(mnemonic_label("Quit", None), "Quit");
        assert_eq!(mnemonic_label("", Some('a')), "");
    }

    #[test]
    fn mnemonic_handles_multibyte_text() {
        assert_eq!(mnemonic_label("Über Äpfel", Some('ä')), "Über _Äpfel");
    }

    #[test]
    fn mnemonic_matches_prefix_rule_for_every_position() {
        let label = "Settings and Preferences";
        for (i, ch) in label.char_indices() {
            let rendered = mnemonic_label(label, Some(ch));
            let first = label
                .char_indices()
                .find(|(_, c)| c.to_lowercase().eq(ch.to_lowercase()))
                .map(|(j, _)| j)
                .unwrap();
            assert!(first <= i);
            assert_eq!(rendered, format!("{}_{}", &label[..first], &label[first..]));
        }
    }

    #[test]
    fn shortcut_is_stored_lowercase() {
        let entry = Entry::item("Open").with_shortcut('O');
        assert_eq!(entry.shortcut(), Some('o'));
        entry.set_shortcut(Some('P')).unwrap();
        assert_eq!(entry.shortcut(), Some('p'));
        assert_eq!(entry.rendered_text(), "O_pen");
    }

    #[test]
    fn detached_setters_store_values() {
        let entry = Entry::item("a");
        entry.set_text("b").unwrap();
        entry.set_enabled(false).unwrap();
        assert_eq!(entry.text(), "b");
        assert!(!entry.is_enabled());
    }

    #[test]
    fn add_twice_fails() {
        let a = Entry::submenu("a");
        let b = Entry::submenu("b");
        let child = Entry::item("child");
        a.menu().unwrap().add(&child).unwrap();
        assert!(matches!(
            b.menu().unwrap().add(&child),
            Err(Error::AlreadyAttached(_))
        ));
        assert!(matches!(
            a.menu().unwrap().add(&child),
            Err(Error::AlreadyAttached(_))
        ));
        assert_eq!(a.menu().unwrap().len(), 1);
        assert!(b.menu().unwrap().is_empty());
    }

    #[test]
    fn removed_entry_cannot_be_readded() {
        let sub = Entry::submenu("s");
        let menu = sub.menu().unwrap();
        let child = Entry::item("x");
        menu.add(&child).unwrap();
        menu.remove(&child).unwrap();
        assert!(!child.is_attached());
        assert!(matches!(menu.add(&child), Err(Error::AlreadyAttached(_))));
        assert!(matches!(menu.remove(&child), Err(Error::NotAttached(_))));
    }

    #[test]
    fn submenu_cannot_contain_itself() {
        let outer = Entry::submenu("outer");
        let inner = Entry::submenu("inner");
        outer.menu().unwrap().add(&inner).unwrap();

        assert!(matches!(
            outer.menu().unwrap().add(&outer),
            Err(Error::WouldCycle(_))
        ));
        assert!(matches!(
            inner.menu().unwrap().add(&outer),
            Err(Error::WouldCycle(_))
        ));
    }

    #[test]
    fn find_searches_nested_menus() {
        let root = Entry::submenu("root");
        let menu = root.menu().unwrap();
        let sub = menu.add_submenu("More").unwrap();
        let deep = sub.menu().unwrap().add_status("deep").unwrap();

        assert_eq!(menu.get(deep.id()), Some(deep.clone()));
        assert_eq!(menu.find(|e| e.text() == "deep"), Some(deep));
        assert!(menu.find(|e| e.text() == "missing").is_none());
    }

    #[test]
    fn sensitivity_follows_callback_and_enabled() {
        let item = Entry::item("x");
        assert!(!item.is_sensitive());
        item.set_callback(Some(Arc::new(|_: &Entry| {}))).unwrap();
        assert!(item.is_sensitive());
        item.set_enabled(false).unwrap();
        assert!(!item.is_sensitive());
        assert!(Entry::submenu("s").is_sensitive());
        assert!(!Entry::status("s").is_sensitive());
    }

    #[test]
    fn activating_checkbox_toggles_before_callback() {
        let (tx, rx) = std::sync::mpsc::channel();
        let entry = Entry::checkbox("Dark mode", false).with_callback(move |e| {
            tx.send(e.is_checked()).unwrap();
        });
        entry.activate();
        entry.activate();
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![true, false]);
    }

    #[test]
    fn tree_is_well_formed_after_mixed_operations() {
        let root = Entry::submenu("root");
        let menu = root.menu().unwrap().clone();
        let mut all = Vec::new();
        for i in 0..12 {
            all.push(menu.add_item(format!("e{i}"), |_| {}).unwrap());
        }
        for entry in all.iter().step_by(3) {
            menu.remove(entry).unwrap();
        }

        for entry in &all {
            let occurrences = menu.entries().iter().filter(|e| *e == entry).count();
            match entry.parent() {
                Some(parent) => {
                    assert_eq!(parent, menu);
                    assert_eq!(occurrences, 1);
                }
                None => assert_eq!(occurrences, 0),
            }
        }
        assert_eq!(menu.len(), 8);
    }
}
