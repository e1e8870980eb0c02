use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $counter:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        static $counter: AtomicU64 = AtomicU64::new(1);

        impl $name {
            pub(crate) fn next() -> Self {
                Self($counter.fetch_add(1, Ordering::Relaxed))
            }

            /// Convert the id into the underlying integer.
            ///
            /// This is useful if you need to pass the id across an FFI boundary, or store it in an atomic.
            pub const fn into_raw(self) -> u64 {
                self.0
            }

            /// Construct an id from the underlying integer.
            ///
            /// This should only be called with integers returned from `into_raw`.
            pub const fn from_raw(id: u64) -> Self {
                Self(id)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(fmtr)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(fmtr)
            }
        }
    };
}

id_type!(
    /// Identifier of a tray. Unique for each tray created in this process.
    TrayId,
    TRAY_COUNTER
);

id_type!(
    /// Identifier of a logical menu (the root menu of a tray or the nested menu of a submenu).
    MenuId,
    MENU_COUNTER
);

id_type!(
    /// Identifier of a logical menu entry.
    ///
    /// Stable for the whole lifetime of the entry and independent of any native peer.
    EntryId,
    ENTRY_COUNTER
);

/// Handle of a native peer, handed out by a backend when it binds a peer to an entry.
///
/// Only meaningful to the backend that produced it.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerHandle(u64);

impl PeerHandle {
    /// Raw value `0` is reserved to mean "no peer" in atomic storage.
    pub const fn from_raw(raw: u64) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    pub const fn into_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmtr, "peer#{}", self.0)
    }
}
