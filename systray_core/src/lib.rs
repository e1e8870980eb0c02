//! Backend-neutral system tray model.
//!
//! A [`Tray`] owns a root [`Menu`] of [`Entry`] values that any thread may mutate. Each
//! mutation is queued onto the tray's single UI thread (see [`Dispatcher`]), where a
//! [`Backend`] applies it to native peers.

pub mod attributes;
pub mod backend;
pub mod dispatch;
pub mod error;
pub mod ids;
pub mod image;
pub mod menu;
mod tray;

pub use attributes::{IconSizes, TrayAttributes};
pub use backend::{ActivationSink, Backend, BackendFactory, PeerRequest, Property, Services};
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use ids::{EntryId, MenuId, PeerHandle, TrayId};
pub use image::{ImageCache, ImageError, ImageSource};
pub use menu::{mnemonic_label, Callback, Entry, EntryKind, Menu, WeakEntry};
pub use tray::{Tray, TrayState};
