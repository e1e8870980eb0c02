use systray_core::{BackendFactory, Error, Result, Tray, TrayAttributes};
use tracing::{debug, warn};

/// A backend a [`TrayManager`] may build a tray on.
pub struct BackendChoice {
    factory: BackendFactory,
}

impl std::fmt::Debug for BackendChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BackendChoice")
            .field(&self.factory.name())
            .finish()
    }
}

impl BackendChoice {
    /// `GtkStatusIcon` driven through `gtk`.
    #[cfg(feature = "gtk")]
    pub fn status_icon<G: systray_gtk::Gtk + 'static>(gtk: G) -> Self {
        Self::custom(systray_gtk::status_icon(gtk))
    }

    /// libappindicator driven through `gtk`.
    #[cfg(feature = "gtk")]
    pub fn app_indicator<G: systray_gtk::Gtk + 'static>(gtk: G) -> Self {
        Self::custom(systray_gtk::app_indicator(gtk))
    }

    /// The host's generic tray API with an in-process popup.
    #[cfg(feature = "fallback")]
    pub fn fallback<H: systray_fallback::HostTray + 'static>(
        host: H,
        popup: systray_fallback::Popup,
    ) -> Self {
        Self::custom(systray_fallback::factory(host, popup))
    }

    pub fn custom(factory: BackendFactory) -> Self {
        BackendChoice { factory }
    }

    pub fn name(&self) -> &'static str {
        self.factory.name()
    }
}

/// Builds trays, optionally falling back through a list of backends.
#[derive(Debug, Default)]
pub struct TrayManager {
    _private: (),
}

impl TrayManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_tray(&self, choice: BackendChoice, attr: TrayAttributes) -> Result<Tray> {
        debug!(backend = choice.name(), "Creating tray");
        Tray::new(choice.factory, attr)
    }

    /// Tries each backend in order and returns the first tray that comes up.
    ///
    /// Only [`Error::BackendUnavailable`] moves on to the next choice; when every choice is
    /// unavailable the last such error is returned.
    pub fn create_first_available(
        &self,
        choices: impl IntoIterator<Item = BackendChoice>,
        attr: TrayAttributes,
    ) -> Result<Tray> {
        let mut last = None;
        for choice in choices {
            let name = choice.name();
            match self.create_tray(choice, attr.clone()) {
                Ok(tray) => return Ok(tray),
                Err(err @ Error::BackendUnavailable { .. }) => {
                    warn!(backend = name, "{err}, trying the next backend");
                    last = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last.unwrap_or_else(|| Error::BackendUnavailable {
            backend: "none",
            reason: "no backend to try".to_owned(),
        }))
    }
}
