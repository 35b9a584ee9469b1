use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use tray_icon::menu::{Menu, MenuEvent, MenuItem, PredefinedMenuItem};
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

use crate::app::{AppState, ScreenView};

/// Menu id of the record button
const RECORD_ITEM_ID: &str = "record-toggle";
/// Icon edge in pixels
const ICON_SIZE: u32 = 32;

/// Actions coming from the menubar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayCommand {
    /// Record button clicked
    ToggleRecording,
}

struct TrayMenu {
    #[allow(dead_code)] // Kept alive; dropping removes the icon
    tray: TrayIcon,
    status_item: MenuItem,
    result_item: MenuItem,
}

/// Menubar rendering of the screen: status line, record button, result line
pub struct TrayManager {
    menu: TrayMenu,
    current: ScreenView,
    cached_icons: HashMap<AppState, Icon>,
}

impl TrayManager {
    /// Builds the tray for the initial view
    ///
    /// # Errors
    /// Returns error if the icon or menu cannot be created
    pub fn new(view: &ScreenView) -> Result<Self> {
        let mut cached_icons = HashMap::new();
        for state in [AppState::Idle, AppState::Recording, AppState::Processing] {
            cached_icons.insert(state, Self::load_icon(state)?);
        }

        let menu = Self::build_tray(view, &cached_icons)?;

        Ok(Self {
            menu,
            current: view.clone(),
            cached_icons,
        })
    }

    fn load_icon(state: AppState) -> Result<Icon> {
        let image = icon_image(state);
        let (width, height) = image.dimensions();
        Icon::from_rgba(image.into_raw(), width, height)
            .context("failed to create icon from RGBA data")
    }

    fn build_tray(view: &ScreenView, cached_icons: &HashMap<AppState, Icon>) -> Result<TrayMenu> {
        let icon = cached_icons
            .get(&view.state)
            .with_context(|| format!("icon for state {:?} not in cache", view.state))?
            .clone();

        let menu = Menu::new();

        let status_item = MenuItem::new(view.status_text(), false, None);
        menu.append(&status_item)
            .context("failed to append status item")?;
        menu.append(&PredefinedMenuItem::separator())
            .context("failed to append separator")?;

        let record_item =
            MenuItem::with_id(RECORD_ITEM_ID, view.button_label, view.button_enabled, None);
        menu.append(&record_item)
            .context("failed to append record item")?;

        let result_item = MenuItem::new(view.result_line(), false, None);
        menu.append(&result_item)
            .context("failed to append result item")?;

        menu.append(&PredefinedMenuItem::separator())
            .context("failed to append separator")?;
        menu.append(&PredefinedMenuItem::quit(None))
            .context("failed to append quit item")?;

        let tray = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip("Sentiment Recorder")
            .with_icon(icon)
            .build()
            .context("failed to build tray icon")?;

        Ok(TrayMenu {
            tray,
            status_item,
            result_item,
        })
    }

    /// Bring the tray in line with `view`
    ///
    /// # Errors
    /// Returns error if the tray has to be rebuilt and that fails
    pub fn render(&mut self, view: &ScreenView) -> Result<()> {
        if *view == self.current {
            return Ok(());
        }

        if view.state == self.current.state {
            self.menu.status_item.set_text(view.status_text());
            self.menu.result_item.set_text(view.result_line());
        } else {
            tracing::debug!(
                "tray state change: {:?} -> {:?}",
                self.current.state,
                view.state
            );
            // Rebuild entire tray with new state (macOS does not refresh set_icon reliably)
            self.menu = Self::build_tray(view, &self.cached_icons)?;
        }

        self.current = view.clone();
        Ok(())
    }

    /// Drain one pending menu event
    pub fn poll_events() -> Option<TrayCommand> {
        if let Ok(event) = MenuEvent::receiver().try_recv() {
            let id = event.id.0.as_str();
            tracing::debug!("tray menu event received: id={:?}", id);
            return Self::parse_menu_event(id);
        }

        None
    }

    fn parse_menu_event(id: &str) -> Option<TrayCommand> {
        match id {
            RECORD_ITEM_ID => Some(TrayCommand::ToggleRecording),
            // "Quit" never arrives here; the predefined item terminates the app natively
            _ => None,
        }
    }
}

/// Filled circle coloured by state
fn icon_image(state: AppState) -> RgbaImage {
    let color = match state {
        AppState::Idle => Rgba([120, 120, 120, 255]),
        AppState::Recording => Rgba([220, 40, 40, 255]),
        AppState::Processing => Rgba([230, 160, 20, 255]),
    };
    let center = f64::from(ICON_SIZE) / 2.0;
    let radius = center - 2.0;

    RgbaImage::from_fn(ICON_SIZE, ICON_SIZE, |x, y| {
        let dx = f64::from(x) + 0.5 - center;
        let dy = f64::from(y) + 0.5 - center;
        if dx.hypot(dy) <= radius {
            color
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_menu_event_record() {
        assert_eq!(
            TrayManager::parse_menu_event("record-toggle"),
            Some(TrayCommand::ToggleRecording)
        );
    }

    #[test]
    fn test_parse_menu_event_unknown() {
        assert_eq!(TrayManager::parse_menu_event("Open Config File"), None);
        assert_eq!(TrayManager::parse_menu_event(""), None);
    }

    #[test]
    fn test_icon_image_dimensions() {
        let image = icon_image(AppState::Idle);
        assert_eq!(image.dimensions(), (ICON_SIZE, ICON_SIZE));
    }

    #[test]
    fn test_icon_center_and_corner() {
        let image = icon_image(AppState::Recording);
        assert_eq!(*image.get_pixel(16, 16), Rgba([220, 40, 40, 255]));
        assert_eq!(image.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_icons_differ_per_state() {
        let idle = icon_image(AppState::Idle);
        let recording = icon_image(AppState::Recording);
        let processing = icon_image(AppState::Processing);
        assert_ne!(idle.get_pixel(16, 16), recording.get_pixel(16, 16));
        assert_ne!(recording.get_pixel(16, 16), processing.get_pixel(16, 16));
    }

    #[test]
    fn test_load_icon_all_states() {
        for state in [AppState::Idle, AppState::Recording, AppState::Processing] {
            assert!(TrayManager::load_icon(state).is_ok());
        }
    }

    #[test]
    #[ignore = "requires a windowing session on the main thread"]
    fn test_render_state_change_rebuilds() {
        let idle = ScreenView::new(AppState::Idle, String::new(), None);
        let mut tray = TrayManager::new(&idle).unwrap();
        let recording = ScreenView::new(AppState::Recording, String::new(), Some(0));
        tray.render(&recording).unwrap();
        assert_eq!(tray.current.state, AppState::Recording);
    }
}
