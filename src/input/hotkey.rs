use anyhow::{anyhow, Context, Result};
use global_hotkey::{
    hotkey::{Code, HotKey, Modifiers},
    GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState,
};
use std::str::FromStr;
use tracing::info;

use crate::config::HotkeyConfig;

/// Global hotkey acting as the record button
pub struct HotkeyManager {
    manager: GlobalHotKeyManager,
    hotkey: HotKey,
}

impl HotkeyManager {
    /// Create and register global hotkey from config
    ///
    /// # Errors
    /// Returns error if the combination is invalid or already taken
    pub fn new(config: &HotkeyConfig) -> Result<Self> {
        let manager = GlobalHotKeyManager::new().context("failed to create hotkey manager")?;
        let hotkey = hotkey_from_config(config)?;

        manager
            .register(hotkey)
            .context("failed to register hotkey")?;

        info!("registered hotkey: {:?} + {}", config.modifiers, config.key);

        Ok(Self { manager, hotkey })
    }

    /// True when `event` is a press of our hotkey; releases are ignored
    pub fn is_press(&self, event: &GlobalHotKeyEvent) -> bool {
        event.id == self.hotkey.id() && matches!(event.state, HotKeyState::Pressed)
    }
}

impl Drop for HotkeyManager {
    fn drop(&mut self) {
        if let Err(e) = self.manager.unregister(self.hotkey) {
            tracing::error!("failed to unregister hotkey: {}", e);
        }
    }
}

/// Build the hotkey described by the config
///
/// # Errors
/// Returns error for unknown modifiers or keys
pub fn hotkey_from_config(config: &HotkeyConfig) -> Result<HotKey> {
    let modifiers = parse_modifiers(&config.modifiers)?;
    let code = parse_key(&config.key)?;
    Ok(HotKey::new(Some(modifiers), code))
}

fn parse_modifiers(modifiers: &[String]) -> Result<Modifiers> {
    let mut result = Modifiers::empty();
    for modifier in modifiers {
        match modifier.as_str() {
            "Control" | "Ctrl" => result |= Modifiers::CONTROL,
            "Option" | "Alt" => result |= Modifiers::ALT,
            "Command" | "Super" => result |= Modifiers::SUPER,
            "Shift" => result |= Modifiers::SHIFT,
            _ => return Err(anyhow!("unknown modifier: {}", modifier)),
        }
    }
    Ok(result)
}

/// Accepts a single letter or digit, or "Space"
fn parse_key(key: &str) -> Result<Code> {
    let mut chars = key.chars();
    let valid = key == "Space"
        || matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_alphanumeric());
    if !valid {
        return Err(anyhow!("unsupported key: {}", key));
    }

    HotKey::from_str(key)
        .map(|hotkey| hotkey.key)
        .map_err(|e| anyhow!("unsupported key {}: {}", key, e))
}
