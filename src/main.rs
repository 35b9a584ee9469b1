//! Menubar app: press the hotkey or the tray button to record, press again to
//! upload and show the sentiment.

use anyhow::{bail, Result};
use global_hotkey::GlobalHotKeyEvent;
use sentiment_recorder::app::Screen;
use sentiment_recorder::audio::CpalCapture;
use sentiment_recorder::config::Config;
use sentiment_recorder::input::hotkey::HotkeyManager;
use sentiment_recorder::permissions;
use sentiment_recorder::recorder::RecorderController;
use sentiment_recorder::sentiment::{ReqwestTransport, SentimentClient};
use sentiment_recorder::telemetry;
use sentiment_recorder::tray::{TrayCommand, TrayManager};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    telemetry::init(&config.telemetry)?;
    tracing::info!("sentiment-recorder starting");

    let permission = permissions::check_microphone_permission();
    if !permission.is_granted() {
        tracing::error!("microphone permission denied, exiting");
        bail!("please grant microphone access to record audio");
    }

    let recordings_dir = Config::expand_path(&config.recording.directory)?;
    let controller =
        RecorderController::new(CpalCapture::new(&config.audio), recordings_dir, permission);
    let transport = ReqwestTransport::new(config.api.timeout_secs.map(Duration::from_secs));
    let client = SentimentClient::new(transport, &config.api);
    let mut screen = Screen::new(controller, client, config.level_interval());

    let hotkey_manager = HotkeyManager::new(&config.hotkey)?;
    let mut tray = TrayManager::new(&screen.view())?;

    tracing::info!(
        "ready: press {:?} + {} or use the menubar to record",
        config.hotkey.modifiers,
        config.hotkey.key
    );

    let receiver = GlobalHotKeyEvent::receiver();
    loop {
        if let Ok(event) = receiver.try_recv() {
            if hotkey_manager.is_press(&event) {
                screen.press();
            }
        }

        if TrayManager::poll_events() == Some(TrayCommand::ToggleRecording) {
            screen.press();
        }

        if let Err(e) = tray.render(&screen.view()) {
            tracing::error!("failed to update tray: {:#}", e);
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
            Some(event) = screen.next_event() => {
                screen.apply(event);
            }
            () = tokio::time::sleep(Duration::from_millis(10)) => {
                // Poll interval (10ms to avoid busy-waiting)
            }
        }
    }

    screen.teardown();
    Ok(())
}
