/// Record button state machine
pub mod screen;
/// Render-ready snapshot of the screen
pub mod view;

pub use screen::{AppState, Screen, ScreenEvent};
pub use view::ScreenView;
