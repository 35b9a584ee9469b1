/// Global hotkey bound to the record button
pub mod hotkey;
