//! Ratatui episode browser and player.
//!
//! Keys:
//! - Up/Down, PgUp/PgDn: move selection
//! - Tab: switch between episodes and chapters
//! - Enter: open the selected episode, or seek to the selected chapter and play
//! - Space: play/pause
//! - Left/Right: skip back / forward
//! - r: cycle playback speed
//! - +/-: volume, m: mute
//! - /: search, s: sort
//! - x or Esc: close the player
//! - l: logs, h or ?: help
//! - q: quit
//!
//! The progress and volume bars accept mouse clicks and drags.

mod app;
mod render;

pub(crate) use app::run_tui;
