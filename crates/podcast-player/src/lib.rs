//! Podcast playback engine.
//!
//! [`controller::PlaybackController`] holds the user-facing player state and
//! drives any [`media::MediaHandle`]. [`native::NativeMedia`] is the audio
//! backend: Symphonia decode, Rubato rate conversion and a CPAL output stream.

pub mod config;
pub mod controller;
pub mod decode;
pub mod device;
pub mod http_stream;
pub mod media;
pub mod native;
pub mod output;
pub mod queue;
pub mod rate;
pub mod resample;
pub mod session;
pub mod state;

pub use config::PlaybackConfig;
pub use controller::PlaybackController;
pub use media::{MediaEvent, MediaHandle};
pub use native::NativeMedia;
pub use rate::PlaybackRate;
pub use state::PlaybackState;
