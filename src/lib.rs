//! Octave-band spectrum visualizer: band generation, spectrum sampling,
//! parameter persistence, shape rendering and the session that ties them
//! together. The `circle` binary drives a session offline into ffmpeg.

pub mod audio;
pub mod bands;
pub mod cli;
pub mod config;
pub mod encode;
pub mod interaction;
pub mod params;
pub mod presets;
pub mod render;
pub mod session;
