pub mod format;
pub mod playback;
pub mod wav;

pub use format::AudioFormat;
