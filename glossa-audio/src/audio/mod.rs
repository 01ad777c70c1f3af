//! Platform audio stack: decode, resample, device output
//!
//! The engine performs no DSP of its own; decoding is delegated to
//! symphonia, rate conversion to rubato, and output to cpal.

pub mod decode;
pub mod output;
pub mod resample;

pub use decode::{decode_clip, DecodedClip};
pub use output::DeviceOutput;
pub use resample::Resampler;
