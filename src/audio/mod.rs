pub mod analyzer;
pub mod decode;
#[cfg(feature = "mic")]
pub mod mic;
pub mod sampler;
pub mod source;
