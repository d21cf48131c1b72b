pub mod embedded;
pub mod loader;
pub mod manifest;
