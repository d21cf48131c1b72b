pub mod canvas;
pub mod shape;
pub mod text;
