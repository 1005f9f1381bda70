pub mod canvas;
pub mod settings;
