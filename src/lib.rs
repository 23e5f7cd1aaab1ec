pub mod codec;
pub mod compositor;
pub mod config;
pub mod errors;
pub mod history;
pub mod loader;
pub mod locator;
pub mod overlay;
pub mod pad;
pub mod placement;
pub mod stroke;
pub mod text;
pub mod text_atlas;
pub mod upload;
