//! rc2d bridge: implements render_api::RenderBackend using rc2d-renderer.

mod plugin;
mod window_backend;

pub use plugin::Rc2dPlugin;
pub use window_backend::Rc2dWindowBackend;
