pub mod color_scale;
pub mod color_table;
pub mod colors;
pub mod geometry;
pub mod image;
pub mod image_cache;
pub mod range_cache;
pub mod render_timer;
pub mod renderer;
#[cfg(feature = "web")]
pub mod web_surface;
