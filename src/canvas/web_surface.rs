//! Browser canvas as a render surface.

use wasm_bindgen::Clamped;
use web_sys::{CanvasRenderingContext2d, ImageData};

use crate::canvas::image::{check_blit, Rect, RenderSurface, Rgba, RgbaImage};

/// Route `log` output to the browser console.
pub fn init_logging(level: log::Level) {
    if console_log::init_with_level(level).is_err() {
        log::debug!("logger already installed");
    }
}

fn canvas_rect(ctx: &CanvasRenderingContext2d) -> Rect {
    match ctx.canvas() {
        Some(canvas) => Rect::new(0, 0, canvas.width() as i32, canvas.height() as i32),
        None => Rect::new(0, 0, i32::MAX, i32::MAX),
    }
}

fn css_color(color: Rgba) -> String {
    format!(
        "rgba({}, {}, {}, {:.3})",
        color.r,
        color.g,
        color.b,
        color.a as f64 / 255.0
    )
}

impl RenderSurface for CanvasRenderingContext2d {
    fn draw_image(&mut self, target: Rect, image: &RgbaImage, source: Rect) {
        check_blit(target, canvas_rect(self), image, source);
        if target.is_empty() {
            return;
        }
        let region = image.crop(source);
        let image_data = ImageData::new_with_u8_clamped_array_and_sh(
            Clamped(&region.pixels[..]),
            region.width as u32,
            region.height as u32,
        );
        match image_data {
            Ok(data) => {
                if let Err(e) = self.put_image_data(&data, target.x as f64, target.y as f64) {
                    log::error!("Failed to put ImageData: {e:?}");
                }
            }
            Err(e) => {
                log::error!("Failed to create ImageData: {e:?}");
            }
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        if rect.is_empty() {
            return;
        }
        self.set_fill_style_str(&css_color(color));
        CanvasRenderingContext2d::fill_rect(
            self,
            rect.x as f64,
            rect.y as f64,
            rect.width as f64,
            rect.height as f64,
        );
    }
}
