//! Rendering palettes as images

use crate::color::Palette;
use image::{Rgba, RgbaImage};

/// Render a palette as a row of solid `block` x `block` squares, one per color
///
/// Every pixel is fully opaque, even for palette colors with alpha.
/// An empty palette or a `block` of `0` gives an empty image.
#[must_use]
pub fn render(palette: &Palette, block: u32) -> RgbaImage {
	let colors = palette.colors();
	let width = u32::try_from(colors.len()).map_or(u32::MAX, |len| len.saturating_mul(block));

	RgbaImage::from_fn(width, block, |x, _| {
		let color = colors[(x / block) as usize];
		Rgba([color.red, color.green, color.blue, u8::MAX])
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::color::rgb;
	use palette::Srgba;

	#[test]
	fn blocks_are_laid_out_left_to_right() {
		let palette = Palette::new(vec![rgb(255, 0, 0), rgb(0, 255, 0), rgb(0, 0, 255)]);
		let image = render(&palette, 4);

		assert_eq!(image.dimensions(), (12, 4));
		for (x, y, pixel) in image.enumerate_pixels() {
			let color = palette.colors()[(x / 4) as usize];
			assert_eq!(pixel.0, [color.red, color.green, color.blue, 255], "({x}, {y})");
		}
	}

	#[test]
	fn alpha_is_forced_opaque() {
		let palette = Palette::new(vec![Srgba::new(10, 20, 30, 0), Srgba::new(40, 50, 60, 128)]);
		let image = render(&palette, 2);

		assert!(image.pixels().all(|pixel| pixel.0[3] == u8::MAX));
		assert_eq!(image.get_pixel(0, 0).0, [10, 20, 30, 255]);
		assert_eq!(image.get_pixel(3, 1).0, [40, 50, 60, 255]);
	}

	#[test]
	fn empty_inputs_give_empty_image() {
		assert_eq!(render(&Palette::default(), 10).dimensions(), (0, 10));
		assert_eq!(render(&Palette::new(vec![rgb(1, 2, 3)]), 0).dimensions(), (0, 0));
	}
}
