//! Palette extraction for a single image

use crate::{
	cache::ColorCache,
	color::{rgb, rgb_key, ChannelWeights, Color, ColorMean, HslPoint, HueMean, Palette},
	error::ClusteringError,
	kmeans::{self, Dataset, Euclidean, KmeansOptions},
	Result,
};
use image::RgbaImage;
use log::debug;
use std::collections::HashMap;

/// Options for [`PaletteExtractor`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractOptions {
	/// Number of colors in each palette
	pub k: usize,
	/// Scale factors for the HSL channels when computing color distance
	pub weights: ChannelWeights,
	/// k-means parameters
	pub kmeans: KmeansOptions,
	/// Color used for a cluster that ends up with no pixels
	///
	/// This happens when the image has fewer distinct colors than `k`.
	pub empty_fill: Color,
	/// How the hue of each cluster's pixels is averaged
	pub hue_mean: HueMean,
}

impl Default for ExtractOptions {
	fn default() -> Self {
		Self {
			k: 8,
			weights: ChannelWeights::default(),
			kmeans: KmeansOptions::default(),
			empty_fill: rgb(0, 0, 0),
			hue_mean: HueMean::default(),
		}
	}
}

/// Distinct colors of an image as HSL points with their pixel counts
struct DistinctColors {
	/// Unweighted HSL point for each distinct color
	points: Vec<HslPoint>,
	/// Number of pixels with each color
	counts: Vec<u32>,
}

/// Finds the `k` dominant colors of an image
#[derive(Debug, Clone, Copy)]
pub struct PaletteExtractor<'a> {
	/// Shared RGB -> HSL memo
	cache: &'a ColorCache,
	/// Extraction parameters
	options: &'a ExtractOptions,
}

impl<'a> PaletteExtractor<'a> {
	/// Create an extractor converting colors through `cache`
	#[must_use]
	pub const fn new(cache: &'a ColorCache, options: &'a ExtractOptions) -> Self {
		Self { cache, options }
	}

	/// Extract the palette of a decoded image
	///
	/// # Errors
	/// Fails if the image has fewer pixels than `k` (including an empty image), `k` is `0`,
	/// or the channel weights are invalid.
	pub fn extract(&self, image: &RgbaImage) -> Result<Palette> {
		let pixels: &[Color] = palette::cast::from_component_slice(image.as_raw());
		self.extract_colors(pixels)
	}

	/// Extract the palette of a list of pixels
	///
	/// The returned palette has exactly `k` colors in canonical order.
	///
	/// # Errors
	/// Fails if there are fewer pixels than `k` (including no pixels), `k` is `0`,
	/// or the channel weights are invalid (see [`ChannelWeights::is_valid`]).
	pub fn extract_colors(&self, pixels: &[Color]) -> Result<Palette> {
		let ExtractOptions { k, weights, kmeans, empty_fill, hue_mean } = *self.options;
		if !weights.is_valid() {
			return Err(ClusteringError::InvalidWeights.into());
		}

		let distinct = self.distinct_colors(pixels);
		debug!("reduced {} pixels to {} distinct colors", pixels.len(), distinct.points.len());

		let mut data = Dataset::with_capacity(3, distinct.points.len());
		for (&point, &count) in distinct.points.iter().zip(&distinct.counts) {
			data.push(&weights.apply(point), count)?;
		}

		let result = kmeans::run::<Euclidean>(&data, k, &kmeans)?;
		debug!("k-means took {} iterations with variance {}", result.iterations, result.variance);

		// Average the unweighted points of each cluster
		let mut means = vec![ColorMean::new(hue_mean); k];
		for ((&point, &count), &cluster) in distinct.points.iter().zip(&distinct.counts).zip(&result.assignments) {
			means[cluster].add(point, f64::from(count));
		}

		let palette = means
			.iter()
			.enumerate()
			.map(|(i, mean)| {
				mean.color().unwrap_or_else(|| {
					debug!("cluster {i} of {k} has no pixels, using the fill color");
					empty_fill
				})
			})
			.collect::<Palette>();

		Ok(palette.into_canonical())
	}

	/// Group identical pixels, converting each distinct color through the cache
	fn distinct_colors(&self, pixels: &[Color]) -> DistinctColors {
		let mut points = Vec::new();
		let mut counts = Vec::<u32>::new();

		// Packed RGB -> index into points and counts
		let mut memo: HashMap<u32, usize> = HashMap::new();

		for &color in pixels {
			let index = *memo.entry(rgb_key(color)).or_insert_with(|| {
				points.push(self.cache.get(color));
				counts.push(0);
				points.len() - 1
			});

			counts[index] = counts[index].saturating_add(1);
		}

		DistinctColors { points, counts }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Error;
	use image::Rgba;

	fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
		RgbaImage::from_pixel(width, height, Rgba(color))
	}

	fn gradient() -> RgbaImage {
		RgbaImage::from_fn(48, 32, |x, y| {
			#[allow(clippy::cast_possible_truncation)]
			Rgba([(x * 5) as u8, (y * 8) as u8, ((x + y) * 3) as u8, 255])
		})
	}

	fn extract(image: &RgbaImage, options: &ExtractOptions) -> Result<Palette> {
		let cache = ColorCache::default();
		PaletteExtractor::new(&cache, options).extract(image)
	}

	fn options(k: usize) -> ExtractOptions {
		ExtractOptions { k, ..Default::default() }
	}

	#[test]
	fn solid_red_is_exact() {
		let palette = extract(&solid(8, 8, [255, 0, 0, 255]), &options(1)).unwrap();
		assert_eq!(palette.to_hex(), vec!["#ff0000"]);
	}

	#[test]
	fn single_pixel_red() {
		let palette = extract(&solid(1, 1, [255, 0, 0, 255]), &options(1)).unwrap();
		assert_eq!(palette.to_hex(), vec!["#ff0000"]);
	}

	#[test]
	fn two_colors_are_recovered() {
		let image = RgbaImage::from_fn(10, 10, |x, _| {
			if x < 5 {
				Rgba([0, 0, 255, 255])
			} else {
				Rgba([255, 0, 0, 255])
			}
		});

		let palette = extract(&image, &options(2)).unwrap();
		assert_eq!(palette.to_hex(), vec!["#ff0000", "#0000ff"]);
	}

	#[test]
	fn majority_pulls_the_mean() {
		let image = RgbaImage::from_fn(4, 1, |x, _| {
			if x == 0 {
				Rgba([0, 255, 0, 255])
			} else {
				Rgba([255, 0, 0, 255])
			}
		});

		// Hue 1/12: three parts red (0) to one part green (1/3)
		let palette = extract(&image, &options(1)).unwrap();
		let color = palette.colors()[0];
		assert_eq!(color.red, 255);
		assert_eq!(color.blue, 0);
		assert!((125..=130).contains(&color.green), "{color:?}");

		// On the color wheel the same pixels land closer to red
		let circular = ExtractOptions { hue_mean: HueMean::Circular, ..options(1) };
		let color = extract(&image, &circular).unwrap().colors()[0];
		assert_eq!((color.red, color.blue), (255, 0));
		assert!((70..=90).contains(&color.green), "{color:?}");
	}

	#[test]
	fn empty_clusters_use_fill_color() {
		let image = solid(4, 4, [255, 0, 0, 255]);

		let palette = extract(&image, &options(3)).unwrap();
		assert_eq!(palette.to_hex(), vec!["#000000", "#000000", "#ff0000"]);

		let white = ExtractOptions { empty_fill: rgb(255, 255, 255), ..options(3) };
		let palette = extract(&image, &white).unwrap();
		assert_eq!(palette.to_hex(), vec!["#ff0000", "#ffffff", "#ffffff"]);
	}

	#[test]
	fn always_k_colors_in_canonical_order() {
		let image = gradient();
		for k in [1, 2, 3, 5, 8, 16] {
			let palette = extract(&image, &options(k)).unwrap();
			assert_eq!(palette.len(), k);
			assert!(palette.is_canonical());
		}
	}

	#[test]
	fn extraction_is_deterministic() {
		let image = gradient();
		let cache = ColorCache::default();
		let options = options(6);
		let extractor = PaletteExtractor::new(&cache, &options);

		let first = extractor.extract(&image).unwrap();
		let second = extractor.extract(&image).unwrap();
		let fresh_cache = extract(&image, &options).unwrap();

		assert_eq!(first, second);
		assert_eq!(first, fresh_cache);
	}

	#[test]
	fn alpha_is_ignored() {
		let opaque = extract(&solid(3, 3, [10, 120, 200, 255]), &options(1)).unwrap();
		let translucent = extract(&solid(3, 3, [10, 120, 200, 7]), &options(1)).unwrap();
		assert_eq!(opaque, translucent);
		assert_eq!(opaque.colors()[0].alpha, 255);
	}

	#[test]
	fn cache_holds_distinct_colors() {
		let cache = ColorCache::default();
		let options = options(2);
		let image = RgbaImage::from_fn(6, 6, |x, y| Rgba([if (x + y) % 2 == 0 { 0 } else { 255 }, 40, 80, 255]));

		PaletteExtractor::new(&cache, &options).extract(&image).unwrap();

		assert_eq!(cache.len(), 2);
	}

	#[test]
	fn too_few_pixels_is_an_error() {
		let result = extract(&solid(1, 1, [1, 2, 3, 255]), &options(2));
		assert!(matches!(
			result,
			Err(Error::Clustering(ClusteringError::TooFewPoints { clusters: 2, points: 1 }))
		));

		let result = extract(&RgbaImage::new(0, 0), &options(2));
		assert!(matches!(result, Err(Error::Clustering(ClusteringError::EmptyInput))));

		let result = extract(&solid(2, 2, [1, 2, 3, 255]), &options(0));
		assert!(matches!(result, Err(Error::Clustering(ClusteringError::NoClusters))));
	}

	#[test]
	fn huge_weights_are_an_error() {
		let image = RgbaImage::from_fn(4, 4, |x, _| {
			if x < 2 {
				Rgba([255, 0, 0, 255])
			} else {
				Rgba([0, 0, 255, 255])
			}
		});

		for hue in [1e200, f64::INFINITY, f64::NAN, -1.0] {
			let options = ExtractOptions {
				k: 2,
				weights: ChannelWeights { hue, ..Default::default() },
				..Default::default()
			};
			let result = extract(&image, &options);
			assert!(
				matches!(result, Err(Error::Clustering(ClusteringError::InvalidWeights))),
				"{hue}: {result:?}"
			);
		}

		let largest = ExtractOptions {
			k: 2,
			weights: ChannelWeights { hue: ChannelWeights::MAX, ..Default::default() },
			..Default::default()
		};
		assert_eq!(extract(&image, &largest).unwrap().to_hex(), vec!["#ff0000", "#0000ff"]);
	}
}
