//! Grouping images by the similarity of their palettes

use crate::{
	cache::PaletteCache,
	color::{rgb, unit_rgb_to_hsl, Color, ColorMean, HslPoint, HueMean, Palette},
	error::ClusteringError,
	kmeans::{self, Dataset, Euclidean, KmeansOptions},
};
use log::debug;

/// Options for [`PaletteClusterer`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterOptions {
	/// Number of image clusters
	pub n: usize,
	/// k-means parameters
	pub kmeans: KmeansOptions,
	/// Color used for every position of a centroid with no members
	pub empty_fill: Color,
	/// How the hue at each centroid position is averaged
	pub hue_mean: HueMean,
}

impl Default for ClusterOptions {
	fn default() -> Self {
		Self {
			n: 5,
			kmeans: KmeansOptions::default(),
			empty_fill: rgb(0, 0, 0),
			hue_mean: HueMean::default(),
		}
	}
}

/// The result of clustering a list of palettes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PaletteClusters {
	/// The label of each input palette, in `0..n`
	pub labels: Vec<usize>,
	/// The mean palette of each label
	///
	/// There are always `n` centroids (none for empty input).
	/// Position `i` of a centroid is the mean of position `i` of its members.
	pub centroids: Vec<Palette>,
}

/// Clusters palettes of equal length into `n` groups
#[derive(Debug, Clone, Copy)]
pub struct PaletteClusterer<'a> {
	/// Shared palette -> vector memo
	cache: &'a PaletteCache,
	/// Clustering parameters
	options: &'a ClusterOptions,
}

impl<'a> PaletteClusterer<'a> {
	/// Create a clusterer flattening palettes through `cache`
	#[must_use]
	pub const fn new(cache: &'a PaletteCache, options: &'a ClusterOptions) -> Self {
		Self { cache, options }
	}

	/// Assign each palette a label and compute the centroid palette of each label
	///
	/// Palettes are compared in canonical order, so two palettes with the same colors
	/// in a different order are identical. An empty list gives an empty result.
	///
	/// # Errors
	/// Fails if the palettes differ in length, are all empty,
	/// or there are fewer palettes than `n` (including `n == 0`).
	pub fn cluster(&self, palettes: &[Palette]) -> Result<PaletteClusters, ClusteringError> {
		let ClusterOptions { n, kmeans, empty_fill, hue_mean } = *self.options;

		let Some(first) = palettes.first() else {
			return Ok(PaletteClusters::default());
		};
		let k = first.len();

		let vectors = palettes
			.iter()
			.map(|palette| self.cache.get(&palette.clone().into_canonical()))
			.collect::<Vec<_>>();

		let mut data = Dataset::with_capacity(3 * k, vectors.len());
		for vector in &vectors {
			data.push(vector, 1)?;
		}

		let result = kmeans::run::<Euclidean>(&data, n, &kmeans)?;
		debug!(
			"clustered {} palettes into {n} groups in {} iterations with variance {}",
			palettes.len(),
			result.iterations,
			result.variance,
		);

		let mut means = vec![vec![ColorMean::new(hue_mean); k]; n];
		for (vector, &label) in vectors.iter().zip(&result.assignments) {
			for (mean, channels) in means[label].iter_mut().zip(vector.chunks_exact(3)) {
				let (h, s, l) = unit_rgb_to_hsl(channels[0], channels[1], channels[2]);
				mean.add(HslPoint { h, s, l }, 1.0);
			}
		}

		let centroids = means
			.iter()
			.enumerate()
			.map(|(label, positions)| {
				if positions.iter().all(ColorMean::is_empty) {
					debug!("image cluster {label} of {n} has no members, using the fill color");
				}
				positions.iter().map(|mean| mean.color().unwrap_or(empty_fill)).collect::<Palette>()
			})
			.collect();

		Ok(PaletteClusters { labels: result.assignments, centroids })
	}
}
