//! Extract dominant-color palettes from images with k-means in the HSL color space,
//! and group images with similar palettes.
//!
//! # Examples
//!
//! ## Get the 5 dominant colors of an image.
//!
//! ```no_run
//! use chromaclust::{ColorCache, ExtractOptions, PaletteExtractor};
//!
//! let image = image::open("some image").unwrap().into_rgba8();
//! let cache = ColorCache::default();
//! let options = ExtractOptions { k: 5, ..Default::default() };
//! let palette = PaletteExtractor::new(&cache, &options).extract(&image).unwrap();
//! println!("{:?}", palette.to_hex());
//! ```
//!
//! ## Group many images by their palettes.
//!
//! ```no_run
//! use chromaclust::{ClusterOptions, NoStore, PaletteSink, Palette, Pipeline, PipelineOptions};
//!
//! struct Print;
//!
//! impl PaletteSink for Print {
//!     fn palette(&mut self, id: &str, palette: &Palette) -> std::io::Result<()> {
//!         println!("{id}: {:?}", palette.to_hex());
//!         Ok(())
//!     }
//! }
//!
//! let options = PipelineOptions {
//!     cluster: Some(ClusterOptions { n: 3, ..Default::default() }),
//!     ..Default::default()
//! };
//! let load = |path: &str| -> chromaclust::Result<image::RgbaImage> { chromaclust::decode(&std::fs::read(path)?) };
//! let summary = Pipeline::new(options)
//!     .run(&["a.png", "b.png", "c.png", "d.png"], &load, &NoStore, &mut Print)
//!     .unwrap();
//! println!("{} images failed", summary.failures.len());
//! ```
//!
//! # Arguments
//!
//! Here are explanations of the options shared by [`ExtractOptions`] and [`ClusterOptions`].
//!
//! ## K
//!
//! The number of colors in each palette. Every palette has exactly `k` colors,
//! sorted by lightness, then hue, then saturation.
//!
//! If an image has fewer distinct colors than `k`, the extra entries are filled with
//! [`ExtractOptions::empty_fill`] (opaque black by default).
//! An image with fewer pixels than `k` cannot be given a palette and is reported as a failure.
//!
//! ## N
//!
//! The number of image clusters. Every image gets a label in `0..n`,
//! and each label gets a centroid palette of the same length as the image palettes.
//! A label with no images gets a centroid filled with [`ClusterOptions::empty_fill`].
//! Clustering fails if there are fewer images than `n`.
//!
//! ## Channel Weights
//!
//! Colors are compared by their HSL components after scaling each one by its weight.
//! Lowering the lightness weight, for example, merges shades of the same hue.
//! The weights only affect which pixels are grouped together;
//! the resulting colors are always true averages of their pixels.
//!
//! ## Trials
//!
//! This is the number of times to run k-means, taking the trial with the lowest variance.
//!
//! k-means can get stuck in a local minimum, so a few trials give a better chance at a good result.
//! Each trial uses a different seed derived from [`KmeansOptions::seed`].
//!
//! ## Max Iterations
//!
//! k-means stops once no point changes its cluster.
//! The maximum number of iterations bounds the running time if that never happens.
//!
//! ## Seed
//!
//! This is the value used to seed the random number generator which is used to choose the initial centroids.
//! The same seed and input always give the same palettes and clusters.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::cargo)]
#![warn(clippy::use_debug, clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![warn(clippy::unwrap_used, clippy::unwrap_in_result)]
#![warn(clippy::unneeded_field_pattern, clippy::rest_pat_in_fully_bound_structs)]
#![warn(clippy::unnecessary_self_imports)]
#![warn(clippy::str_to_string, clippy::string_to_string, clippy::string_slice)]
#![warn(missing_docs, clippy::missing_docs_in_private_items, rustdoc::all)]
#![warn(clippy::float_cmp_const, clippy::lossy_float_literal)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::enum_glob_use)]
#![allow(clippy::unreadable_literal)]

mod cache;
mod cluster;
mod color;
mod error;
mod extract;
pub mod kmeans;
mod pipeline;
pub mod swatch;

pub use cache::{CacheStats, ColorCache, PaletteCache};
pub use cluster::{ClusterOptions, PaletteClusterer, PaletteClusters};
pub use color::{
	canonical_cmp, hsl_to_rgb, parse_hex, rgb, rgb_to_hsl, to_hex, unit_rgb_to_hsl, ChannelWeights, Color, ColorMean,
	HslPoint, HueMean, Palette,
};
pub use error::{ClusteringError, Error, Result};
pub use extract::{ExtractOptions, PaletteExtractor};
pub use kmeans::KmeansOptions;
pub use pipeline::{
	decode, ClusterReport, ImageFailure, ImageSource, LabeledPalette, NoStore, PaletteSink, PaletteStore, Pipeline,
	PipelineOptions, RunSummary,
};
