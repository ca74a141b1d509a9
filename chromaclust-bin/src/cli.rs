//! Specifies the CLI and handles arg parsing

use crate::template::{Template, DEFAULT_PALETTE_JSON};
use chromaclust::{ChannelWeights, Color, HueMean, KmeansOptions};
use clap::{Args, Parser, Subcommand};
use std::{
	fmt::{Debug, Display},
	num::{NonZeroUsize, ParseFloatError},
	ops::RangeBounds,
	str::FromStr,
};

/// Extract dominant color palettes from images with k-means in the HSL color space,
/// and group images with similar palettes.
#[derive(Parser)]
#[command(version)]
pub struct Options {
	/// What to do with the images
	#[command(subcommand)]
	pub command: Command,
}

/// The subcommands
#[derive(Subcommand)]
pub enum Command {
	/// Print the palette of each image as a line of JSON
	#[command(after_help = "Output templates can use {path}, {abs}, {basename}, {dirname}, {stem}, {ext}, and {k}.")]
	Extract(ExtractArgs),
	/// Group images by palette similarity and print the clustering as JSON
	#[command(
		after_help = "Output templates can use {path}, {abs}, {basename}, {dirname}, {stem}, {ext}, {k}, {n}, and {label}.\n\
		              Cluster PNG and summary JSON templates have no image path, and only cluster PNGs have a {label}."
	)]
	Cluster(ClusterArgs),
}

/// Options for the k-means runs shared by both subcommands
#[derive(Args)]
pub struct KmeansArgs {
	/// The number of trials of k-means to run
	///
	/// k-means can get stuck in a local minimum, so you may want to run a few or more trials to get better results.
	/// The trial with the lowest variance is picked.
	#[arg(long, default_value_t = 4)]
	pub trials: u32,

	/// The maximum number of iterations for each k-means trial
	#[arg(long, default_value_t = 256)]
	pub max_iter: u32,

	/// The seed value used for the random number generator
	#[arg(long, default_value_t = 0)]
	pub seed: u64,

	/// The value used to scale the hue component when comparing colors
	#[arg(long, default_value_t = 1.0, value_parser = parse_valid_weight)]
	pub hue_weight: f64,

	/// The value used to scale the saturation component when comparing colors
	#[arg(long, default_value_t = 1.0, value_parser = parse_valid_weight)]
	pub saturation_weight: f64,

	/// The value used to scale the lightness component when comparing colors
	///
	/// Lower weights have the effect of bringing out more distinct hues.
	/// The resulting colors are still true averages of the pixels they stand for.
	#[arg(long, default_value_t = 1.0, value_parser = parse_valid_weight)]
	pub lightness_weight: f64,

	/// Average hue around the color wheel instead of as a plain number
	///
	/// Keeps the mean of reds on both sides of hue 0 red, but the resulting colors
	/// are no longer the exact centers k-means converged to.
	#[arg(long)]
	pub circular_hue: bool,

	/// The hex color used for palette entries that no pixel or image ended up in
	#[arg(long, default_value = "#000000", value_parser = parse_color)]
	pub empty_fill: Color,

	/// The number of images to process in parallel, defaults to the number of CPUs
	#[arg(short, long)]
	pub parallel: Option<NonZeroUsize>,
}

impl KmeansArgs {
	/// The k-means options for the engine
	pub fn kmeans(&self) -> KmeansOptions {
		KmeansOptions {
			trials: self.trials,
			max_iter: self.max_iter,
			seed: self.seed,
		}
	}

	/// The HSL channel weights
	pub fn weights(&self) -> ChannelWeights {
		ChannelWeights {
			hue: self.hue_weight,
			saturation: self.saturation_weight,
			lightness: self.lightness_weight,
		}
	}

	/// How palette colors average hue
	pub fn hue_mean(&self) -> HueMean {
		if self.circular_hue {
			HueMean::Circular
		} else {
			HueMean::Linear
		}
	}
}

/// Options for `extract`
#[derive(Args)]
pub struct ExtractArgs {
	/// The paths to the input images
	#[arg(required = true)]
	pub images: Vec<String>,

	/// The number of colors in each palette
	#[arg(short, default_value_t = 8, value_parser = parse_positive)]
	pub k: usize,

	/// Write a swatch of each palette to this PNG path template
	#[arg(long, value_name = "TEMPLATE")]
	pub out_png: Option<Template>,

	/// The size of each color block in the swatch
	#[arg(long, default_value_t = 100)]
	pub out_png_height: u32,

	/// Write the hex colors of each palette, one per line, to this path template
	#[arg(long, value_name = "TEMPLATE")]
	pub out_txt: Option<Template>,

	/// Write each palette as JSON to this path template
	#[arg(long, value_name = "TEMPLATE")]
	pub out_json: Option<Template>,

	/// Print a true color swatch of each palette to stderr
	#[arg(long)]
	pub preview: bool,

	#[allow(clippy::missing_docs_in_private_items)]
	#[command(flatten)]
	pub kmeans: KmeansArgs,
}

/// Options for `cluster`
#[derive(Args)]
pub struct ClusterArgs {
	/// The paths to the input images
	#[arg(required_unless_present = "glob")]
	pub images: Vec<String>,

	/// Also cluster the files matching this glob pattern, like "photos/**/*.jpg"
	#[arg(long, value_name = "PATTERN")]
	pub glob: Option<String>,

	/// The number of image clusters
	#[arg(short, default_value_t = 5, value_parser = parse_positive)]
	pub n: usize,

	/// The number of colors in each palette
	#[arg(short, default_value_t = 4, value_parser = parse_positive)]
	pub k: usize,

	/// Reuse palettes from JSON files at this path template when they have k colors
	///
	/// A bare --in-json uses the default template, a custom one is given as --in-json=TEMPLATE.
	#[arg(
		long,
		value_name = "TEMPLATE",
		num_args = 0..=1,
		require_equals = true,
		default_missing_value = DEFAULT_PALETTE_JSON
	)]
	pub in_json: Option<Template>,

	/// Write newly extracted palettes as JSON to this path template
	///
	/// A bare --out-json uses the default template, a custom one is given as --out-json=TEMPLATE.
	#[arg(
		long,
		value_name = "TEMPLATE",
		num_args = 0..=1,
		require_equals = true,
		default_missing_value = DEFAULT_PALETTE_JSON
	)]
	pub out_json: Option<Template>,

	/// Write a swatch of each image's palette to this PNG path template
	#[arg(long, value_name = "TEMPLATE")]
	pub out_png: Option<Template>,

	/// Write a swatch of each cluster centroid to this PNG path template
	#[arg(long, value_name = "TEMPLATE")]
	pub out_cluster_png: Option<Template>,

	/// The size of each color block in the swatches
	#[arg(long, default_value_t = 100)]
	pub out_cluster_png_height: u32,

	/// Write the clustering as JSON to this path template
	#[arg(long, value_name = "TEMPLATE")]
	pub out_summary_json: Option<Template>,

	/// Run this command template through the shell for each image once it has a label
	#[arg(long, value_name = "TEMPLATE")]
	pub out_shell: Option<Template>,

	#[allow(clippy::missing_docs_in_private_items)]
	#[command(flatten)]
	pub kmeans: KmeansArgs,
}

/// Parse a float value and ensure it in the provided, valid range
fn parse_float_in_range<T>(s: &str, range: impl RangeBounds<T> + Debug) -> Result<T, String>
where
	T: FromStr<Err = ParseFloatError> + Display + PartialOrd,
{
	let value: T = s.parse().map_err(|e| format!("{e}"))?;
	if range.contains(&value) {
		Ok(value)
	} else {
		Err(format!("{value} is not in {range:?}"))
	}
}

/// Parse a channel weight and ensure it is in `0.0..=ChannelWeights::MAX`
fn parse_valid_weight(s: &str) -> Result<f64, String> {
	parse_float_in_range(s, 0.0..=ChannelWeights::MAX)
}

/// Parse a count and ensure it is at least `1`
fn parse_positive(s: &str) -> Result<usize, String> {
	let value: usize = s.parse().map_err(|e| format!("{e}"))?;
	if value == 0 {
		Err("must be at least 1".to_owned())
	} else {
		Ok(value)
	}
}

/// Parse a `#rrggbb` color
fn parse_color(s: &str) -> Result<Color, String> {
	chromaclust::parse_hex(s).map_err(|e| format!("{e}"))
}
