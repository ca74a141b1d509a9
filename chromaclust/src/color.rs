//! RGB and HSL conversions, the canonical palette order, and hex serialization

use crate::{Error, Result};
use palette::{rgb::channels, Srgba};
use std::{cmp::Ordering, f64::consts::TAU, fmt::Write};

/// An 8-bit sRGB color with alpha
///
/// Alpha is carried through extraction and serialization but never affects color distance.
pub type Color = Srgba<u8>;

/// Create an opaque [`Color`]
#[must_use]
pub fn rgb(red: u8, green: u8, blue: u8) -> Color {
	Srgba::new(red, green, blue, u8::MAX)
}

/// A color in the HSL color space with every component in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HslPoint {
	/// Hue, where both `0.0` and `1.0` are red
	pub h: f64,
	/// Saturation
	pub s: f64,
	/// Lightness
	pub l: f64,
}

impl HslPoint {
	/// Convert a color to HSL, ignoring alpha
	#[must_use]
	pub fn from_color(color: Color) -> Self {
		let (h, s, l) = rgb_to_hsl(color.red, color.green, color.blue);
		Self { h, s, l }
	}

	/// Convert back to an opaque color
	#[must_use]
	pub fn to_color(self) -> Color {
		let (r, g, b) = hsl_to_rgb(self.h, self.s, self.l);
		rgb(r, g, b)
	}

	/// The components as `[h, s, l]`
	#[must_use]
	pub const fn to_array(self) -> [f64; 3] {
		[self.h, self.s, self.l]
	}
}

/// Per-channel scale factors applied to [`HslPoint`]s before clustering
///
/// Lower weights reduce the influence of that channel on color distance.
/// A weight of `0.0` ignores the channel entirely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelWeights {
	/// Hue weight
	pub hue: f64,
	/// Saturation weight
	pub saturation: f64,
	/// Lightness weight
	pub lightness: f64,
}

impl Default for ChannelWeights {
	fn default() -> Self {
		Self { hue: 1.0, saturation: 1.0, lightness: 1.0 }
	}
}

impl ChannelWeights {
	/// Largest weight accepted by [`ChannelWeights::is_valid`]
	///
	/// HSL components are at most `1.0`, so squared distances between weighted points stay far from overflowing.
	pub const MAX: f64 = 1e6;

	/// Whether every weight is in `0.0..=MAX`
	#[must_use]
	pub fn is_valid(&self) -> bool {
		[self.hue, self.saturation, self.lightness]
			.iter()
			.all(|w| (0.0..=Self::MAX).contains(w))
	}

	/// Scale each component of `point` by its weight
	#[must_use]
	pub fn apply(&self, point: HslPoint) -> [f64; 3] {
		[point.h * self.hue, point.s * self.saturation, point.l * self.lightness]
	}
}

/// Convert 8-bit RGB to HSL with each component in `0.0..=1.0`
#[must_use]
pub fn rgb_to_hsl(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
	let max = f64::from(u8::MAX);
	unit_rgb_to_hsl(f64::from(r) / max, f64::from(g) / max, f64::from(b) / max)
}

/// Convert RGB with each channel in `0.0..=1.0` to HSL
#[must_use]
#[allow(clippy::float_cmp)]
pub fn unit_rgb_to_hsl(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
	let max = r.max(g).max(b);
	let min = r.min(g).min(b);
	let l = (max + min) / 2.0;
	let delta = max - min;

	let mut h = 0.0;
	let mut s = 0.0;
	if delta != 0.0 {
		s = if l < 0.5 { delta / (max + min) } else { delta / (2.0 - max - min) };

		let r2 = ((max - r) / 6.0 + delta / 2.0) / delta;
		let g2 = ((max - g) / 6.0 + delta / 2.0) / delta;
		let b2 = ((max - b) / 6.0 + delta / 2.0) / delta;

		h = if r == max {
			b2 - g2
		} else if g == max {
			1.0 / 3.0 + r2 - b2
		} else {
			2.0 / 3.0 + g2 - r2
		};
	}

	if h < 0.0 {
		h += 1.0;
	} else if h > 1.0 {
		h -= 1.0;
	}

	(h, s, l)
}

/// One of the three channels of [`hsl_to_rgb`] for the hue offset `h`
fn hue_to_channel(v1: f64, v2: f64, mut h: f64) -> f64 {
	if h < 0.0 {
		h += 1.0;
	}
	if h > 1.0 {
		h -= 1.0;
	}

	if 6.0 * h < 1.0 {
		v1 + (v2 - v1) * 6.0 * h
	} else if 2.0 * h < 1.0 {
		v2
	} else if 3.0 * h < 2.0 {
		v1 + (v2 - v1) * (2.0 / 3.0 - h) * 6.0
	} else {
		v1
	}
}

/// Scale a channel in `0.0..=1.0` to a byte
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn unit_to_byte(x: f64) -> u8 {
	// float to int `as` casts saturate, so out of range values clamp to 0 or 255
	(f64::from(u8::MAX) * x).round() as u8
}

/// Convert HSL with each component in `0.0..=1.0` to 8-bit RGB
///
/// `hsl_to_rgb(rgb_to_hsl(c))` is within 1 of `c` on every channel.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
	if s == 0.0 {
		let v = unit_to_byte(l);
		return (v, v, v);
	}

	let v2 = if l < 0.5 { l * (1.0 + s) } else { (l + s) - s * l };
	let v1 = 2.0 * l - v2;

	(
		unit_to_byte(hue_to_channel(v1, v2, h + 1.0 / 3.0)),
		unit_to_byte(hue_to_channel(v1, v2, h)),
		unit_to_byte(hue_to_channel(v1, v2, h - 1.0 / 3.0)),
	)
}

/// The packed RGB bytes of a color, used as a cache key (alpha is always `0xFF`)
pub(crate) fn rgb_key(color: Color) -> u32 {
	color.color.into_u32::<channels::Rgba>()
}

/// Order two HSL points by lightness, then hue, then saturation
fn canonical_hsl_cmp(x: &HslPoint, y: &HslPoint) -> Ordering {
	f64::total_cmp(&x.l, &y.l)
		.then_with(|| f64::total_cmp(&x.h, &y.h))
		.then_with(|| f64::total_cmp(&x.s, &y.s))
}

/// The canonical palette order: ascending lightness, then hue, then saturation
#[must_use]
pub fn canonical_cmp(x: &Color, y: &Color) -> Ordering {
	canonical_hsl_cmp(&HslPoint::from_color(*x), &HslPoint::from_color(*y))
}

/// Format a color as `#rrggbb`, or `#rrggbbaa` if it is not fully opaque
#[must_use]
pub fn to_hex(color: Color) -> String {
	let mut hex = format!("#{:02x}{:02x}{:02x}", color.red, color.green, color.blue);
	if color.alpha != u8::MAX {
		// writing to a String cannot fail
		let _ = write!(hex, "{:02x}", color.alpha);
	}
	hex
}

/// Parse a `#rrggbb` or `#rrggbbaa` hex color (the `#` is optional, case is ignored)
///
/// # Errors
/// Returns [`Error::InvalidHex`] if `hex` is not 6 or 8 hex digits.
pub fn parse_hex(hex: &str) -> Result<Color> {
	let invalid = || Error::InvalidHex(hex.to_owned());

	let digits = hex.strip_prefix('#').unwrap_or(hex);
	if !matches!(digits.len(), 6 | 8) || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
		return Err(invalid());
	}

	let value = u32::from_str_radix(digits, 16).map_err(|_| invalid())?;
	let [r, g, b, a] = if digits.len() == 6 {
		((value << 8) | 0xFF).to_be_bytes()
	} else {
		value.to_be_bytes()
	};

	Ok(Srgba::new(r, g, b, a))
}

/// How [`ColorMean`] averages hue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HueMean {
	/// Plain weighted mean of the hue values, like the other channels
	///
	/// This matches the centroids k-means computes, so each color is the center of its cluster.
	#[default]
	Linear,
	/// Mean on the color wheel, weighting each hue by its saturation
	///
	/// Reds just below and above hue `0.0` average to red and grays do not pull the hue.
	Circular,
}

/// Accumulates weighted HSL points to find their mean color
///
/// This is the one averaging path for both palette extraction and palette clustering.
/// Saturation and lightness are always plain weighted means; hue follows [`HueMean`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorMean {
	/// How hue is averaged
	mode: HueMean,
	/// Weighted sum of hue
	hue: f64,
	/// Sum of the saturation-weighted hue vectors (x component)
	hue_x: f64,
	/// Sum of the saturation-weighted hue vectors (y component)
	hue_y: f64,
	/// Weighted sum of saturation
	saturation: f64,
	/// Weighted sum of lightness
	lightness: f64,
	/// Total weight
	weight: f64,
}

impl ColorMean {
	/// Create an empty accumulator averaging hue with `mode`
	#[must_use]
	pub fn new(mode: HueMean) -> Self {
		Self { mode, ..Self::default() }
	}

	/// Add a point with the given weight
	pub fn add(&mut self, point: HslPoint, weight: f64) {
		match self.mode {
			HueMean::Linear => self.hue += weight * point.h,
			HueMean::Circular => {
				let angle = TAU * point.h;
				let strength = weight * point.s;
				self.hue_x += strength * angle.cos();
				self.hue_y += strength * angle.sin();
			},
		}
		self.saturation += weight * point.s;
		self.lightness += weight * point.l;
		self.weight += weight;
	}

	/// Whether no weight has been added
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.weight <= 0.0
	}

	/// The mean point, or `None` if nothing was added
	#[must_use]
	pub fn mean(&self) -> Option<HslPoint> {
		if self.is_empty() {
			return None;
		}

		let h = match self.mode {
			HueMean::Linear => self.hue / self.weight,
			HueMean::Circular => {
				let h = f64::atan2(self.hue_y, self.hue_x) / TAU;
				if h < 0.0 {
					h + 1.0
				} else {
					h
				}
			},
		};

		Some(HslPoint {
			h: h.clamp(0.0, 1.0),
			s: self.saturation / self.weight,
			l: self.lightness / self.weight,
		})
	}

	/// The mean as an opaque color, or `None` if nothing was added
	#[must_use]
	pub fn color(&self) -> Option<Color> {
		self.mean().map(HslPoint::to_color)
	}
}

/// An ordered list of representative colors
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Palette(Vec<Color>);

impl Palette {
	/// Wrap the colors as-is without reordering them
	#[must_use]
	pub fn new(colors: Vec<Color>) -> Self {
		Self(colors)
	}

	/// Sort the colors into the canonical order (see [`canonical_cmp`])
	#[must_use]
	pub fn into_canonical(self) -> Self {
		let mut keyed = self
			.0
			.into_iter()
			.map(|color| (HslPoint::from_color(color), color))
			.collect::<Vec<_>>();

		keyed.sort_by(|(x, _), (y, _)| canonical_hsl_cmp(x, y));

		Self(keyed.into_iter().map(|(_, color)| color).collect())
	}

	/// Whether the colors are already in canonical order
	#[must_use]
	pub fn is_canonical(&self) -> bool {
		self.0.windows(2).all(|w| canonical_cmp(&w[0], &w[1]) != Ordering::Greater)
	}

	/// Parse a palette from hex strings
	///
	/// # Errors
	/// Returns [`Error::InvalidHex`] for the first string that is not a hex color.
	pub fn from_hex<S: AsRef<str>>(hex: &[S]) -> Result<Self> {
		hex.iter().map(|s| parse_hex(s.as_ref())).collect::<Result<Vec<_>>>().map(Self)
	}

	/// Format every color with [`to_hex`]
	#[must_use]
	pub fn to_hex(&self) -> Vec<String> {
		self.0.iter().copied().map(to_hex).collect()
	}

	/// The colors in order
	#[must_use]
	pub fn colors(&self) -> &[Color] {
		&self.0
	}

	/// Number of colors
	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Whether there are no colors
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Iterate over the colors
	pub fn iter(&self) -> std::slice::Iter<'_, Color> {
		self.0.iter()
	}

	/// Take the underlying colors
	#[must_use]
	pub fn into_colors(self) -> Vec<Color> {
		self.0
	}
}

impl FromIterator<Color> for Palette {
	fn from_iter<I: IntoIterator<Item = Color>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}

impl<'a> IntoIterator for &'a Palette {
	type Item = &'a Color;
	type IntoIter = std::slice::Iter<'a, Color>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;

	pub fn assert_rgb_within(x: (u8, u8, u8), y: (u8, u8, u8), tolerance: u8) {
		assert!(x.0.abs_diff(y.0) <= tolerance, "{x:?} vs {y:?}");
		assert!(x.1.abs_diff(y.1) <= tolerance, "{x:?} vs {y:?}");
		assert!(x.2.abs_diff(y.2) <= tolerance, "{x:?} vs {y:?}");
	}

	#[test]
	fn hsl_round_trip_within_one() {
		for r in (0..=u8::MAX).step_by(3) {
			for g in (0..=u8::MAX).step_by(5) {
				for b in (0..=u8::MAX).step_by(7) {
					let (h, s, l) = rgb_to_hsl(r, g, b);
					assert_rgb_within(hsl_to_rgb(h, s, l), (r, g, b), 1);
				}
			}
		}
	}

	#[test]
	fn hsl_round_trip_primaries_exact() {
		for (r, g, b) in [
			(0, 0, 0),
			(255, 255, 255),
			(255, 0, 0),
			(0, 255, 0),
			(0, 0, 255),
			(255, 255, 0),
			(0, 255, 255),
			(255, 0, 255),
			(128, 128, 128),
		] {
			let (h, s, l) = rgb_to_hsl(r, g, b);
			assert_eq!(hsl_to_rgb(h, s, l), (r, g, b));
		}
	}

	#[test]
	fn hsl_components_in_unit_range() {
		for r in (0..=u8::MAX).step_by(15) {
			for g in (0..=u8::MAX).step_by(15) {
				for b in (0..=u8::MAX).step_by(15) {
					let (h, s, l) = rgb_to_hsl(r, g, b);
					assert!((0.0..=1.0).contains(&h));
					assert!((0.0..=1.0).contains(&s));
					assert!((0.0..=1.0).contains(&l));
				}
			}
		}
	}

	#[test]
	fn hsl_known_values() {
		let (h, s, l) = rgb_to_hsl(255, 0, 0);
		assert_relative_eq!(h, 0.0);
		assert_relative_eq!(s, 1.0);
		assert_relative_eq!(l, 0.5);

		let (h, _, _) = rgb_to_hsl(0, 255, 0);
		assert_relative_eq!(h, 1.0 / 3.0, epsilon = 1e-12);

		let (h, _, _) = rgb_to_hsl(0, 0, 255);
		assert_relative_eq!(h, 2.0 / 3.0, epsilon = 1e-12);

		let (h, s, l) = rgb_to_hsl(51, 51, 51);
		assert_relative_eq!(h, 0.0);
		assert_relative_eq!(s, 0.0);
		assert_relative_eq!(l, 0.2);
	}

	#[test]
	fn hex_round_trip_is_exact() {
		let color = parse_hex("#1a2b3c").unwrap();
		assert_eq!(to_hex(color), "#1a2b3c");
		assert_eq!(color.alpha, 255);

		let translucent = parse_hex("#1a2b3c80").unwrap();
		assert_eq!(translucent.alpha, 0x80);
		assert_eq!(to_hex(translucent), "#1a2b3c80");
	}

	#[test]
	fn hex_parse_accepts_uppercase_and_no_hash() {
		assert_eq!(parse_hex("FF0000").unwrap(), rgb(255, 0, 0));
		assert_eq!(to_hex(parse_hex("#ABCDEF").unwrap()), "#abcdef");
		assert_eq!(to_hex(parse_hex("#ABCDEFFF").unwrap()), "#abcdef");
	}

	#[test]
	fn hex_parse_rejects_garbage() {
		for bad in ["", "#", "#12345", "#1234567", "#12345g", "#+12345", "red", "#1a2b3c4d5e"] {
			assert!(matches!(parse_hex(bad), Err(Error::InvalidHex(s)) if s == bad), "{bad}");
		}
	}

	#[test]
	fn canonical_order_is_lightness_then_hue_then_saturation() {
		let palette = Palette::new(vec![
			rgb(255, 255, 255),
			rgb(0, 0, 255),
			rgb(0, 255, 0),
			rgb(255, 0, 0),
			rgb(128, 0, 0),
			rgb(0, 0, 0),
		])
		.into_canonical();

		assert!(palette.is_canonical());
		assert_eq!(
			palette.to_hex(),
			vec!["#000000", "#800000", "#ff0000", "#00ff00", "#0000ff", "#ffffff"]
		);
	}

	#[test]
	fn canonical_ties_fall_back_to_saturation() {
		let dull = HslPoint { h: 0.5, s: 0.2, l: 0.5 };
		let vivid = HslPoint { h: 0.5, s: 0.8, l: 0.5 };
		assert_eq!(canonical_hsl_cmp(&dull, &vivid), Ordering::Less);
		assert_eq!(canonical_hsl_cmp(&vivid, &vivid), Ordering::Equal);

		let darker_but_later_hue = HslPoint { h: 0.9, s: 0.0, l: 0.1 };
		assert_eq!(canonical_hsl_cmp(&darker_but_later_hue, &dull), Ordering::Less);
	}

	#[test]
	fn mean_of_single_point_is_that_color() {
		for color in [rgb(255, 0, 0), rgb(0, 255, 0), rgb(12, 34, 56), rgb(200, 200, 200)] {
			let mut mean = ColorMean::default();
			mean.add(HslPoint::from_color(color), 3.0);
			let result = mean.color().unwrap();
			assert_rgb_within(
				(result.red, result.green, result.blue),
				(color.red, color.green, color.blue),
				1,
			);
		}
	}

	#[test]
	fn mean_of_reds_across_hue_zero_stays_red() {
		let mut mean = ColorMean::new(HueMean::Circular);
		mean.add(HslPoint::from_color(rgb(250, 5, 20)), 1.0);
		mean.add(HslPoint::from_color(rgb(250, 20, 5)), 1.0);

		let color = mean.color().unwrap();
		assert!(color.red > 200 && color.green < 40 && color.blue < 40, "{color:?}");
	}

	#[test]
	fn circular_mean_ignores_hue_of_grays() {
		let mut mean = ColorMean::new(HueMean::Circular);
		mean.add(HslPoint::from_color(rgb(0, 0, 255)), 1.0);
		mean.add(HslPoint::from_color(rgb(128, 128, 128)), 1.0);

		let point = mean.mean().unwrap();
		assert_relative_eq!(point.h, 2.0 / 3.0, epsilon = 1e-9);
		assert_relative_eq!(point.s, 0.5, epsilon = 1e-9);
	}

	#[test]
	fn linear_mean_averages_hue_like_the_other_channels() {
		let red = HslPoint::from_color(rgb(255, 0, 0));
		let dull_orange = HslPoint::from_color(rgb(160, 120, 80));
		assert_relative_eq!(dull_orange.h, 1.0 / 12.0, epsilon = 1e-9);

		let mut linear = ColorMean::default();
		let mut circular = ColorMean::new(HueMean::Circular);
		for mean in [&mut linear, &mut circular] {
			mean.add(red, 1.0);
			mean.add(dull_orange, 1.0);
		}

		let linear = linear.mean().unwrap();
		assert_relative_eq!(linear.h, (red.h + dull_orange.h) / 2.0, epsilon = 1e-9);
		assert_relative_eq!(linear.s, (red.s + dull_orange.s) / 2.0, epsilon = 1e-9);
		assert_relative_eq!(linear.l, (red.l + dull_orange.l) / 2.0, epsilon = 1e-9);

		// The vivid red dominates the saturation-weighted hue
		let circular = circular.mean().unwrap();
		assert!(circular.h < linear.h - 0.01, "{circular:?} vs {linear:?}");
		assert_relative_eq!(circular.s, linear.s, epsilon = 1e-9);
		assert_relative_eq!(circular.l, linear.l, epsilon = 1e-9);
	}

	#[test]
	fn empty_mean_is_none() {
		let mean = ColorMean::default();
		assert!(mean.is_empty());
		assert!(mean.mean().is_none());
		assert!(mean.color().is_none());
	}

	#[test]
	fn channel_weights_scale_components() {
		let weights = ChannelWeights { hue: 2.0, saturation: 0.5, lightness: 0.0 };
		let point = HslPoint { h: 0.25, s: 0.5, l: 0.75 };
		assert_eq!(weights.apply(point), [0.5, 0.25, 0.0]);
		assert_eq!(ChannelWeights::default().apply(point), point.to_array());
	}

	#[test]
	fn channel_weights_validity() {
		assert!(ChannelWeights::default().is_valid());
		assert!(ChannelWeights { hue: 0.0, saturation: ChannelWeights::MAX, lightness: 0.5 }.is_valid());
		for bad in [-0.5, 1e200, f64::INFINITY, f64::NAN] {
			assert!(!ChannelWeights { hue: bad, ..Default::default() }.is_valid(), "{bad}");
		}
	}

	#[test]
	fn rgb_key_ignores_alpha() {
		assert_eq!(rgb_key(Srgba::new(1, 2, 3, 4)), rgb_key(rgb(1, 2, 3)));
		assert_ne!(rgb_key(rgb(1, 2, 3)), rgb_key(rgb(3, 2, 1)));
	}
}
