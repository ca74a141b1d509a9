//! Memoized color conversions shared between threads
//!
//! Both caches guard their map with a single lock held across the whole lookup-or-insert,
//! so racing workers never insert the same key twice.
//! Neither cache evicts: the number of entries is bounded by the distinct colors
//! (or distinct palettes) seen during one run.

use crate::color::{rgb_key, Color, HslPoint, Palette};
use parking_lot::Mutex;
use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};

/// Lookup counts for a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
	/// Lookups answered from the cache
	pub hits: u64,
	/// Lookups that had to compute the value
	pub misses: u64,
}

/// Hit and miss counters updated outside of the cache lock
#[derive(Debug, Default)]
struct Counters {
	/// Number of hits
	hits: AtomicU64,
	/// Number of misses
	misses: AtomicU64,
}

impl Counters {
	/// Record a lookup
	fn record(&self, hit: bool) {
		let counter = if hit { &self.hits } else { &self.misses };
		counter.fetch_add(1, Ordering::Relaxed);
	}

	/// Snapshot the current counts
	fn stats(&self) -> CacheStats {
		CacheStats {
			hits: self.hits.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
		}
	}
}

/// Memoizes RGB to HSL conversions, keyed by the packed RGB bytes
#[derive(Debug, Default)]
pub struct ColorCache {
	/// Packed RGB -> HSL
	points: Mutex<HashMap<u32, HslPoint>>,
	/// Lookup counts
	counters: Counters,
}

impl ColorCache {
	/// Create a cache with room for `capacity` colors before reallocating
	#[must_use]
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			points: Mutex::new(HashMap::with_capacity(capacity)),
			counters: Counters::default(),
		}
	}

	/// Get the HSL point for `color`, converting it on the first lookup
	///
	/// Alpha is not part of the key.
	pub fn get(&self, color: Color) -> HslPoint {
		let key = rgb_key(color);
		let mut points = self.points.lock();
		let mut hit = true;
		let point = *points.entry(key).or_insert_with(|| {
			hit = false;
			HslPoint::from_color(color)
		});
		drop(points);

		self.counters.record(hit);
		point
	}

	/// Number of cached colors
	#[must_use]
	pub fn len(&self) -> usize {
		self.points.lock().len()
	}

	/// Whether nothing has been cached yet
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.points.lock().is_empty()
	}

	/// Hit and miss counts so far
	#[must_use]
	pub fn stats(&self) -> CacheStats {
		self.counters.stats()
	}
}

/// Memoizes palette to vector conversions, keyed by the palette's RGB bytes in order
///
/// The vector is `[r0, g0, b0, r1, g1, b1, ...]` with every channel scaled to `0.0..=1.0`.
#[derive(Debug, Default)]
pub struct PaletteCache {
	/// RGB bytes of each color in order -> flattened vector
	vectors: Mutex<HashMap<Box<[u8]>, Arc<[f64]>>>,
	/// Lookup counts
	counters: Counters,
}

impl PaletteCache {
	/// Create a cache with room for `capacity` palettes before reallocating
	#[must_use]
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			vectors: Mutex::new(HashMap::with_capacity(capacity)),
			counters: Counters::default(),
		}
	}

	/// The cache key for `palette`
	fn key(palette: &Palette) -> Box<[u8]> {
		palette
			.iter()
			.flat_map(|color| [color.red, color.green, color.blue])
			.collect()
	}

	/// Get the flattened vector for `palette`, computing it on the first lookup
	pub fn get(&self, palette: &Palette) -> Arc<[f64]> {
		let key = Self::key(palette);
		let mut vectors = self.vectors.lock();
		let mut hit = true;
		let vector = Arc::clone(vectors.entry(key).or_insert_with_key(|key| {
			hit = false;
			let max = f64::from(u8::MAX);
			key.iter().map(|&channel| f64::from(channel) / max).collect()
		}));
		drop(vectors);

		self.counters.record(hit);
		vector
	}

	/// Number of cached palettes
	#[must_use]
	pub fn len(&self) -> usize {
		self.vectors.lock().len()
	}

	/// Whether nothing has been cached yet
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.vectors.lock().is_empty()
	}

	/// Hit and miss counts so far
	#[must_use]
	pub fn stats(&self) -> CacheStats {
		self.counters.stats()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::color::rgb;
	use palette::Srgba;

	#[test]
	fn color_cache_is_idempotent() {
		let cache = ColorCache::default();
		let first = cache.get(rgb(10, 200, 30));
		let second = cache.get(rgb(10, 200, 30));

		assert_eq!(first, second);
		assert_eq!(first, HslPoint::from_color(rgb(10, 200, 30)));
		assert_eq!(cache.len(), 1);
		assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
	}

	#[test]
	fn color_cache_ignores_alpha() {
		let cache = ColorCache::default();
		let opaque = cache.get(rgb(1, 2, 3));
		let clear = cache.get(Srgba::new(1, 2, 3, 0));

		assert_eq!(opaque, clear);
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn color_cache_concurrent_lookups_match_pure_conversion() {
		let cache = ColorCache::with_capacity(4);
		let keys = [rgb(255, 0, 0), rgb(0, 128, 255), rgb(17, 17, 17), rgb(250, 240, 5)];

		std::thread::scope(|scope| {
			for t in 0..8 {
				let cache = &cache;
				scope.spawn(move || {
					for i in 0..2000 {
						let color = keys[(i + t) % keys.len()];
						assert_eq!(cache.get(color), HslPoint::from_color(color));
					}
				});
			}
		});

		assert_eq!(cache.len(), keys.len());
		let stats = cache.stats();
		assert_eq!(stats.hits + stats.misses, 8 * 2000);
		assert_eq!(stats.misses, 4);
	}

	#[test]
	fn palette_cache_vector_layout() {
		let cache = PaletteCache::default();
		let palette = Palette::new(vec![rgb(255, 0, 51), rgb(0, 255, 0)]);
		let vector = cache.get(&palette);

		assert_eq!(&*vector, &[1.0, 0.0, 0.2, 0.0, 1.0, 0.0]);
	}

	#[test]
	fn palette_cache_is_idempotent_and_order_sensitive() {
		let cache = PaletteCache::with_capacity(2);
		let ab = Palette::new(vec![rgb(1, 2, 3), rgb(4, 5, 6)]);
		let ba = Palette::new(vec![rgb(4, 5, 6), rgb(1, 2, 3)]);

		let first = cache.get(&ab);
		let second = cache.get(&ab);
		assert!(Arc::ptr_eq(&first, &second));

		let reversed = cache.get(&ba);
		assert_ne!(first, reversed);
		assert_eq!(cache.len(), 2);
		assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 2 });
	}
}
