use chromaclust::{
	ClusterOptions, ColorCache, ExtractOptions, KmeansOptions, NoStore, Palette, PaletteCache, PaletteClusterer,
	PaletteExtractor, PaletteSink, Pipeline, PipelineOptions,
};
use criterion::{
	black_box, criterion_group, criterion_main, measurement::WallTime, BenchmarkGroup, BenchmarkId, Criterion,
	SamplingMode,
};
use image::{Rgba, RgbaImage};
use std::{collections::HashMap, time::Duration};

/// Deterministic noisy gradients standing in for photographs
fn synthetic_images() -> Vec<(String, RgbaImage)> {
	[(160, 90, 1), (480, 270, 7), (960, 540, 13)]
		.into_iter()
		.map(|(width, height, seed): (u32, u32, u32)| {
			let image = RgbaImage::from_fn(width, height, |x, y| {
				let noise = (x.wrapping_mul(2654435761) ^ y.wrapping_mul(40503) ^ seed).rotate_left(seed) % 48;
				#[allow(clippy::cast_possible_truncation)]
				Rgba([
					((x * 255 / width + noise) % 256) as u8,
					((y * 255 / height + noise) % 256) as u8,
					(((x + y) * 128 / (width + height) + seed * 16) % 256) as u8,
					255,
				])
			});
			(format!("{width}x{height}"), image)
		})
		.collect()
}

fn create_group<'a>(c: &'a mut Criterion, name: &'a str) -> BenchmarkGroup<'a, WallTime> {
	let mut group = c.benchmark_group(name);
	group
		.sample_size(30)
		.noise_threshold(0.05)
		.sampling_mode(SamplingMode::Flat)
		.warm_up_time(Duration::from_millis(500));
	group
}

fn conversion(c: &mut Criterion) {
	let mut group = create_group(c, "conversion");

	for (name, image) in synthetic_images() {
		let pixels: &[chromaclust::Color] = palette::cast::from_component_slice(image.as_raw());

		group.bench_with_input(BenchmarkId::new("rgb_to_hsl", &name), pixels, |b, pixels| {
			b.iter(|| {
				for color in pixels {
					black_box(chromaclust::rgb_to_hsl(color.red, color.green, color.blue));
				}
			});
		});

		group.bench_with_input(BenchmarkId::new("cached", &name), pixels, |b, pixels| {
			let cache = ColorCache::default();
			b.iter(|| {
				for &color in pixels {
					black_box(cache.get(color));
				}
			});
		});
	}
}

fn extract(c: &mut Criterion) {
	let mut group = create_group(c, "extract");
	let images = synthetic_images();

	fn bench(name: &str, group: &mut BenchmarkGroup<WallTime>, images: &[(String, RgbaImage)], k: usize) {
		let options = ExtractOptions {
			k,
			kmeans: KmeansOptions { trials: 1, ..Default::default() },
			..Default::default()
		};
		for (path, image) in images {
			group.bench_with_input(BenchmarkId::new(name, path), image, |b, image| {
				let cache = ColorCache::default();
				let extractor = PaletteExtractor::new(&cache, &options);
				b.iter(|| extractor.extract(black_box(image)));
			});
		}
	}

	group.measurement_time(Duration::from_secs(2));
	bench("default", &mut group, &images, 8);
	bench("low k", &mut group, &images, 4);

	group.measurement_time(Duration::from_secs(4));
	bench("high k", &mut group, &images, 32);
}

fn cluster(c: &mut Criterion) {
	let mut group = create_group(c, "cluster");

	let images = synthetic_images();
	let cache = ColorCache::default();
	let extract = ExtractOptions { k: 4, ..Default::default() };
	let extractor = PaletteExtractor::new(&cache, &extract);

	// Vary one image by rotating its channels to get many distinct palettes
	let palettes = (0..64)
		.map(|i| {
			let (_, image) = &images[i % images.len()];
			let mut image = image.clone();
			for pixel in image.pixels_mut() {
				pixel.0[..3].rotate_left(i % 3);
				#[allow(clippy::cast_possible_truncation)]
				{
					pixel.0[2] = pixel.0[2].wrapping_add(i as u8);
				}
			}
			extractor.extract(&image).expect("enough pixels")
		})
		.collect::<Vec<Palette>>();

	for n in [2, 5, 16] {
		let options = ClusterOptions { n, ..Default::default() };
		group.bench_with_input(BenchmarkId::new("palettes", n), &palettes, |b, palettes| {
			let cache = PaletteCache::default();
			let clusterer = PaletteClusterer::new(&cache, &options);
			b.iter(|| clusterer.cluster(black_box(palettes)));
		});
	}
}

/// Discards every result
struct Discard;

impl PaletteSink for Discard {
	fn palette(&mut self, _: &str, palette: &Palette) -> std::io::Result<()> {
		black_box(palette);
		Ok(())
	}
}

fn pipeline(c: &mut Criterion) {
	let mut group = create_group(c, "pipeline");
	group.measurement_time(Duration::from_secs(8));

	let images = synthetic_images().into_iter().cycle().take(24).enumerate();
	let images = images.map(|(i, (name, image))| (format!("{i}-{name}"), image)).collect::<HashMap<_, _>>();
	let mut ids = images.keys().cloned().collect::<Vec<_>>();
	ids.sort();

	let source = |id: &str| -> chromaclust::Result<RgbaImage> {
		images
			.get(id)
			.cloned()
			.ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound).into())
	};

	for workers in [1, 4] {
		group.bench_with_input(BenchmarkId::new("workers", workers), &ids, |b, ids| {
			b.iter(|| {
				let options = PipelineOptions {
					workers,
					extract: ExtractOptions { k: 4, ..Default::default() },
					cluster: Some(ClusterOptions { n: 3, ..Default::default() }),
					..Default::default()
				};
				Pipeline::new(options).run(ids, &source, &NoStore, &mut Discard)
			});
		});
	}
}

criterion_group!(benches, conversion, extract, cluster, pipeline);
criterion_main!(benches);
