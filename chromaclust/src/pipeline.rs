//! The concurrent pipeline running extraction over many images and clustering the results
//!
//! Work flows through three bounded queues:
//!
//! 1. The calling thread submits image identifiers to the task queue.
//! 2. A pool of long-lived workers loads (or reloads) and extracts each image,
//!    sending the result to the aggregation thread.
//! 3. The aggregation thread forwards every result to the sink thread,
//!    and once all workers are done clusters the collected palettes.
//!
//! A full queue blocks its sender, so a slow sink eventually slows down extraction.

use crate::{
	cache::{ColorCache, PaletteCache},
	cluster::{ClusterOptions, PaletteClusterer},
	color::Palette,
	error::ClusteringError,
	extract::{ExtractOptions, PaletteExtractor},
	Error, Result,
};
use image::RgbaImage;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::{
	collections::BTreeMap,
	io,
	num::NonZeroUsize,
	sync::mpsc::{self, Receiver, SyncSender},
	thread,
};

/// Decode an encoded image (PNG, JPEG, etc.) into RGBA pixels
///
/// The supported formats depend on the enabled features of the `image` crate.
///
/// # Errors
/// Returns [`Error::Decode`] if the format is unknown or the data is invalid.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage> {
	Ok(image::load_from_memory(bytes)?.into_rgba8())
}

/// Provides the pixels for an image identifier
pub trait ImageSource: Sync {
	/// Load and decode the image
	///
	/// # Errors
	/// Any error is reported as a failure for this image only.
	fn load(&self, id: &str) -> Result<RgbaImage>;
}

impl<F> ImageSource for F
where
	F: Fn(&str) -> Result<RgbaImage> + Sync,
{
	fn load(&self, id: &str) -> Result<RgbaImage> {
		self(id)
	}
}

/// Persists palettes between runs
pub trait PaletteStore: Sync {
	/// A previously saved palette for the image, if any
	fn load(&self, id: &str) -> Option<Palette>;

	/// Save a freshly extracted palette
	///
	/// # Errors
	/// Failures are logged and otherwise ignored.
	fn save(&self, id: &str, palette: &Palette) -> io::Result<()>;
}

/// A [`PaletteStore`] that never has anything and discards every save
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStore;

impl PaletteStore for NoStore {
	fn load(&self, _: &str) -> Option<Palette> {
		None
	}

	fn save(&self, _: &str, _: &Palette) -> io::Result<()> {
		Ok(())
	}
}

/// Receives the results of a run
///
/// All calls happen on a single thread, in this order:
/// [`palette`](Self::palette) and [`failure`](Self::failure) once per image in completion order,
/// [`clusters`](Self::clusters) at most once, and finally [`finish`](Self::finish).
///
/// Errors are logged and do not stop the run.
pub trait PaletteSink: Send {
	/// An image's palette
	///
	/// # Errors
	/// Failures are logged and otherwise ignored.
	fn palette(&mut self, id: &str, palette: &Palette) -> io::Result<()>;

	/// An image that could not be loaded or extracted
	///
	/// # Errors
	/// Failures are logged and otherwise ignored.
	fn failure(&mut self, failure: &ImageFailure) -> io::Result<()> {
		let _ = failure;
		Ok(())
	}

	/// The clusters of every extracted image
	///
	/// # Errors
	/// Failures are logged and otherwise ignored.
	fn clusters(&mut self, report: &ClusterReport) -> io::Result<()> {
		let _ = report;
		Ok(())
	}

	/// Called once after every other event
	///
	/// # Errors
	/// Failures are logged and otherwise ignored.
	fn finish(&mut self) -> io::Result<()> {
		Ok(())
	}
}

/// An image that was skipped
#[derive(Debug)]
pub struct ImageFailure {
	/// Image identifier
	pub id: String,
	/// What went wrong
	pub error: Error,
}

/// An image's palette and cluster label
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPalette {
	/// Image identifier
	pub id: String,
	/// Cluster label, an index into [`ClusterReport::centroids`]
	pub label: usize,
	/// The image's palette
	pub palette: Palette,
}

/// The result of clustering every extracted palette
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterReport {
	/// The mean palette of each cluster
	pub centroids: Vec<Palette>,
	/// Every clustered image, sorted by identifier
	pub images: Vec<LabeledPalette>,
}

impl ClusterReport {
	/// Image identifier -> cluster label
	#[must_use]
	pub fn mapping(&self) -> BTreeMap<&str, usize> {
		self.images.iter().map(|image| (image.id.as_str(), image.label)).collect()
	}
}

/// Counts from a completed run
#[derive(Debug, Default)]
pub struct RunSummary {
	/// Number of freshly extracted palettes
	pub extracted: usize,
	/// Number of palettes reused from the store
	pub reused: usize,
	/// Skipped images, sorted by identifier
	pub failures: Vec<ImageFailure>,
}

/// Options for [`Pipeline`]
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
	/// Number of extraction workers
	///
	/// A value of `0` is treated as `1`.
	pub workers: usize,
	/// Capacity of the task queue, defaults to `workers`
	pub queue_capacity: Option<usize>,
	/// Capacity of the queue from the workers to the aggregation thread
	pub result_capacity: usize,
	/// Capacity of the queue from the aggregation thread to the sink
	pub sink_capacity: usize,
	/// Initial capacity of each cache
	pub cache_capacity: usize,
	/// Palette extraction parameters
	pub extract: ExtractOptions,
	/// Cluster the extracted palettes if set
	pub cluster: Option<ClusterOptions>,
}

impl Default for PipelineOptions {
	fn default() -> Self {
		Self {
			workers: thread::available_parallelism().map_or(1, NonZeroUsize::get),
			queue_capacity: None,
			result_capacity: 16,
			sink_capacity: 1024,
			cache_capacity: 512,
			extract: ExtractOptions::default(),
			cluster: None,
		}
	}
}

/// The outcome of processing one image
enum WorkerEvent {
	/// The image has a palette
	Palette {
		/// Image identifier
		id: String,
		/// Extracted or reloaded palette
		palette: Palette,
		/// Whether the palette came from the store
		reused: bool,
	},
	/// The image was skipped
	Failed(ImageFailure),
}

/// A call to make on the [`PaletteSink`]
enum SinkEvent {
	/// See [`PaletteSink::palette`]
	Palette(String, Palette),
	/// See [`PaletteSink::failure`]
	Failed(ImageFailure),
	/// See [`PaletteSink::clusters`]
	Clusters(ClusterReport),
}

/// Counts kept by the aggregation thread
#[derive(Debug, Default)]
struct Tally {
	/// Freshly extracted palettes
	extracted: usize,
	/// Reloaded palettes
	reused: usize,
}

/// Runs palette extraction and clustering over a batch of images
///
/// The caches live as long as the pipeline, so repeated runs reuse earlier conversions.
#[derive(Debug)]
pub struct Pipeline {
	/// Run parameters
	options: PipelineOptions,
	/// Shared by the extraction workers
	color_cache: ColorCache,
	/// Used by the clustering stage
	palette_cache: PaletteCache,
}

impl Pipeline {
	/// Create a pipeline with empty caches
	#[must_use]
	pub fn new(options: PipelineOptions) -> Self {
		Self {
			color_cache: ColorCache::with_capacity(options.cache_capacity),
			palette_cache: PaletteCache::with_capacity(options.cache_capacity),
			options,
		}
	}

	/// The options given to [`Pipeline::new`]
	#[must_use]
	pub const fn options(&self) -> &PipelineOptions {
		&self.options
	}

	/// The RGB -> HSL cache
	#[must_use]
	pub const fn color_cache(&self) -> &ColorCache {
		&self.color_cache
	}

	/// The palette -> vector cache
	#[must_use]
	pub const fn palette_cache(&self) -> &PaletteCache {
		&self.palette_cache
	}

	/// Extract the palette of every image, then cluster them if clustering is enabled
	///
	/// Images that fail to load or extract are skipped and reported to the sink and in the summary.
	/// The sink's [`finish`](PaletteSink::finish) is always called before this returns,
	/// unless the worker pool or threads could not be started.
	///
	/// # Errors
	/// Fails if the worker pool or a thread cannot be started,
	/// or if clustering the palettes fails (e.g., fewer images than clusters).
	pub fn run<S, P, K>(&self, ids: &[impl AsRef<str>], source: &S, store: &P, sink: &mut K) -> Result<RunSummary>
	where
		S: ImageSource + ?Sized,
		P: PaletteStore + ?Sized,
		K: PaletteSink + ?Sized,
	{
		let workers = self.options.workers.max(1);
		let pool = rayon::ThreadPoolBuilder::new()
			.num_threads(workers)
			.thread_name(|i| format!("chromaclust-worker-{i}"))
			.build()?;

		let (task_tx, task_rx) = mpsc::sync_channel::<String>(self.options.queue_capacity.unwrap_or(workers));
		let (result_tx, result_rx) = mpsc::sync_channel(self.options.result_capacity);
		let (sink_tx, sink_rx) = mpsc::sync_channel(self.options.sink_capacity);
		let tasks = Mutex::new(task_rx);

		let (tally, failures) = thread::scope(|scope| {
			let sink_thread = thread::Builder::new()
				.name("chromaclust-sink".to_owned())
				.spawn_scoped(scope, move || drain(sink_rx, sink))?;

			let aggregator = thread::Builder::new()
				.name("chromaclust-aggregate".to_owned())
				.spawn_scoped(scope, move || self.aggregate(result_rx, &sink_tx))?;

			pool.in_place_scope(|pool_scope| {
				for _ in 0..workers {
					let results = result_tx.clone();
					let tasks = &tasks;
					pool_scope.spawn(move |_| self.work(tasks, &results, source, store));
				}

				submit(ids, task_tx);
			});

			// Every worker has exited, so this closes the result queue
			drop(result_tx);

			let tally = join(aggregator);
			let failures = join(sink_thread);
			Ok::<_, Error>((tally, failures))
		})?;

		let cache = self.color_cache.stats();
		debug!("color cache: {} hits, {} misses", cache.hits, cache.misses);

		let tally = tally?;
		info!(
			"extracted {} palettes, reused {}, skipped {}",
			tally.extracted,
			tally.reused,
			failures.len()
		);

		Ok(RunSummary { extracted: tally.extracted, reused: tally.reused, failures })
	}

	/// Process images until the task queue is closed
	fn work<S, P>(&self, tasks: &Mutex<Receiver<String>>, results: &SyncSender<WorkerEvent>, source: &S, store: &P)
	where
		S: ImageSource + ?Sized,
		P: PaletteStore + ?Sized,
	{
		loop {
			let task = tasks.lock().recv();
			let Ok(id) = task else {
				break;
			};

			let event = self.process(id, source, store);
			if results.send(event).is_err() {
				break;
			}
		}
	}

	/// Reload or extract the palette of one image
	fn process<S, P>(&self, id: String, source: &S, store: &P) -> WorkerEvent
	where
		S: ImageSource + ?Sized,
		P: PaletteStore + ?Sized,
	{
		let k = self.options.extract.k;

		if let Some(palette) = store.load(&id) {
			if palette.len() == k {
				debug!("reusing the stored palette for {id}");
				return WorkerEvent::Palette { id, palette: palette.into_canonical(), reused: true };
			}
			debug!("stored palette for {id} has {} colors instead of {k}, extracting again", palette.len());
		}

		let extractor = PaletteExtractor::new(&self.color_cache, &self.options.extract);
		match source.load(&id).and_then(|image| extractor.extract(&image)) {
			Ok(palette) => {
				debug!("extracted the palette for {id}");
				if let Err(e) = store.save(&id, &palette) {
					warn!("failed to save the palette for {id}: {e}");
				}
				WorkerEvent::Palette { id, palette, reused: false }
			}
			Err(error) => {
				warn!("skipping {id}: {error}");
				WorkerEvent::Failed(ImageFailure { id, error })
			}
		}
	}

	/// Forward results to the sink, then cluster them once every worker is done
	fn aggregate(&self, results: Receiver<WorkerEvent>, events: &SyncSender<SinkEvent>) -> Result<Tally> {
		let mut tally = Tally::default();
		let mut palettes = Vec::new();

		for event in results {
			match event {
				WorkerEvent::Palette { id, palette, reused } => {
					if reused {
						tally.reused += 1;
					} else {
						tally.extracted += 1;
					}
					if self.options.cluster.is_some() {
						palettes.push((id.clone(), palette.clone()));
					}
					forward(events, SinkEvent::Palette(id, palette));
				}
				WorkerEvent::Failed(failure) => forward(events, SinkEvent::Failed(failure)),
			}
		}

		if let Some(options) = &self.options.cluster {
			match self.cluster(palettes, options) {
				Ok(report) => forward(events, SinkEvent::Clusters(report)),
				Err(e) => {
					error!("failed to cluster the palettes: {e}");
					return Err(e.into());
				}
			}
		}

		Ok(tally)
	}

	/// Cluster the palettes of every image
	fn cluster(
		&self,
		mut palettes: Vec<(String, Palette)>,
		options: &ClusterOptions,
	) -> Result<ClusterReport, ClusteringError> {
		// Completion order varies between runs
		palettes.sort_by(|(x, _), (y, _)| x.cmp(y));
		let (ids, palettes): (Vec<_>, Vec<_>) = palettes.into_iter().unzip();

		info!("clustering {} palettes into {} groups", palettes.len(), options.n);
		let clusters = PaletteClusterer::new(&self.palette_cache, options).cluster(&palettes)?;

		let images = ids
			.into_iter()
			.zip(palettes)
			.zip(clusters.labels)
			.map(|((id, palette), label)| LabeledPalette { id, label, palette })
			.collect();

		Ok(ClusterReport { centroids: clusters.centroids, images })
	}
}

/// Feed the task queue, logging progress
///
/// The queue is closed on return.
#[allow(clippy::needless_pass_by_value)]
fn submit(ids: &[impl AsRef<str>], tasks: SyncSender<String>) {
	let total = ids.len();
	for (i, id) in ids.iter().enumerate() {
		let done = i + 1;
		info!("image {done}/{total} ({}%)", done * 100 / total);
		if tasks.send(id.as_ref().to_owned()).is_err() {
			break;
		}
	}
}

/// Send an event to the sink thread
fn forward(events: &SyncSender<SinkEvent>, event: SinkEvent) {
	// The sink thread only stops early if it panicked, which `join` reports
	let _ = events.send(event);
}

/// Make every sink call, returning the failures seen
fn drain<K: PaletteSink + ?Sized>(events: Receiver<SinkEvent>, sink: &mut K) -> Vec<ImageFailure> {
	let mut failures = Vec::new();

	for event in events {
		let result = match &event {
			SinkEvent::Palette(id, palette) => sink.palette(id, palette),
			SinkEvent::Failed(failure) => sink.failure(failure),
			SinkEvent::Clusters(report) => sink.clusters(report),
		};
		if let Err(e) = result {
			error!("failed to write output: {e}");
		}
		if let SinkEvent::Failed(failure) = event {
			failures.push(failure);
		}
	}

	if let Err(e) = sink.finish() {
		error!("failed to finish output: {e}");
	}

	failures.sort_by(|x, y| x.id.cmp(&y.id));
	failures
}

/// Wait for a scoped thread, resuming its panic if it had one
fn join<T>(handle: thread::ScopedJoinHandle<'_, T>) -> T {
	match handle.join() {
		Ok(value) => value,
		Err(payload) => std::panic::resume_unwind(payload),
	}
}
