//! Provides the implementation for (sort) k-means over weighted `f64` vectors
//!
//! The same engine clusters the distinct pixel colors of one image (3 dimensions)
//! and the palettes of many images (`3 * k` dimensions).
//! Starting centers are chosen with k-means++ and each iteration uses the sorted
//! center distances to skip centers that cannot be closer than the current one.

use crate::error::ClusteringError;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

/// Distance between two points of the same dimensionality
pub trait Distance {
	/// Squared distance
	fn squared_distance(x: &[f64], y: &[f64]) -> f64;
}

/// Regular Euclidean distance
#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl Distance for Euclidean {
	fn squared_distance(x: &[f64], y: &[f64]) -> f64 {
		x.iter().zip(y).map(|(a, b)| (a - b) * (a - b)).sum()
	}
}

/// Parameters shared by every k-means run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KmeansOptions {
	/// Number of times to run k-means, keeping the trial with the lowest variance
	///
	/// A value of `0` is treated as `1`.
	pub trials: u32,
	/// Maximum number of iterations for each trial
	///
	/// Trials stop earlier once no point changes its center.
	pub max_iter: u32,
	/// Seed for choosing the starting centers
	pub seed: u64,
}

impl Default for KmeansOptions {
	fn default() -> Self {
		Self { trials: 4, max_iter: 256, seed: 0 }
	}
}

/// Weighted points with a fixed number of dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
	/// Point components, `dim` values per point
	values: Vec<f64>,
	/// Weight of each point
	counts: Vec<u32>,
	/// Number of dimensions
	dim: usize,
}

impl Dataset {
	/// Create an empty dataset of points with `dim` dimensions
	#[must_use]
	pub const fn new(dim: usize) -> Self {
		Self { values: Vec::new(), counts: Vec::new(), dim }
	}

	/// Create an empty dataset with room for `capacity` points
	#[must_use]
	pub fn with_capacity(dim: usize, capacity: usize) -> Self {
		Self {
			values: Vec::with_capacity(dim * capacity),
			counts: Vec::with_capacity(capacity),
			dim,
		}
	}

	/// Create a dataset where each point has a weight of `1`
	///
	/// # Errors
	/// Returns an error if the points do not share the same dimensions or contain non-finite values.
	pub fn from_points<P: AsRef<[f64]>>(points: &[P]) -> Result<Self, ClusteringError> {
		let dim = points.first().map_or(0, |p| p.as_ref().len());
		let mut data = Self::with_capacity(dim, points.len());
		for point in points {
			data.push(point.as_ref(), 1)?;
		}
		Ok(data)
	}

	/// Add a point with the given weight
	///
	/// # Errors
	/// Returns an error if `point` does not have `dim` dimensions or contains a non-finite value.
	pub fn push(&mut self, point: &[f64], count: u32) -> Result<(), ClusteringError> {
		if point.len() != self.dim {
			return Err(ClusteringError::DimensionMismatch { expected: self.dim, found: point.len() });
		}
		if !point.iter().all(|x| x.is_finite()) {
			return Err(ClusteringError::NonFinite);
		}

		self.values.extend_from_slice(point);
		self.counts.push(count);
		Ok(())
	}

	/// Number of points
	#[must_use]
	pub fn len(&self) -> usize {
		self.counts.len()
	}

	/// Whether there are no points
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.counts.is_empty()
	}

	/// Number of dimensions
	#[must_use]
	pub const fn dim(&self) -> usize {
		self.dim
	}

	/// The `i`-th point
	#[must_use]
	pub fn point(&self, i: usize) -> &[f64] {
		&self.values[(i * self.dim)..((i + 1) * self.dim)]
	}

	/// The weight of each point
	#[must_use]
	pub fn counts(&self) -> &[u32] {
		&self.counts
	}

	/// Sum of all weights
	#[must_use]
	pub fn total_count(&self) -> u64 {
		self.counts.iter().copied().map(u64::from).sum()
	}
}

/// Bookkeeping for each k-means data point
struct PointData {
	/// Center assignment for this data point
	assignment: Vec<usize>,
	/// Squared distance to the closest chosen center, used to weight the picks in k-means++
	weight: Vec<f64>,
}

impl PointData {
	/// Create a [`PointData`] with the given number data points
	fn new(n: usize) -> Self {
		Self {
			assignment: vec![0; n],
			weight: vec![f64::INFINITY; n],
		}
	}

	/// Reset data for the next k-means trial
	fn reset(&mut self) {
		self.assignment.fill(0);
		self.weight.fill(f64::INFINITY);
	}
}

/// Data for each center/centroid
struct CenterData {
	/// Number of dimensions
	dim: usize,
	/// The centroid points, `dim` values per center
	centroid: Vec<f64>,
	/// Weighted vector sum for all data points in each center
	sum: Vec<f64>,
	/// Total weight of the points in each center
	count: Vec<u64>,
}

impl CenterData {
	/// Create a [`CenterData`] with the given number of centers
	fn new(k: usize, dim: usize) -> Self {
		Self {
			dim,
			centroid: Vec::with_capacity(k * dim),
			sum: vec![0.0; k * dim],
			count: vec![0; k],
		}
	}

	/// Number of centers chosen by k-means++
	fn len(&self) -> usize {
		self.centroid.len() / self.dim
	}

	/// The `i`-th centroid
	fn centroid(&self, i: usize) -> &[f64] {
		&self.centroid[(i * self.dim)..((i + 1) * self.dim)]
	}

	/// Reset data for the next k-means trial
	fn reset(&mut self) {
		self.centroid.clear();
		self.sum.fill(0.0);
		self.count.fill(0);
	}
}

/// Holds all the state used by k-means
struct KmeansState {
	/// Data for each center
	centers: CenterData,
	/// One fourth of the squared distance between each pairs of centers
	distances: Vec<(usize, f64)>,
	/// Data for each point
	points: PointData,
}

impl KmeansState {
	/// Initialize a new [`KmeansState`] with `k` centers for the points in `data`
	fn new(k: usize, data: &Dataset) -> Self {
		Self {
			centers: CenterData::new(k, data.dim),
			distances: vec![(0, 0.0); k * k],
			points: PointData::new(data.len()),
		}
	}
}

/// Result from running k-means
#[derive(Debug, Clone, PartialEq)]
pub struct KmeansResult {
	/// Weighted sum of squared distances from each point to its centroid
	///
	/// A lower variance indicates a tighter clustering.
	pub variance: f64,
	/// Final centroids of the centers chosen by k-means++
	///
	/// There may be fewer than `k` if the input had fewer than `k` distinct points.
	pub centroids: Vec<Vec<f64>>,
	/// Total weight in each of the `k` clusters; zero for clusters that ended up empty
	pub counts: Vec<u64>,
	/// The cluster of each input point, in `0..centroids.len()`
	pub assignments: Vec<usize>,
	/// Number of elapsed iterations
	pub iterations: u32,
}

/// Choose the starting centroids using the k-means++ algorithm
///
/// Stops early if every remaining point exactly matches a chosen centroid.
///
/// # Errors
/// Fails if the weighted squared distances overflow to infinity.
fn kmeans_plus_plus<D: Distance>(
	k: usize,
	rng: &mut impl Rng,
	data: &Dataset,
	centroids: &mut Vec<f64>,
	weights: &mut [f64],
) -> Result<(), ClusteringError> {
	use rand::distributions::{Distribution, WeightedError, WeightedIndex};

	// Pick the first centroid with a probability based off the point counts
	let sampler = WeightedIndex::new(data.counts.iter().map(|&n| f64::from(n)))
		.map_err(|_| ClusteringError::TooFewPoints { clusters: k, points: data.total_count() })?;
	centroids.extend_from_slice(data.point(sampler.sample(rng)));

	// Pick each next centroid with a weighted probability based off the squared distance to its closest centroid
	for i in 1..k {
		let centroid = &centroids[((i - 1) * data.dim)..(i * data.dim)];
		for (j, weight) in weights.iter_mut().enumerate() {
			*weight = f64::min(*weight, D::squared_distance(data.point(j), centroid));
		}

		let picks = || weights.iter().zip(&data.counts).map(|(&weight, &n)| weight * f64::from(n));

		// The sampler panics on an infinite total
		if !picks().sum::<f64>().is_finite() {
			return Err(ClusteringError::NonFinite);
		}

		match WeightedIndex::new(picks()) {
			Ok(sampler) => centroids.extend_from_slice(data.point(sampler.sample(rng))),
			Err(WeightedError::AllWeightsZero) => return Ok(()), // all points exactly match a centroid
			Err(WeightedError::NoItem) => return Err(ClusteringError::EmptyInput),
			Err(WeightedError::InvalidWeight | WeightedError::TooMany) => return Err(ClusteringError::NonFinite),
		}
	}

	Ok(())
}

/// Initializes the center sums and counts based off the initial assignments
fn compute_initial_sums(data: &Dataset, centers: &mut CenterData, assignment: &[usize]) {
	let dim = data.dim;
	for (i, &center) in assignment.iter().enumerate() {
		let n = data.counts[i];
		let nf = f64::from(n);
		let sum = &mut centers.sum[(center * dim)..((center + 1) * dim)];
		for (s, &x) in sum.iter_mut().zip(data.point(i)) {
			*s += nf * x;
		}
		centers.count[center] += u64::from(n);
	}
}

/// For each pair of centers, update their distances and sort each center's row by increasing distance
fn update_distances<D: Distance>(centers: &CenterData, distances: &mut [(usize, f64)]) {
	let k = centers.len();
	let distances = &mut distances[..(k * k)];
	for i in 0..k {
		let ci = centers.centroid(i);
		distances[i * k + i] = (i, 0.0);
		for j in (i + 1)..k {
			let dist = D::squared_distance(ci, centers.centroid(j)) / 4.0;
			distances[j * k + i] = (i, dist);
			distances[i * k + j] = (j, dist);
		}
	}

	for row in distances.chunks_exact_mut(k) {
		row.sort_by(|(_, x), (_, y)| f64::total_cmp(x, y));
	}
}

/// For each data point, update its assigned center, returning how many points moved
fn update_assignments<D: Distance>(
	data: &Dataset,
	centers: &mut CenterData,
	distances: &[(usize, f64)],
	points: &mut PointData,
) -> usize {
	let dim = data.dim;
	let k = centers.len();
	let mut moved = 0;

	for (i, center) in points.assignment.iter_mut().enumerate() {
		let point = data.point(i);
		let ci = *center;
		let dist = D::squared_distance(point, centers.centroid(ci));

		// Find the closest center
		let mut min_dist = dist;
		let mut min_center = ci;
		for &(other_center, quarter_dist) in &distances[(ci * k + 1)..((ci + 1) * k)] {
			if dist < quarter_dist {
				break;
			}

			let other_dist = D::squared_distance(point, centers.centroid(other_center));
			if other_dist < min_dist {
				min_dist = other_dist;
				min_center = other_center;
			}
		}

		// Move this point to its new center
		if min_center != ci {
			let n = data.counts[i];
			let nf = f64::from(n);

			for (d, &x) in point.iter().enumerate() {
				centers.sum[ci * dim + d] -= nf * x;
				centers.sum[min_center * dim + d] += nf * x;
			}
			centers.count[ci] -= u64::from(n);
			centers.count[min_center] += u64::from(n);

			*center = min_center;
			moved += 1;
		}
	}

	moved
}

/// For each center, update its centroid using the vector sums
///
/// Centers without any points keep their previous centroid.
fn update_centroids(centers: &mut CenterData) {
	let dim = centers.dim;
	let k = centers.len();
	for i in 0..k {
		let n = centers.count[i];
		if n == 0 {
			continue;
		}

		// counts are at most u32::MAX * number of points, well within f64 precision for averaging
		#[allow(clippy::cast_precision_loss)]
		let n = n as f64;
		for d in 0..dim {
			centers.centroid[i * dim + d] = centers.sum[i * dim + d] / n;
		}
	}
}

/// Run a trial of sort k-means
///
/// # Errors
/// Fails if distances between the points are not finite.
fn kmeans<D: Distance>(
	data: &Dataset,
	KmeansState { centers, distances, points }: &mut KmeansState,
	k: usize,
	max_iter: u32,
	seed: u64,
) -> Result<KmeansResult, ClusteringError> {
	let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
	if let Err(e) = kmeans_plus_plus::<D>(k, &mut rng, data, &mut centers.centroid, &mut points.weight) {
		centers.reset();
		points.reset();
		return Err(e);
	}
	compute_initial_sums(data, centers, &points.assignment);

	let mut iterations = 0;
	while iterations < max_iter {
		update_distances::<D>(centers, distances);
		let moved = update_assignments::<D>(data, centers, distances, points);
		update_centroids(centers);
		iterations += 1;

		if moved == 0 {
			break;
		}
	}

	let variance = points
		.assignment
		.iter()
		.enumerate()
		.map(|(i, &center)| {
			f64::from(data.counts[i]) * D::squared_distance(data.point(i), centers.centroid(center))
		})
		.sum();

	let centroids = (0..centers.len())
		.map(|i| centers.centroid(i).to_vec())
		.collect();

	let result = KmeansResult {
		variance,
		centroids,
		counts: centers.count.clone(),
		assignments: points.assignment.clone(),
		iterations,
	};

	centers.reset();
	points.reset();

	if result.variance.is_finite() {
		Ok(result)
	} else {
		Err(ClusteringError::NonFinite)
	}
}

/// Run multiple trials of k-means, taking the trial with the lowest variance
///
/// # Errors
/// Fails if `k` is `0`, `data` is empty or has zero dimensions,
/// the total weight of `data` is less than `k`,
/// or the points are so far apart that their squared distances are not finite.
pub fn run<D: Distance>(
	data: &Dataset,
	k: usize,
	options: &KmeansOptions,
) -> Result<KmeansResult, ClusteringError> {
	if k == 0 {
		return Err(ClusteringError::NoClusters);
	}
	if data.is_empty() || data.dim == 0 {
		return Err(ClusteringError::EmptyInput);
	}
	let total = data.total_count();
	if total < k as u64 {
		return Err(ClusteringError::TooFewPoints { clusters: k, points: total });
	}

	let mut state = KmeansState::new(k, data);
	let mut best = kmeans::<D>(data, &mut state, k, options.max_iter, options.seed)?;
	for i in 1..options.trials.max(1) {
		let result = kmeans::<D>(data, &mut state, k, options.max_iter, options.seed ^ u64::from(i))?;
		if result.variance < best.variance {
			best = result;
		}
	}

	Ok(best)
}
