//! Error types shared by every stage of the engine

use thiserror::Error;

/// Reasons the k-means primitive cannot produce a valid partition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusteringError {
	/// Zero clusters were requested
	#[error("the number of clusters must be at least 1")]
	NoClusters,
	/// There were no points to cluster
	#[error("there are no points to cluster")]
	EmptyInput,
	/// More clusters were requested than there are (weighted) input points
	#[error("cannot make {clusters} clusters out of {points} points")]
	TooFewPoints {
		/// Requested number of clusters
		clusters: usize,
		/// Total weight of the input points
		points: u64,
	},
	/// Points do not all share the same dimensionality
	#[error("expected points with {expected} dimensions but found one with {found}")]
	DimensionMismatch {
		/// Dimensionality of the first point
		expected: usize,
		/// Dimensionality of the offending point
		found: usize,
	},
	/// A point contained a NaN or infinite component, or distances between points overflowed
	#[error("points must only contain finite values with finite distances between them")]
	NonFinite,
	/// A channel weight was negative, too large, or not a number
	#[error("channel weights must be between 0 and 1e6")]
	InvalidWeights,
}

/// Errors produced by the engine and its collaborators
#[derive(Debug, Error)]
pub enum Error {
	/// The image bytes could not be decoded
	#[error("failed to decode image: {0}")]
	Decode(#[from] image::ImageError),
	/// The image could not be read
	#[error("failed to read image: {0}")]
	Io(#[from] std::io::Error),
	/// An external image source failed in its own way
	#[error("failed to load image: {0}")]
	Source(#[source] Box<dyn std::error::Error + Send + Sync>),
	/// k-means could not partition the input
	#[error("clustering failed: {0}")]
	Clustering(#[from] ClusteringError),
	/// A string was not a `#rrggbb` or `#rrggbbaa` color
	#[error("invalid hex color {0:?}")]
	InvalidHex(String),
	/// The extraction worker pool could not be started
	#[error("failed to build the worker pool: {0}")]
	ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result alias using the crate [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;
