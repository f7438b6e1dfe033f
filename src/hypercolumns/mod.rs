//! Hypercolumn extraction: pooling selected layer activations to a common
//! resolution and aggregating per-pixel feature rows into an out-of-core matrix.

pub mod aggregate;
pub mod pooler;
pub mod resize;
pub mod store;

pub use aggregate::{aggregate_hypercolumns, aggregate_to_file, matrix_shape};
pub use pooler::{extract_hypercolumns, feature_count, Hypercolumns};
pub use resize::resize_bilinear;
pub use store::{FeatureStore, InMemoryMatrix, MatrixHeader, MmapMatrix};
