//! Error types shared by training, extraction and clustering.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur anywhere in the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Input/label length mismatch: {inputs} samples but {labels} labels")]
    LengthMismatch { inputs: usize, labels: usize },

    #[error("Batch size must be greater than 0")]
    InvalidBatchSize,

    #[error("Dataset has {samples} samples, fewer than one batch of {batch_size}")]
    EmptyDataset { samples: usize, batch_size: usize },

    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Label {label} out of range for {num_classes} classes")]
    LabelOutOfRange { label: usize, num_classes: usize },

    #[error("Hypercolumn feature count mismatch: layers declare {expected}, extracted {actual}")]
    FeatureCountMismatch { expected: usize, actual: usize },

    #[error("Layer index {index} out of range for a network with {layers} layers")]
    LayerIndexOutOfRange { index: usize, layers: usize },

    #[error("Cannot normalize band {band}: degenerate range [{min}, {max}]")]
    DegenerateRange { band: usize, min: f32, max: f32 },

    #[error("Cannot normalize band {band}: non-finite value at index {index}")]
    NonFiniteInput { band: usize, index: usize },

    #[error("Unknown photometric band '{0}'")]
    UnknownBand(char),

    #[error("Training diverged at epoch {epoch}, batch {batch}: loss = {loss}")]
    Divergence { epoch: usize, batch: usize, loss: f32 },

    #[error(
        "Failed to allocate feature matrix '{path}' ({rows} x {cols}, {bytes} bytes): {source}"
    )]
    MatrixAllocation {
        path: PathBuf,
        rows: usize,
        cols: usize,
        bytes: u64,
        #[source]
        source: io::Error,
    },

    #[error("Feature matrix I/O failed on '{path}': {source}")]
    MatrixIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Rows [{start}, {end}) out of range for a matrix with {rows} rows")]
    RowRange { start: usize, end: usize, rows: usize },

    #[error("Checkpoint I/O failed on '{path}': {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Checkpoint '{path}' does not match the network: {reason}")]
    CheckpointMismatch { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid architecture: {0}")]
    InvalidArchitecture(String),

    #[error("Invalid clustering request: {0}")]
    InvalidClustering(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_message() {
        let err = Error::LengthMismatch {
            inputs: 10,
            labels: 9,
        };
        let msg = err.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("9"));
    }

    #[test]
    fn test_matrix_allocation_reports_shape() {
        let err = Error::MatrixAllocation {
            path: PathBuf::from("/tmp/hc.bin"),
            rows: 4096,
            cols: 1472,
            bytes: 4096 * 1472 * 4,
            source: io::Error::other("disk full"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/hc.bin"));
        assert!(msg.contains("4096 x 1472"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_degenerate_range_is_distinct() {
        let err = Error::DegenerateRange {
            band: 2,
            min: 1.0,
            max: 1.0,
        };
        assert!(matches!(err, Error::DegenerateRange { band: 2, .. }));
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error as StdError;

        let err = Error::Checkpoint {
            path: PathBuf::from("model.params"),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.source().is_some());
    }
}
