//! Aggregation of per-pixel hypercolumns into one `(size² · N, F)` matrix
//!
//! Row `size² · i + p` holds pixel `p` (raster order) of sample `i`.

use super::pooler::{extract_hypercolumns, feature_count};
use super::store::{FeatureStore, MmapMatrix};
use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::network::Network;
use crate::utils::progress_bar;
use std::path::Path;

/// `(rows, cols)` of the matrix holding every pixel of `dataset`.
pub fn matrix_shape(network: &Network, layer_indices: &[usize], dataset: &Dataset) -> Result<(usize, usize)> {
    let pixels = dataset.size() * dataset.size();
    Ok((pixels * dataset.len(), feature_count(network, layer_indices)?))
}

/// Pools every sample of `dataset` in order and writes its pixel rows into `store`.
///
/// The store must already have the shape returned by [`matrix_shape`]. It is
/// flushed once all samples are written.
pub fn aggregate_hypercolumns<S: FeatureStore + ?Sized>(
    network: &Network,
    layer_indices: &[usize],
    dataset: &Dataset,
    store: &mut S,
) -> Result<()> {
    let (rows, cols) = matrix_shape(network, layer_indices, dataset)?;
    if (store.rows(), store.cols()) != (rows, cols) {
        return Err(Error::ShapeMismatch {
            context: "feature matrix",
            expected: vec![rows, cols],
            actual: vec![store.rows(), store.cols()],
        });
    }

    let size = dataset.size();
    let pixels = size * size;
    let progress = progress_bar(dataset.len() as u64, "hypercolumns");

    for index in 0..dataset.len() {
        let hypercolumns = extract_hypercolumns(network, layer_indices, dataset.sample(index), size)?;
        store.write_rows(pixels * index, &hypercolumns.to_pixel_rows())?;
        progress.inc(1);
    }
    progress.finish_and_clear();

    store.flush()?;
    log::info!(
        "Aggregated {} samples into a {} x {} feature matrix",
        dataset.len(),
        rows,
        cols
    );
    Ok(())
}

/// Allocates a memory-mapped matrix at `path` and aggregates into it.
pub fn aggregate_to_file(
    network: &Network,
    layer_indices: &[usize],
    dataset: &Dataset,
    path: impl AsRef<Path>,
) -> Result<MmapMatrix> {
    let (rows, cols) = matrix_shape(network, layer_indices, dataset)?;
    let mut matrix = MmapMatrix::create(path, rows, cols)?;
    aggregate_hypercolumns(network, layer_indices, dataset, &mut matrix)?;
    Ok(matrix)
}
