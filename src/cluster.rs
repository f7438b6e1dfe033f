//! Mini-batch k-means over a row store
//!
//! Rows are streamed from the store in contiguous chunks, so the matrix never
//! has to be resident. Fitting only moves centres; per-row labels are left to
//! a separate pass with [`ClusterModel::nearest`].

use crate::error::{Error, Result};
use crate::hypercolumns::FeatureStore;
use crate::utils::{progress_bar, SimpleRng};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Rows drawn per centre for the k-means++ seeding sample.
const INIT_ROWS_PER_CLUSTER: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiniBatchKMeans {
    pub n_clusters: usize,
    /// Rows per update chunk.
    pub batch_size: usize,
    /// Maximum number of full passes over the store.
    pub max_iter: usize,
    /// Largest centre shift (Euclidean) below which a pass counts as converged.
    pub tol: f32,
    pub seed: Option<u64>,
}

impl MiniBatchKMeans {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            batch_size: 1024,
            max_iter: 100,
            tol: 1e-4,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn fit<S: FeatureStore + ?Sized>(&self, store: &S) -> Result<ClusterModel> {
        let rows = store.rows();
        let cols = store.cols();
        if self.n_clusters == 0 || self.batch_size == 0 || self.max_iter == 0 {
            return Err(Error::InvalidClustering(format!(
                "n_clusters, batch_size and max_iter must be positive (got {}, {}, {})",
                self.n_clusters, self.batch_size, self.max_iter
            )));
        }
        if cols == 0 || rows < self.n_clusters {
            return Err(Error::InvalidClustering(format!(
                "{} clusters requested for a {} x {} matrix",
                self.n_clusters, rows, cols
            )));
        }

        let mut rng = SimpleRng::from_optional_seed(self.seed);
        let mut centroids = self.init_centroids(store, &mut rng)?;
        let mut counts = vec![0u64; self.n_clusters];

        let mut chunk_starts: Vec<usize> = (0..rows).step_by(self.batch_size).collect();
        let mut assignments = Vec::with_capacity(self.batch_size);
        let mut n_iter = 0;
        let mut converged = false;
        let progress = progress_bar(self.max_iter as u64, "k-means");

        for _ in 0..self.max_iter {
            let previous = centroids.clone();
            rng.shuffle_usize(&mut chunk_starts);

            for &start in &chunk_starts {
                let count = self.batch_size.min(rows - start);
                let chunk = store.read_rows(start, count)?;

                // Assign against the centres as they were at the start of the chunk
                assignments.clear();
                assignments.extend(chunk.chunks_exact(cols).map(|row| nearest(&centroids, cols, row).0));

                for (row, &cluster) in chunk.chunks_exact(cols).zip(&assignments) {
                    counts[cluster] += 1;
                    let eta = 1.0 / counts[cluster] as f32;
                    let centre = &mut centroids[cluster * cols..(cluster + 1) * cols];
                    for (c, &x) in centre.iter_mut().zip(row) {
                        *c += eta * (x - *c);
                    }
                }
            }

            n_iter += 1;
            let shift = max_shift(&previous, &centroids, cols);
            progress.set_message(format!("shift {:.3e}", shift));
            progress.inc(1);
            log::debug!("k-means pass {}: max centre shift {:.6e}", n_iter, shift);
            if shift < self.tol {
                converged = true;
                break;
            }
        }
        progress.finish_and_clear();

        if converged {
            log::info!("k-means converged after {} passes", n_iter);
        } else {
            log::warn!("k-means stopped after {} passes without converging", n_iter);
        }

        Ok(ClusterModel {
            n_features: cols,
            centroids,
            counts,
            n_iter,
            converged,
        })
    }

    /// k-means++ seeding over a random sample of rows.
    fn init_centroids<S: FeatureStore + ?Sized>(&self, store: &S, rng: &mut SimpleRng) -> Result<Vec<f32>> {
        let rows = store.rows();
        let cols = store.cols();
        let sample_rows = rows.min((INIT_ROWS_PER_CLUSTER * self.n_clusters).max(self.batch_size));

        let mut sample = Vec::with_capacity(sample_rows * cols);
        if sample_rows == rows {
            sample.extend_from_slice(store.read_rows(0, rows)?);
        } else {
            for _ in 0..sample_rows {
                sample.extend_from_slice(store.read_rows(rng.gen_usize(rows), 1)?);
            }
        }

        let first = rng.gen_usize(sample_rows);
        let mut centroids = sample[first * cols..(first + 1) * cols].to_vec();
        let mut distances: Vec<f32> = sample
            .chunks_exact(cols)
            .map(|row| squared_distance(row, &centroids))
            .collect();

        for _ in 1..self.n_clusters {
            let total: f32 = distances.iter().sum();
            let chosen = if total > 0.0 && total.is_finite() {
                let mut target = rng.next_f32() * total;
                let mut chosen = sample_rows - 1;
                for (i, &d) in distances.iter().enumerate() {
                    if target < d {
                        chosen = i;
                        break;
                    }
                    target -= d;
                }
                chosen
            } else {
                rng.gen_usize(sample_rows)
            };

            let centre = &sample[chosen * cols..(chosen + 1) * cols];
            for (d, row) in distances.iter_mut().zip(sample.chunks_exact(cols)) {
                *d = d.min(squared_distance(row, centre));
            }
            centroids.extend_from_slice(centre);
        }

        Ok(centroids)
    }
}

/// Fitted centres, `n_clusters × n_features`, stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterModel {
    pub n_features: usize,
    pub centroids: Vec<f32>,
    /// Rows absorbed by each centre during fitting.
    pub counts: Vec<u64>,
    pub n_iter: usize,
    pub converged: bool,
}

impl ClusterModel {
    pub fn n_clusters(&self) -> usize {
        self.counts.len()
    }

    pub fn centroid(&self, index: usize) -> &[f32] {
        &self.centroids[index * self.n_features..(index + 1) * self.n_features]
    }

    /// Index of the closest centre to `row`.
    pub fn nearest(&self, row: &[f32]) -> Result<usize> {
        if row.len() != self.n_features {
            return Err(Error::FeatureCountMismatch {
                expected: self.n_features,
                actual: row.len(),
            });
        }
        Ok(nearest(&self.centroids, self.n_features, row).0)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[inline]
fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(centroids: &[f32], cols: usize, row: &[f32]) -> (usize, f32) {
    centroids
        .chunks_exact(cols)
        .map(|centre| squared_distance(row, centre))
        .enumerate()
        .fold((0, f32::INFINITY), |best, (i, d)| if d < best.1 { (i, d) } else { best })
}

fn max_shift(before: &[f32], after: &[f32], cols: usize) -> f32 {
    before
        .chunks_exact(cols)
        .zip(after.chunks_exact(cols))
        .map(|(a, b)| squared_distance(a, b).sqrt())
        .fold(0.0, f32::max)
}
