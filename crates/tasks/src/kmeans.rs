//! K-means over embedding vectors, with k-means++ seeding.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KMeansError {
    #[error("n_clusters must be positive")]
    ZeroClusters,
    #[error("{points} points cannot fill {clusters} clusters")]
    NotEnoughPoints { points: usize, clusters: usize },
    #[error("point {index} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        found: usize,
        expected: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeans {
    pub n_clusters: usize,
    #[serde(default = "default_max_iters")]
    pub max_iters: usize,
    #[serde(default)]
    pub seed: u64,
}

fn default_max_iters() -> usize {
    300
}

impl KMeans {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iters: default_max_iters(),
            seed: 0,
        }
    }

    /// Cluster `points`, returning one cluster id per point, each in
    /// `0..n_clusters`. Every cluster ends up non-empty.
    pub fn fit(&self, points: &[Vec<f32>]) -> Result<Vec<usize>, KMeansError> {
        if self.n_clusters == 0 {
            return Err(KMeansError::ZeroClusters);
        }
        if points.len() < self.n_clusters {
            return Err(KMeansError::NotEnoughPoints {
                points: points.len(),
                clusters: self.n_clusters,
            });
        }
        let dim = points[0].len();
        for (index, p) in points.iter().enumerate() {
            if p.len() != dim {
                return Err(KMeansError::DimensionMismatch {
                    index,
                    found: p.len(),
                    expected: dim,
                });
            }
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids = self.init_plus_plus(points, &mut rng);
        let mut assignments = vec![0usize; points.len()];

        for _ in 0..self.max_iters {
            let mut changed = false;
            for (i, point) in points.iter().enumerate() {
                let nearest = nearest_centroid(point, &centroids);
                if assignments[i] != nearest {
                    assignments[i] = nearest;
                    changed = true;
                }
            }

            // Recompute means; reseed an emptied cluster from the point
            // farthest from its current centroid.
            let mut sums = vec![vec![0.0f32; dim]; self.n_clusters];
            let mut counts = vec![0usize; self.n_clusters];
            for (point, &cluster) in points.iter().zip(&assignments) {
                counts[cluster] += 1;
                for (s, v) in sums[cluster].iter_mut().zip(point) {
                    *s += v;
                }
            }
            for (cluster, count) in counts.iter().enumerate() {
                if *count == 0 {
                    let farthest = points
                        .iter()
                        .enumerate()
                        .max_by(|(_, a), (_, b)| {
                            let da = sq_dist(a, &centroids[cluster]);
                            let db = sq_dist(b, &centroids[cluster]);
                            da.total_cmp(&db)
                        })
                        .map(|(i, _)| i)
                        .unwrap_or(0);
                    centroids[cluster] = points[farthest].clone();
                    changed = true;
                } else {
                    for (c, s) in centroids[cluster].iter_mut().zip(&sums[cluster]) {
                        *c = s / *count as f32;
                    }
                }
            }

            if !changed {
                break;
            }
        }

        // Final pass so ids match the converged centroids.
        for (i, point) in points.iter().enumerate() {
            assignments[i] = nearest_centroid(point, &centroids);
        }
        Ok(assignments)
    }

    /// k-means++: first centroid uniform, the rest weighted by squared
    /// distance to the nearest chosen centroid.
    fn init_plus_plus<R: Rng>(&self, points: &[Vec<f32>], rng: &mut R) -> Vec<Vec<f32>> {
        let mut centroids = Vec::with_capacity(self.n_clusters);
        centroids.push(points[rng.gen_range(0..points.len())].clone());
        while centroids.len() < self.n_clusters {
            let weights: Vec<f32> = points
                .iter()
                .map(|p| {
                    centroids
                        .iter()
                        .map(|c| sq_dist(p, c))
                        .fold(f32::INFINITY, f32::min)
                })
                .collect();
            let next = match WeightedIndex::new(&weights) {
                Ok(dist) => dist.sample(rng),
                // All remaining points coincide with centroids.
                Err(_) => rng.gen_range(0..points.len()),
            };
            centroids.push(points[next].clone());
        }
        centroids
    }
}

fn sq_dist(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest_centroid(point: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = sq_dist(point, c);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}
