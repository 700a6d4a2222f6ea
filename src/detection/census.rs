use serde::Serialize;

/// How many times each digit appears on a complete clock face (1..=12)
pub const EXPECTED_DIGITS: [u32; 10] = [1, 5, 2, 1, 1, 1, 1, 1, 1, 1];

/// One cluster per hour mark at most
const MAX_ANGLE_CLUSTERS: usize = 12;
const KMEANS_MAX_ITER: usize = 100;

/// Recognized digits tallied against the expected face
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DigitCensus {
    pub observed: [u32; 10],
    pub missing: u32,
    pub extra: u32,
}

impl DigitCensus {
    /// Tally labels; the result depends only on the multiset of labels
    pub fn from_labels<I: IntoIterator<Item = u8>>(labels: I) -> Self {
        let mut observed = [0u32; 10];
        for label in labels {
            if let Some(slot) = observed.get_mut(label as usize) {
                *slot += 1;
            }
        }

        let mut missing = 0;
        let mut extra = 0;
        for (count, expected) in observed.iter().zip(EXPECTED_DIGITS) {
            if *count > expected {
                extra += count - expected;
            } else {
                missing += expected - count;
            }
        }
        Self { observed, missing, extra }
    }
}

/// Mean and population standard deviation
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}

/// Mean and spread of the gaps between neighbouring digit clusters.
///
/// Angles are grouped into `min(12, n)` clusters; absent when fewer than two
/// clusters exist.
pub fn angle_spacing(angles: &[f64]) -> Option<(f64, f64)> {
    let k = angles.len().min(MAX_ANGLE_CLUSTERS);
    if k == 0 {
        return None;
    }
    let mut centers = kmeans_1d(angles, k);
    centers.sort_by(|a, b| a.total_cmp(b));
    let gaps: Vec<f64> = centers.windows(2).map(|w| w[1] - w[0]).collect();
    mean_std(&gaps)
}

/// Lloyd's k-means on a line.
///
/// Seeds are the means of `k` equal-sized runs of the sorted values, so the
/// result is deterministic. Empty clusters keep their previous center.
pub fn kmeans_1d(values: &[f64], k: usize) -> Vec<f64> {
    if values.is_empty() || k == 0 {
        return Vec::new();
    }
    let k = k.min(values.len());
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let mut centers: Vec<f64> = (0..k)
        .map(|i| {
            let run = &sorted[i * n / k..(i + 1) * n / k];
            run.iter().sum::<f64>() / run.len() as f64
        })
        .collect();

    let mut assignment = vec![usize::MAX; n];
    for _ in 0..KMEANS_MAX_ITER {
        let mut changed = false;
        for (i, v) in sorted.iter().enumerate() {
            let nearest = nearest_center(&centers, *v);
            if assignment[i] != nearest {
                assignment[i] = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![0.0; k];
        let mut counts = vec![0usize; k];
        for (i, v) in sorted.iter().enumerate() {
            sums[assignment[i]] += v;
            counts[assignment[i]] += 1;
        }
        for c in 0..k {
            if counts[c] > 0 {
                centers[c] = sums[c] / counts[c] as f64;
            }
        }
    }
    centers
}

fn nearest_center(centers: &[f64], value: f64) -> usize {
    let mut best = 0;
    for (i, c) in centers.iter().enumerate() {
        if (value - c).abs() < (value - centers[best]).abs() {
            best = i;
        }
    }
    best
}
