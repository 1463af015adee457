//! Histogram values with bucketed counts and running statistics.
//!
//! A distribution is created with one of three bucket schemes and never
//! changes scheme afterwards. Samples update the running statistics with an
//! online (Welford) mean/variance step; two distributions over the same
//! scheme combine with the standard two-sample formulas, so splitting a
//! sample set, building one distribution per part and merging gives the same
//! counts, mean, minimum and maximum as building from the whole set.

use crate::core::{Result, TallyError};
use serde::{Deserialize, Serialize};

/// Relative tolerance when comparing bucket scheme parameters
pub const BUCKET_EPSILON: f64 = 1e-5;

/// Bucket layout of a distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BucketOptions {
    /// Bucket `i` (1..=n) covers `[scale * g^(i-1), scale * g^i)`
    Exponential {
        num_finite_buckets: usize,
        growth_factor: f64,
        scale: f64,
    },
    /// Bucket `i` (1..=n) covers `[offset + width*(i-1), offset + width*i)`
    Linear {
        num_finite_buckets: usize,
        width: f64,
        offset: f64,
    },
    /// Bucket `i` covers `[bounds[i-1], bounds[i])`
    Explicit { bounds: Vec<f64> },
}

impl BucketOptions {
    /// Number of buckets including the underflow and overflow buckets
    pub fn bucket_count(&self) -> usize {
        match self {
            BucketOptions::Exponential {
                num_finite_buckets, ..
            }
            | BucketOptions::Linear {
                num_finite_buckets, ..
            } => num_finite_buckets + 2,
            BucketOptions::Explicit { bounds } => bounds.len() + 1,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            BucketOptions::Exponential { .. } => "exponential",
            BucketOptions::Linear { .. } => "linear",
            BucketOptions::Explicit { .. } => "explicit",
        }
    }

    /// Same scheme, parameters equal within [`BUCKET_EPSILON`]
    pub fn nearly_equals(&self, other: &BucketOptions) -> bool {
        match (self, other) {
            (
                BucketOptions::Exponential {
                    num_finite_buckets: n1,
                    growth_factor: g1,
                    scale: s1,
                },
                BucketOptions::Exponential {
                    num_finite_buckets: n2,
                    growth_factor: g2,
                    scale: s2,
                },
            ) => n1 == n2 && is_close_enough(*g1, *g2) && is_close_enough(*s1, *s2),
            (
                BucketOptions::Linear {
                    num_finite_buckets: n1,
                    width: w1,
                    offset: o1,
                },
                BucketOptions::Linear {
                    num_finite_buckets: n2,
                    width: w2,
                    offset: o2,
                },
            ) => n1 == n2 && is_close_enough(*w1, *w2) && is_close_enough(*o1, *o2),
            (BucketOptions::Explicit { bounds: b1 }, BucketOptions::Explicit { bounds: b2 }) => {
                b1.len() == b2.len() && b1.iter().zip(b2).all(|(x, y)| is_close_enough(*x, *y))
            }
            _ => false,
        }
    }

    fn bucket_index(&self, sample: f64) -> usize {
        match self {
            BucketOptions::Exponential {
                num_finite_buckets,
                growth_factor,
                scale,
            } => {
                if sample <= *scale {
                    0
                } else {
                    let steps = ((sample / scale).ln() / growth_factor.ln()).floor();
                    // Float-to-int casts saturate, so huge samples land in overflow.
                    (steps as usize).saturating_add(1).min(num_finite_buckets + 1)
                }
            }
            BucketOptions::Linear {
                num_finite_buckets,
                width,
                offset,
            } => {
                let upper = offset + width * (*num_finite_buckets as f64);
                if sample < *offset {
                    0
                } else if sample >= upper {
                    num_finite_buckets + 1
                } else {
                    let steps = ((sample - offset) / width).floor() as usize;
                    (1 + steps).min(*num_finite_buckets)
                }
            }
            BucketOptions::Explicit { bounds } => bounds.partition_point(|bound| *bound <= sample),
        }
    }
}

fn is_close_enough(x: f64, y: f64) -> bool {
    (x - y).abs() <= BUCKET_EPSILON * x.abs()
}

/// A histogram value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    count: u64,
    mean: f64,
    minimum: f64,
    maximum: f64,
    sum_of_squared_deviation: f64,
    bucket_counts: Vec<u64>,
    bucket_options: BucketOptions,
}

impl Distribution {
    fn with_options(bucket_options: BucketOptions) -> Self {
        Self {
            count: 0,
            mean: 0.0,
            minimum: 0.0,
            maximum: 0.0,
            sum_of_squared_deviation: 0.0,
            bucket_counts: vec![0; bucket_options.bucket_count()],
            bucket_options,
        }
    }

    /// Exponentially growing buckets
    pub fn create_exponential(
        num_finite_buckets: usize,
        growth_factor: f64,
        scale: f64,
    ) -> Result<Self> {
        if num_finite_buckets == 0 {
            return Err(TallyError::validation("number of finite buckets must be > 0"));
        }
        if !(growth_factor > 1.0) || !growth_factor.is_finite() {
            return Err(TallyError::validation(format!(
                "growth factor must be > 1.0, got {}",
                growth_factor
            )));
        }
        if !(scale > 0.0) || !scale.is_finite() {
            return Err(TallyError::validation(format!("scale must be > 0.0, got {}", scale)));
        }
        Ok(Self::with_options(BucketOptions::Exponential {
            num_finite_buckets,
            growth_factor,
            scale,
        }))
    }

    /// Equal-width buckets starting at `offset`
    pub fn create_linear(num_finite_buckets: usize, width: f64, offset: f64) -> Result<Self> {
        if num_finite_buckets == 0 {
            return Err(TallyError::validation("number of finite buckets must be > 0"));
        }
        if !(width > 0.0) || !width.is_finite() {
            return Err(TallyError::validation(format!("width must be > 0.0, got {}", width)));
        }
        if !offset.is_finite() {
            return Err(TallyError::validation(format!("offset must be finite, got {}", offset)));
        }
        Ok(Self::with_options(BucketOptions::Linear {
            num_finite_buckets,
            width,
            offset,
        }))
    }

    /// Buckets between caller-supplied bounds, sorted on creation
    pub fn create_explicit(bounds: &[f64]) -> Result<Self> {
        if bounds.iter().any(|b| b.is_nan()) {
            return Err(TallyError::validation("explicit bounds must not contain NaN"));
        }
        let mut sorted = bounds.to_vec();
        sorted.sort_by(f64::total_cmp);
        if sorted.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(TallyError::validation(
                "detected two elements of bounds that are the same",
            ));
        }
        Ok(Self::with_options(BucketOptions::Explicit { bounds: sorted }))
    }

    /// Record one sample
    pub fn add_sample(&mut self, sample: f64) -> Result<()> {
        if sample.is_nan() {
            return Err(TallyError::validation("cannot add NaN to a distribution"));
        }
        let index = self.bucket_options.bucket_index(sample);
        if index >= self.bucket_counts.len() {
            return Err(TallyError::validation(format!(
                "distribution has {} bucket counts, too few for its {} buckets",
                self.bucket_counts.len(),
                self.bucket_options.kind_name()
            )));
        }

        if self.count == 0 {
            self.count = 1;
            self.mean = sample;
            self.minimum = sample;
            self.maximum = sample;
            self.sum_of_squared_deviation = 0.0;
        } else {
            let old_mean = self.mean;
            let new_count = self.count + 1;
            let new_mean = old_mean + (sample - old_mean) / new_count as f64;
            self.sum_of_squared_deviation += (sample - old_mean) * (sample - new_mean);
            self.count = new_count;
            self.mean = new_mean;
            self.minimum = self.minimum.min(sample);
            self.maximum = self.maximum.max(sample);
        }

        self.bucket_counts[index] += 1;
        Ok(())
    }

    /// Fold `prior` into `self`; see [`merge`]
    pub fn merge_from(&mut self, prior: &Distribution) -> Result<()> {
        merge(prior, self)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    pub fn sum_of_squared_deviation(&self) -> f64 {
        self.sum_of_squared_deviation
    }

    pub fn bucket_counts(&self) -> &[u64] {
        &self.bucket_counts
    }

    pub fn bucket_options(&self) -> &BucketOptions {
        &self.bucket_options
    }

    /// Returns true if no samples have been recorded
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Combine `prior` into `latest`.
///
/// Fails with `Merge` when the bucket schemes differ or the bucket count
/// arrays have different lengths; `latest` is untouched in that case.
pub fn merge(prior: &Distribution, latest: &mut Distribution) -> Result<()> {
    if !prior.bucket_options.nearly_equals(&latest.bucket_options) {
        return Err(TallyError::merge(format!(
            "bucket options do not match: {:?} vs {:?}",
            prior.bucket_options, latest.bucket_options
        )));
    }
    if prior.bucket_counts.len() != latest.bucket_counts.len() {
        return Err(TallyError::merge(format!(
            "bucket count sizes do not match: {} vs {}",
            prior.bucket_counts.len(),
            latest.bucket_counts.len()
        )));
    }
    if prior.count == 0 {
        return Ok(());
    }

    if latest.count == 0 {
        latest.count = prior.count;
        latest.mean = prior.mean;
        latest.minimum = prior.minimum;
        latest.maximum = prior.maximum;
        latest.sum_of_squared_deviation = prior.sum_of_squared_deviation;
    } else {
        let old_count = latest.count as f64;
        let old_mean = latest.mean;
        let prior_count = prior.count as f64;

        latest.count += prior.count;
        let new_mean = (old_count * old_mean + prior_count * prior.mean) / latest.count as f64;
        latest.sum_of_squared_deviation = latest.sum_of_squared_deviation
            + prior.sum_of_squared_deviation
            + old_count * (new_mean - old_mean).powi(2)
            + prior_count * (new_mean - prior.mean).powi(2);
        latest.mean = new_mean;
        latest.minimum = latest.minimum.min(prior.minimum);
        latest.maximum = latest.maximum.max(prior.maximum);
    }

    for (ours, theirs) in latest.bucket_counts.iter_mut().zip(&prior.bucket_counts) {
        *ours += theirs;
    }
    Ok(())
}
