//! Weighted random sampling in O(1) per draw.
//!
//! [`WeightedSampler`] precomputes Vose's alias table from a list of
//! weighted values. Each draw then costs one uniform column pick and one
//! biased coin flip, regardless of how many values there are.
//!
//! ```text
//!   weights   1   3            scaled by n    0.5  1.5
//!   column    0   1            prob           0.5  1.0
//!                              alias          1    -
//! ```

use rand::Rng;
use relay_core::RelayError;

/// A value and its relative weight. Weights need not sum to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Weighted<T> {
    pub value: T,
    pub weight: f64,
}

impl<T> Weighted<T> {
    pub fn new(value: T, weight: f64) -> Self {
        Self { value, weight }
    }
}

impl<T> From<(T, f64)> for Weighted<T> {
    fn from((value, weight): (T, f64)) -> Self {
        Self::new(value, weight)
    }
}

/// Alias-method sampler over a fixed set of values.
#[derive(Debug, Clone)]
pub struct WeightedSampler<T> {
    values: Vec<T>,
    prob: Vec<f64>,
    alias: Vec<usize>,
}

impl<T> WeightedSampler<T> {
    /// Build the alias table.
    ///
    /// Fails with [`RelayError::InvalidArgument`] on an empty table, a
    /// negative or non-finite weight, or weights summing to zero.
    pub fn new(table: Vec<Weighted<T>>) -> Result<Self, RelayError> {
        if table.is_empty() {
            return Err(RelayError::invalid("sampler table must not be empty"));
        }
        if let Some(bad) = table.iter().position(|w| !w.weight.is_finite() || w.weight < 0.0) {
            return Err(RelayError::invalid(format!(
                "weight at index {bad} must be finite and non-negative"
            )));
        }
        let total: f64 = table.iter().map(|w| w.weight).sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(RelayError::invalid("sampler weights must have a positive finite sum"));
        }

        let n = table.len();
        let (values, weights): (Vec<T>, Vec<f64>) = table.into_iter().map(|w| (w.value, w.weight)).unzip();
        let mut scaled: Vec<f64> = weights.iter().map(|w| w / total * n as f64).collect();

        let mut small = Vec::with_capacity(n);
        let mut large = Vec::with_capacity(n);
        for (i, &p) in scaled.iter().enumerate() {
            if p < 1.0 {
                small.push(i);
            } else {
                large.push(i);
            }
        }

        let mut prob = vec![0.0; n];
        let mut alias: Vec<usize> = (0..n).collect();
        while let (Some(&less), Some(&more)) = (small.last(), large.last()) {
            small.pop();
            large.pop();

            prob[less] = scaled[less];
            alias[less] = more;
            scaled[more] = (scaled[more] + scaled[less]) - 1.0;
            if scaled[more] < 1.0 {
                small.push(more);
            } else {
                large.push(more);
            }
        }
        settle_leftovers(small.into_iter().chain(large), &weights, &mut prob, &mut alias);

        tracing::debug!(columns = n, "Alias table built");
        Ok(Self { values, prob, alias })
    }

    /// Draw a value using `rng`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        let column = rng.gen_range(0..self.values.len());
        let coin: f64 = rng.gen();
        self.pick(column, coin)
    }

    /// Resolve a column and a coin in `[0, 1)` to a value.
    pub(crate) fn pick(&self, column: usize, coin: f64) -> &T {
        if coin < self.prob[column] {
            &self.values[column]
        } else {
            &self.values[self.alias[column]]
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<T: Clone> WeightedSampler<T> {
    /// Draw a value using the thread-local RNG.
    pub fn next_from_sample(&self) -> T {
        self.sample(&mut rand::thread_rng()).clone()
    }
}

/// Finish columns the pairing loop left over.
///
/// A leftover column is 1.0 up to rounding, unless rounding stranded a
/// zero-weight column there. That one must stay undrawable, so it hands its
/// whole slot to the heaviest column.
fn settle_leftovers(leftover: impl Iterator<Item = usize>, weights: &[f64], prob: &mut [f64], alias: &mut [usize]) {
    let heaviest = weights
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(i, _)| i);
    for i in leftover {
        if weights[i] > 0.0 {
            prob[i] = 1.0;
        } else {
            prob[i] = 0.0;
            alias[i] = heaviest;
        }
    }
}
