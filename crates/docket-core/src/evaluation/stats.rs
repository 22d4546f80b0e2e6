//! Paired significance statistics for comparing two evaluation runs.
//!
//! Two reports over the same dataset give, per metric, one value per query
//! for each engine. [`compare_paired`] summarizes the per-query differences:
//!
//! - mean difference with a bootstrap 95% confidence interval
//! - two-tailed paired t-test p-value
//! - Cohen's d effect size
//!
//! # References
//!
//! - Efron & Tibshirani (1993). "An Introduction to the Bootstrap"
//! - Smucker et al. (2007). "A comparison of statistical significance tests for IR evaluation"

use serde::Serialize;

/// Bootstrap resamples used by [`compare_paired`].
pub const BOOTSTRAP_RESAMPLES: usize = 2000;

/// Fixed seed so repeated comparisons print the same interval.
pub const BOOTSTRAP_SEED: u64 = 42;

/// A mean with a bootstrap 95% confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Interval {
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    /// `mean [lower, upper]` with `precision` decimals.
    pub fn format(&self, precision: usize) -> String {
        format!(
            "{:+.prec$} [{:+.prec$}, {:+.prec$}]",
            self.mean,
            self.lower,
            self.upper,
            prec = precision
        )
    }

    /// True if the interval excludes zero.
    pub fn excludes_zero(&self) -> bool {
        self.lower > 0.0 || self.upper < 0.0
    }
}

/// Paired comparison of one metric between engines A and B.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairedComparison {
    pub metric: String,
    pub queries: usize,
    pub mean_a: f64,
    pub mean_b: f64,
    /// Per-query `a - b`, bootstrapped
    pub difference: Interval,
    /// Two-tailed paired t-test; `None` with fewer than two queries
    pub p_value: Option<f64>,
    pub cohens_d: f64,
}

impl PairedComparison {
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value.is_some_and(|p| p < alpha)
    }
}

/// Compares paired per-query values of `metric`.
///
/// Returns `None` if there are no pairs. `a` and `b` must be in the same
/// query order; extra trailing values on either side are ignored.
pub fn compare_paired(metric: &str, a: &[f64], b: &[f64]) -> Option<PairedComparison> {
    let n = a.len().min(b.len());
    if n == 0 {
        return None;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let diffs: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - y).collect();

    Some(PairedComparison {
        metric: metric.to_string(),
        queries: n,
        mean_a: mean(a),
        mean_b: mean(b),
        difference: bootstrap_ci(&diffs, BOOTSTRAP_RESAMPLES, BOOTSTRAP_SEED),
        p_value: paired_ttest(a, b).map(|t| t.p_value),
        cohens_d: cohens_d(a, b),
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Sample variance (n - 1 denominator); 0 for fewer than two values.
fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

// ============================================================================
// Bootstrap
// ============================================================================

/// Bootstrap 95% confidence interval for the mean of `values`.
///
/// Draws `resamples` resamples with replacement and takes the 2.5th and
/// 97.5th percentiles of their means. Deterministic for a given `seed`.
/// An empty input yields an all-NaN interval.
pub fn bootstrap_ci(values: &[f64], resamples: usize, seed: u64) -> Interval {
    if values.is_empty() || resamples == 0 {
        return Interval {
            mean: f64::NAN,
            lower: f64::NAN,
            upper: f64::NAN,
        };
    }

    let n = values.len();
    let mut rng = Lcg::new(seed);
    let mut means: Vec<f64> = (0..resamples)
        .map(|_| (0..n).map(|_| values[rng.below(n)]).sum::<f64>() / n as f64)
        .collect();
    means.sort_by(f64::total_cmp);

    let at = |q: f64| means[((resamples as f64 * q) as usize).min(resamples - 1)];
    Interval {
        mean: mean(values),
        lower: at(0.025),
        upper: at(0.975),
    }
}

// ============================================================================
// Paired t-test
// ============================================================================

/// Outcome of a paired t-test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TTest {
    /// Positive when A scores higher on average
    pub t_statistic: f64,
    /// Two-tailed
    pub p_value: f64,
    pub df: usize,
}

/// Paired t-test of `a` against `b`.
///
/// Returns `None` for fewer than two pairs or mismatched lengths. Identical
/// differences (zero variance) give `t = 0` and `p = 1` when the mean
/// difference is 0, and `p = 0` otherwise.
pub fn paired_ttest(a: &[f64], b: &[f64]) -> Option<TTest> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let n = a.len();
    let df = n - 1;
    let diffs: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - y).collect();
    let mean_diff = mean(&diffs);
    let se = (sample_variance(&diffs) / n as f64).sqrt();

    if se == 0.0 {
        let p_value = if mean_diff == 0.0 { 1.0 } else { 0.0 };
        return Some(TTest {
            t_statistic: 0.0,
            p_value,
            df,
        });
    }

    let t = mean_diff / se;
    Some(TTest {
        t_statistic: t,
        p_value: two_tailed_p(t.abs(), df),
        df,
    })
}

// ============================================================================
// Effect size
// ============================================================================

/// Cohen's d with pooled standard deviation; 0 when undefined.
///
/// Rough reading: below 0.2 negligible, 0.5 medium, 0.8 and above large.
pub fn cohens_d(a: &[f64], b: &[f64]) -> f64 {
    let (na, nb) = (a.len(), b.len());
    if na < 2 || nb < 2 {
        return 0.0;
    }
    let pooled = (((na - 1) as f64 * sample_variance(a) + (nb - 1) as f64 * sample_variance(b))
        / (na + nb - 2) as f64)
        .sqrt();
    if pooled == 0.0 {
        0.0
    } else {
        (mean(a) - mean(b)) / pooled
    }
}

/// Label for a Cohen's d magnitude.
pub fn effect_label(d: f64) -> &'static str {
    match d.abs() {
        x if x < 0.2 => "negligible",
        x if x < 0.5 => "small",
        x if x < 0.8 => "medium",
        _ => "large",
    }
}

// ============================================================================
// Internal: reproducible resampling
// ============================================================================

/// 64-bit linear congruential generator (Knuth's MMIX constants).
struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.state
    }

    /// Uniform-ish index in `0..n`, from the high bits.
    fn below(&mut self, n: usize) -> usize {
        ((self.next_u64() >> 33) % n as u64) as usize
    }
}

// ============================================================================
// Internal: Student's t tail probability
// ============================================================================

/// Two-tailed p-value `P(|T| >= t)` for Student's t with `df` degrees of
/// freedom, via the regularized incomplete beta function
/// `I_{df/(df+t²)}(df/2, 1/2)`.
fn two_tailed_p(t: f64, df: usize) -> f64 {
    let v = df as f64;
    regularized_beta(v / (v + t * t), v / 2.0, 0.5).clamp(0.0, 1.0)
}

/// Regularized incomplete beta `I_x(a, b)`.
fn regularized_beta(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let front = (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln())
        .exp();
    // The continued fraction converges fastest below the distribution mean
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(x, a, b) / a
    } else {
        1.0 - front * beta_continued_fraction(1.0 - x, b, a) / b
    }
}

/// Continued fraction for the incomplete beta, modified Lentz's method.
fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 1e-12;
    const TINY: f64 = 1e-300;

    let guard = |v: f64| if v.abs() < TINY { TINY } else { v };

    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - (a + b) * x / (a + 1.0));
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let two_m = 2.0 * m;

        let even = m * (b - m) * x / ((a + two_m - 1.0) * (a + two_m));
        d = 1.0 / guard(1.0 + even * d);
        c = guard(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (a + b + m) * x / ((a + two_m) * (a + two_m + 1.0));
        d = 1.0 / guard(1.0 + odd * d);
        c = guard(1.0 + odd / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// `ln Γ(x)` for `x > 0` (Lanczos approximation, g = 7).
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        // Reflection keeps the approximation in its accurate range
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut sum = COEFFS[0];
    for (i, &c) in COEFFS.iter().enumerate().skip(1) {
        sum += c / (x + i as f64);
    }
    let t = x + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_interval_brackets_mean() {
        let values = [0.85, 0.90, 0.88, 0.92, 0.87, 0.89, 0.91, 0.86, 0.88, 0.90];
        let ci = bootstrap_ci(&values, 1000, 7);

        assert!((ci.mean - 0.886).abs() < 1e-9);
        assert!(ci.lower <= ci.mean && ci.mean <= ci.upper);
        let width = ci.upper - ci.lower;
        assert!(width > 0.005 && width < 0.1, "width {width}");
    }

    #[test]
    fn test_bootstrap_is_reproducible() {
        let values = [0.1, 0.5, 0.9, 0.3];
        assert_eq!(bootstrap_ci(&values, 500, 1), bootstrap_ci(&values, 500, 1));
    }

    #[test]
    fn test_bootstrap_single_and_empty() {
        let one = bootstrap_ci(&[0.9], 100, 42);
        assert_eq!((one.mean, one.lower, one.upper), (0.9, 0.9, 0.9));
        assert!(bootstrap_ci(&[], 100, 42).mean.is_nan());
    }

    #[test]
    fn test_ttest_detects_clear_difference() {
        let a = [0.9, 0.92, 0.88, 0.91, 0.89, 0.93, 0.87, 0.90];
        let b = [0.7, 0.73, 0.67, 0.71, 0.70, 0.72, 0.68, 0.69];
        let t = paired_ttest(&a, &b).unwrap();
        assert!(t.t_statistic > 0.0);
        assert!(t.p_value < 0.001, "p = {}", t.p_value);
        assert_eq!(t.df, 7);
    }

    #[test]
    fn test_ttest_similar_runs_not_significant() {
        let a = [0.85, 0.87, 0.86, 0.84, 0.85];
        let b = [0.84, 0.86, 0.87, 0.85, 0.86];
        let t = paired_ttest(&a, &b).unwrap();
        assert!(t.p_value > 0.05, "p = {}", t.p_value);
    }

    #[test]
    fn test_ttest_known_value() {
        // diffs = [1, 2, 3]: mean 2, sd 1, se 1/sqrt(3), t = 3.4641, df 2
        let t = paired_ttest(&[2.0, 3.0, 4.0], &[1.0, 1.0, 1.0]).unwrap();
        assert!((t.t_statistic - 12f64.sqrt()).abs() < 1e-9);
        // For df = 2, p = 1 - t / sqrt(2 + t²) ≈ 0.0742
        assert!((t.p_value - 0.0742).abs() < 1e-3, "p = {}", t.p_value);
    }

    #[test]
    fn test_ttest_degenerate_inputs() {
        assert!(paired_ttest(&[0.5], &[0.4]).is_none());
        assert!(paired_ttest(&[0.5, 0.6], &[0.4]).is_none());
        let same = paired_ttest(&[0.5, 0.6], &[0.5, 0.6]).unwrap();
        assert_eq!(same.p_value, 1.0);
    }

    #[test]
    fn test_cohens_d() {
        let a = [0.9, 0.92, 0.88, 0.91, 0.89];
        let b = [0.5, 0.52, 0.48, 0.51, 0.49];
        let d = cohens_d(&a, &b);
        assert!(d > 2.0);
        assert_eq!(effect_label(d), "large");
        assert_eq!(effect_label(-0.3), "small");
        assert_eq!(effect_label(0.6), "medium");
        assert_eq!(effect_label(0.1), "negligible");
        assert_eq!(cohens_d(&[0.5], &[0.4]), 0.0);
    }

    #[test]
    fn test_ln_gamma() {
        assert!(ln_gamma(1.0).abs() < 1e-10);
        assert!((ln_gamma(5.0) - 24f64.ln()).abs() < 1e-10);
        assert!((ln_gamma(0.5) - std::f64::consts::PI.sqrt().ln()).abs() < 1e-10);
    }

    #[test]
    fn test_compare_paired() {
        let a = [1.0, 0.5, 1.0, 0.0];
        let b = [0.5, 0.5, 0.0, 0.0];
        let cmp = compare_paired("mrr", &a, &b).unwrap();
        assert_eq!(cmp.queries, 4);
        assert!((cmp.mean_a - 0.625).abs() < 1e-9);
        assert!((cmp.mean_b - 0.25).abs() < 1e-9);
        assert!((cmp.difference.mean - 0.375).abs() < 1e-9);
        assert!(cmp.p_value.is_some());
        assert!(compare_paired("mrr", &[], &[]).is_none());
    }
}
