//! Batch statistics
//!
//! Samples are only taken from records that carry terminal metadata; every
//! other outcome (transport failure, decode failure, or a response without
//! a terminal chunk) counts as an error. Statistics over an empty sample set
//! come back as [`InsufficientData`] rather than NaN or a panic.

use crate::decode::DecodedRecord;
use crate::error::{InsufficientData, RequestError};

/// A statistic that may not be computable for this batch.
pub type Stat = Result<f64, InsufficientData>;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median of unsorted values; even-length sets average the two middle values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Percentile over already sorted values, taking the element at the rounded
/// index `p / 100 * (n - 1)`.
pub fn percentile(sorted_values: &[f64], p: f64) -> Option<f64> {
    if sorted_values.is_empty() {
        return None;
    }
    let idx = (p / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
    Some(sorted_values[idx.min(sorted_values.len() - 1)])
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Distribution summary of one sample set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
    pub p99: f64,
    pub max: f64,
}

impl SampleSummary {
    pub fn of(samples: &[f64], statistic: &'static str) -> Result<Self, InsufficientData> {
        let sorted = sorted(samples);
        let missing = || InsufficientData::new(statistic);
        Ok(SampleSummary {
            count: sorted.len(),
            mean: mean(&sorted).ok_or_else(missing)?,
            median: median(&sorted).ok_or_else(missing)?,
            p90: percentile(&sorted, 90.0).ok_or_else(missing)?,
            p99: percentile(&sorted, 99.0).ok_or_else(missing)?,
            max: percentile(&sorted, 100.0).ok_or_else(missing)?,
        })
    }
}

/// Final statistics for one batch.
#[derive(Debug, Clone, Default)]
pub struct AggregateStats {
    /// Provider/benchmark name
    pub name: Option<String>,
    pub num_requests: usize,
    pub num_errors: usize,
    /// Server-reported total durations, seconds
    pub total_duration_samples: Vec<f64>,
    /// Server-reported eval durations, seconds
    pub eval_duration_samples: Vec<f64>,
    /// Generated token counts
    pub token_counts: Vec<u64>,
    pub prompt_token_counts: Vec<u64>,
    /// Client-measured request latencies, seconds
    pub client_latency_samples: Vec<f64>,
    /// Client-measured time to first body byte, seconds
    pub ttfb_samples: Vec<f64>,
}

/// Reduce decoded outcomes into batch statistics.
pub fn aggregate(outcomes: &[Result<DecodedRecord, RequestError>]) -> AggregateStats {
    let mut stats = AggregateStats {
        num_requests: outcomes.len(),
        ..Default::default()
    };

    for record in outcomes.iter().filter_map(|o| o.as_ref().ok()) {
        let Some(total) = record.total_duration_seconds else {
            continue;
        };
        stats.total_duration_samples.push(total);
        stats.eval_duration_samples.extend(record.eval_duration_seconds);
        stats.token_counts.extend(record.eval_token_count);
        stats.prompt_token_counts.extend(record.prompt_token_count);
        stats.client_latency_samples.extend(record.client_latency_seconds);
        stats.ttfb_samples.extend(record.time_to_first_byte_seconds);
    }

    stats.num_errors = stats.num_requests - stats.total_duration_samples.len();
    stats
}

impl AggregateStats {
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn mean_total_duration(&self) -> Stat {
        mean(&self.total_duration_samples).ok_or(InsufficientData::new("mean total duration"))
    }

    pub fn median_total_duration(&self) -> Stat {
        median(&self.total_duration_samples).ok_or(InsufficientData::new("median total duration"))
    }

    pub fn mean_eval_duration(&self) -> Stat {
        mean(&self.eval_duration_samples).ok_or(InsufficientData::new("mean eval duration"))
    }

    pub fn median_eval_duration(&self) -> Stat {
        median(&self.eval_duration_samples).ok_or(InsufficientData::new("median eval duration"))
    }

    pub fn mean_token_count(&self) -> Stat {
        mean(&as_f64(&self.token_counts)).ok_or(InsufficientData::new("mean token count"))
    }

    pub fn median_token_count(&self) -> Stat {
        median(&as_f64(&self.token_counts)).ok_or(InsufficientData::new("median token count"))
    }

    pub fn total_duration_summary(&self) -> Result<SampleSummary, InsufficientData> {
        SampleSummary::of(&self.total_duration_samples, "total duration")
    }

    pub fn eval_duration_summary(&self) -> Result<SampleSummary, InsufficientData> {
        SampleSummary::of(&self.eval_duration_samples, "eval duration")
    }

    pub fn client_latency_summary(&self) -> Result<SampleSummary, InsufficientData> {
        SampleSummary::of(&self.client_latency_samples, "client latency")
    }

    pub fn ttfb_summary(&self) -> Result<SampleSummary, InsufficientData> {
        SampleSummary::of(&self.ttfb_samples, "time to first byte")
    }

    // The throughput figures divide a sum (or count) over the batch by the
    // *mean* duration of a single request. This is what the numbers have
    // always meant, so keep it; do not switch to sum/sum.

    /// Generated tokens per mean total duration.
    pub fn token_throughput_user(&self) -> Stat {
        rate(
            sum(&self.token_counts),
            self.mean_total_duration(),
            "token throughput (user)",
        )
    }

    /// Successful requests per mean total duration.
    pub fn request_throughput_user(&self) -> Stat {
        rate(
            count(&self.token_counts),
            self.mean_total_duration(),
            "request throughput (user)",
        )
    }

    /// Generated tokens per mean eval duration.
    pub fn token_throughput_eval(&self) -> Stat {
        rate(
            sum(&self.token_counts),
            self.mean_eval_duration(),
            "token throughput (eval only)",
        )
    }

    /// Successful requests per mean eval duration.
    pub fn request_throughput_eval(&self) -> Stat {
        rate(
            count(&self.token_counts),
            self.mean_eval_duration(),
            "request throughput (eval only)",
        )
    }

    /// Prompt tokens per mean total duration; the only rate for embeddings.
    pub fn prompt_token_throughput_user(&self) -> Stat {
        rate(
            sum(&self.prompt_token_counts),
            self.mean_total_duration(),
            "prompt token throughput (user)",
        )
    }

    pub fn error_rate(&self) -> f64 {
        if self.num_requests == 0 {
            return 0.0;
        }
        self.num_errors as f64 / self.num_requests as f64 * 100.0
    }
}

fn as_f64(values: &[u64]) -> Vec<f64> {
    values.iter().map(|&v| v as f64).collect()
}

fn sum(values: &[u64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<u64>() as f64)
}

fn count(values: &[u64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.len() as f64)
}

fn rate(numerator: Option<f64>, denominator: Stat, statistic: &'static str) -> Stat {
    match (numerator, denominator) {
        (Some(n), Ok(d)) if d > 0.0 => Ok(n / d),
        _ => Err(InsufficientData::new(statistic)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(total: f64, eval: f64, tokens: u64) -> Result<DecodedRecord, RequestError> {
        Ok(DecodedRecord {
            generated_text: "ok".to_string(),
            total_duration_seconds: Some(total),
            eval_duration_seconds: Some(eval),
            eval_token_count: Some(tokens),
            ..Default::default()
        })
    }

    fn failure() -> Result<DecodedRecord, RequestError> {
        Err(RequestError::Status {
            status: 503,
            body: "overloaded".to_string(),
        })
    }

    #[test]
    fn test_mean_median_percentile() {
        assert_eq!(mean(&[]), None);
        assert_eq!(median(&[]), None);
        assert_eq!(percentile(&[], 50.0), None);
        assert_eq!(mean(&[1.0, 2.0, 3.0, 6.0]), Some(3.0));
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0, 5.0], 100.0), Some(5.0));
    }

    #[test]
    fn test_aggregate_all_successes() {
        let outcomes = vec![record(1.0, 0.5, 10), record(2.0, 1.0, 20), record(3.0, 1.5, 30)];
        let stats = aggregate(&outcomes);

        assert_eq!(stats.num_requests, 3);
        assert_eq!(stats.num_errors, 0);
        assert_eq!(stats.mean_total_duration(), Ok(2.0));
        assert_eq!(stats.median_total_duration(), Ok(2.0));
        assert_eq!(stats.mean_eval_duration(), Ok(1.0));
        assert_eq!(stats.token_counts, vec![10, 20, 30]);

        assert_eq!(stats.token_throughput_user(), Ok(30.0));
        assert_eq!(stats.request_throughput_user(), Ok(1.5));
        assert_eq!(stats.token_throughput_eval(), Ok(60.0));
        assert_eq!(stats.request_throughput_eval(), Ok(3.0));
    }

    #[test]
    fn test_aggregate_counts_missing_metadata_as_error() {
        let outcomes = vec![
            record(2.0, 1.0, 4),
            Ok(DecodedRecord::default()),
            failure(),
        ];
        let stats = aggregate(&outcomes);

        assert_eq!(stats.num_requests, 3);
        assert_eq!(stats.num_errors, 2);
        assert_eq!(
            stats.num_errors,
            stats.num_requests - stats.total_duration_samples.len()
        );
        assert_eq!(stats.total_duration_samples, vec![2.0]);
        assert!((stats.error_rate() - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_aggregate_all_failures_reports_insufficient_data() {
        let stats = aggregate(&[failure(), failure(), Ok(DecodedRecord::default())]);

        assert_eq!(stats.num_errors, stats.num_requests);
        assert!(stats.mean_total_duration().is_err());
        assert!(stats.median_eval_duration().is_err());
        assert!(stats.total_duration_summary().is_err());
        for figure in [
            stats.token_throughput_user(),
            stats.request_throughput_user(),
            stats.token_throughput_eval(),
            stats.request_throughput_eval(),
        ] {
            assert!(figure.is_err());
        }
    }

    #[test]
    fn test_empty_batch() {
        let stats = aggregate(&[]);
        assert_eq!(stats.num_requests, 0);
        assert_eq!(stats.num_errors, 0);
        assert_eq!(stats.error_rate(), 0.0);
        assert!(stats.token_throughput_user().is_err());
    }

    #[test]
    fn test_partial_metadata_guards_eval_rates() {
        // Total duration present, but no eval duration or token count.
        let outcomes = vec![Ok(DecodedRecord {
            total_duration_seconds: Some(1.2),
            prompt_token_count: Some(8),
            ..Default::default()
        })];
        let stats = aggregate(&outcomes);

        assert_eq!(stats.num_errors, 0);
        assert!(stats.mean_total_duration().is_ok());
        assert!(stats.mean_eval_duration().is_err());
        assert!(stats.token_throughput_user().is_err());
        assert!(stats.token_throughput_eval().is_err());
        let prompt_rate = stats.prompt_token_throughput_user().unwrap();
        assert!((prompt_rate - 8.0 / 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_zero_duration_is_not_divided_by() {
        let stats = aggregate(&[record(0.0, 0.0, 5)]);
        assert!(stats.token_throughput_user().is_err());
        assert!(stats.request_throughput_eval().is_err());
    }

    #[test]
    fn test_summary() {
        let summary = SampleSummary::of(&[3.0, 1.0, 2.0, 4.0], "x").unwrap();
        assert_eq!(summary.count, 4);
        assert_eq!(summary.mean, 2.5);
        assert_eq!(summary.median, 2.5);
        assert_eq!(summary.max, 4.0);
        assert_eq!(
            SampleSummary::of(&[], "x").unwrap_err(),
            InsufficientData::new("x")
        );
    }
}
