//! ML-adaptive cost adjustment.
//!
//! An alternative cost calculator that scores link quality with a small
//! online linear model instead of the fixed factor tables. Each query
//! extracts a feature vector from the neighbor's RTT history and metrics and
//! predicts a badness score in `[0, 1]`; the score scales the baseline cost
//! inside the same clamp band the load-aware calculator uses. Until the model
//! has absorbed enough feedback the prediction falls back to fixed feature
//! weights. Feedback arrives through `report_path_performance`.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use namelink_core::RouterName;

use crate::metrics::{CostCalculator, LinkMetrics};

/// Samples kept per neighbor for feature extraction.
pub const MAX_RTT_HISTORY: usize = 20;

/// Feedback records kept per neighbor.
pub const MAX_PERFORMANCE_HISTORY: usize = 100;

/// Features per prediction: trend, variation, success rate, load, staleness.
const FEATURE_COUNT: usize = 5;

/// Weights used before the model is ready (first four features).
const FIXED_WEIGHTS: [f64; 4] = [0.4, 0.3, 0.2, 0.1];

/// Model updates required before predictions switch to the learned weights.
const MODEL_READY_UPDATES: u64 = 10;

/// Clamp band shared with the load-aware calculator.
const MIN_COST_RATIO: f64 = 0.5;
const MAX_COST_RATIO: f64 = 3.0;

/// Staleness horizon for the age feature.
const STALENESS_HORIZON_SECS: f64 = 300.0;

/// A least-mean-squares linear model.
#[derive(Debug, Clone)]
struct LinearRegression {
    weights: Vec<f64>,
    bias: f64,
    update_count: u64,
}

impl LinearRegression {
    fn new(feature_count: usize) -> Self {
        Self {
            weights: vec![0.0; feature_count],
            bias: 0.5,
            update_count: 0,
        }
    }

    fn predict(&self, features: &[f64]) -> f64 {
        let raw: f64 = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias;
        raw.clamp(0.0, 1.0)
    }

    /// One gradient step toward `target`.
    fn update_online(&mut self, features: &[f64], target: f64, learning_rate: f64) {
        let error = self.predict(features) - target;
        for (weight, feature) in self.weights.iter_mut().zip(features) {
            *weight -= learning_rate * error * feature;
        }
        self.bias -= learning_rate * error;
        self.update_count += 1;
    }

    fn is_ready(&self) -> bool {
        self.update_count >= MODEL_READY_UPDATES
    }
}

/// Prediction statistics for the ML calculator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MlStatistics {
    pub prediction_count: u64,
    pub model_update_count: u64,
    pub average_prediction_error: f64,
}

/// The ML-adaptive cost calculator.
#[must_use]
pub struct MlAdaptiveCalculator {
    model: LinearRegression,
    learning_rate: f64,
    rtt_history: BTreeMap<RouterName, VecDeque<f64>>,
    /// Features of the most recent prediction per neighbor, kept so feedback
    /// can be matched to what the model actually saw.
    last_features: BTreeMap<RouterName, [f64; FEATURE_COUNT]>,
    feedback: BTreeMap<RouterName, VecDeque<f64>>,
    statistics: MlStatistics,
}

impl MlAdaptiveCalculator {
    pub fn new() -> Self {
        Self {
            model: LinearRegression::new(FEATURE_COUNT),
            learning_rate: 0.05,
            rtt_history: BTreeMap::new(),
            last_features: BTreeMap::new(),
            feedback: BTreeMap::new(),
            statistics: MlStatistics::default(),
        }
    }

    #[must_use]
    pub fn statistics(&self) -> MlStatistics {
        self.statistics
    }

    /// Report the observed performance of a path through `neighbor` in
    /// `[0, 1]` (lower is better). Drives the online model update.
    pub fn report_path_performance(&mut self, neighbor: &RouterName, actual: f64) {
        let Some(features) = self.last_features.get(neighbor).copied() else {
            return;
        };
        let actual = actual.clamp(0.0, 1.0);

        let predicted = self.model.predict(&features);
        let error = (predicted - actual).abs();
        let n = self.statistics.model_update_count as f64;
        self.statistics.average_prediction_error =
            (self.statistics.average_prediction_error * n + error) / (n + 1.0);
        self.statistics.model_update_count += 1;

        self.model
            .update_online(&features, actual, self.learning_rate);

        let history = self.feedback.entry(neighbor.clone()).or_default();
        history.push_back(actual);
        while history.len() > MAX_PERFORMANCE_HISTORY {
            history.pop_front();
        }
    }

    /// Relative drift of recent samples against older ones, in `[0, 1]`.
    fn rtt_trend(history: &VecDeque<f64>) -> f64 {
        if history.len() < 4 {
            return 0.0;
        }
        let half = history.len() / 2;
        let older: f64 = history.iter().take(half).sum::<f64>() / half as f64;
        let recent: f64 =
            history.iter().skip(half).sum::<f64>() / (history.len() - half) as f64;
        if older <= 0.0 {
            return 0.0;
        }
        // Rising RTT is bad; falling RTT scores zero.
        ((recent - older) / older).clamp(0.0, 1.0)
    }

    /// Coefficient of variation of the history, in `[0, 1]`.
    fn rtt_variation(history: &VecDeque<f64>) -> f64 {
        if history.len() < 3 {
            return 0.0;
        }
        let n = history.len() as f64;
        let mean = history.iter().sum::<f64>() / n;
        if mean <= 0.0 {
            return 0.0;
        }
        let variance = history.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        (variance.sqrt() / mean).clamp(0.0, 1.0)
    }

    /// Probe failure pressure from the running timeout count, in `[0, 1]`.
    fn failure_rate(timeout_count: Option<u32>) -> f64 {
        let count = f64::from(timeout_count.unwrap_or(0));
        count / (count + 1.0)
    }

    /// Absolute load from the mean RTT, normalized against 200 ms.
    fn load_indicator(history: &VecDeque<f64>) -> f64 {
        if history.is_empty() {
            return 0.0;
        }
        let mean = history.iter().sum::<f64>() / history.len() as f64;
        (mean / 200.0).clamp(0.0, 1.0)
    }

    /// Age of the last validated response against a five-minute horizon.
    fn staleness(last_success: Option<Instant>, now: Instant) -> f64 {
        let Some(last) = last_success else {
            return 1.0;
        };
        let age = now
            .checked_duration_since(last)
            .unwrap_or(Duration::ZERO)
            .as_secs_f64();
        (age / STALENESS_HORIZON_SECS).clamp(0.0, 1.0)
    }

    fn extract_features(&mut self, metrics: &LinkMetrics, now: Instant) -> [f64; FEATURE_COUNT] {
        if let Some(rtt) = metrics.current_rtt {
            let history = self.rtt_history.entry(metrics.neighbor.clone()).or_default();
            history.push_back(rtt.as_secs_f64() * 1000.0);
            while history.len() > MAX_RTT_HISTORY {
                history.pop_front();
            }
        }
        static EMPTY: VecDeque<f64> = VecDeque::new();
        let history = self.rtt_history.get(&metrics.neighbor).unwrap_or(&EMPTY);
        [
            Self::rtt_trend(history),
            Self::rtt_variation(history),
            Self::failure_rate(metrics.timeout_count),
            Self::load_indicator(history),
            Self::staleness(metrics.last_success, now),
        ]
    }

    fn predict_quality(&mut self, features: &[f64; FEATURE_COUNT]) -> f64 {
        self.statistics.prediction_count += 1;
        if self.model.is_ready() {
            self.model.predict(features)
        } else {
            FIXED_WEIGHTS
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>()
                .clamp(0.0, 1.0)
        }
    }
}

impl Default for MlAdaptiveCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl CostCalculator for MlAdaptiveCalculator {
    fn name(&self) -> &'static str {
        "ml-adaptive"
    }

    fn adjusted_cost(&mut self, rtt_based_cost: f64, metrics: &LinkMetrics, now: Instant) -> f64 {
        if rtt_based_cost <= 0.0 || metrics.original_cost <= 0.0 {
            return rtt_based_cost;
        }

        let features = self.extract_features(metrics, now);
        let badness = self.predict_quality(&features);
        self.last_features
            .insert(metrics.neighbor.clone(), features);

        let adjusted = (rtt_based_cost * (1.0 + badness)).clamp(
            metrics.original_cost * MIN_COST_RATIO,
            metrics.original_cost * MAX_COST_RATIO,
        );
        tracing::trace!(
            neighbor = %metrics.neighbor,
            rtt_based_cost,
            badness,
            adjusted,
            "ml-adaptive cost"
        );
        adjusted
    }
}
