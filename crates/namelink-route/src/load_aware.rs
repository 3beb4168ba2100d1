//! Load-aware cost adjustment.
//!
//! Transforms the rtt-based baseline cost into a composite cost from three
//! factors: the latency class of the current RTT, the load on the link read
//! from RTT variance, and the stability of the link read from timeout counts
//! and time since the last validated response. The output is clamped to
//! `[0.5, 3.0] x` the configured cost so one noisy input cannot swing routing
//! arbitrarily far.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use namelink_core::RouterName;

use crate::metrics::{CostCalculator, LinkMetrics};

/// Samples kept per neighbor for the load factor.
pub const MAX_RTT_HISTORY: usize = 16;

/// RTT class thresholds in milliseconds.
const RTT_THRESHOLD_EXCELLENT: f64 = 10.0;
const RTT_THRESHOLD_GOOD: f64 = 50.0;
const RTT_THRESHOLD_FAIR: f64 = 100.0;
const RTT_THRESHOLD_POOR: f64 = 200.0;

/// Lower clamp on the adjusted cost, as a multiple of the configured cost.
const MIN_COST_RATIO: f64 = 0.5;

/// Upper clamp on the adjusted cost, as a multiple of the configured cost.
const MAX_COST_RATIO: f64 = 3.0;

/// Age of the last success after which the stability penalty starts.
const STALE_SUCCESS_SECS: f64 = 60.0;

/// Weights of the three factors in the composite adjustment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostWeights {
    pub rtt: f64,
    pub load: f64,
    pub stability: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            rtt: 0.3,
            load: 0.4,
            stability: 0.3,
        }
    }
}

/// RTT factor: stepwise penalty by latency class.
#[must_use]
pub fn rtt_factor(current_rtt: Option<Duration>) -> f64 {
    let Some(rtt) = current_rtt else {
        return 0.0;
    };
    let rtt_ms = rtt.as_secs_f64() * 1000.0;
    if rtt_ms <= RTT_THRESHOLD_EXCELLENT {
        0.0
    } else if rtt_ms <= RTT_THRESHOLD_GOOD {
        0.2
    } else if rtt_ms <= RTT_THRESHOLD_FAIR {
        0.5
    } else if rtt_ms <= RTT_THRESHOLD_POOR {
        1.0
    } else {
        2.0
    }
}

/// Load factor over an RTT history: coefficient of variation, stepwise.
///
/// Fewer than three samples is not enough signal; the standard deviation is
/// the population form (divisor `n`), matching the routing calculator this
/// feeds.
#[must_use]
pub fn load_factor(history: &VecDeque<f64>) -> f64 {
    if history.len() < 3 {
        return 0.0;
    }
    let n = history.len() as f64;
    let mean = history.iter().sum::<f64>() / n;
    let variance = history.iter().map(|rtt| (rtt - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let variation = if mean > 0.0 { stddev / mean } else { 0.0 };

    if variation <= 0.1 {
        0.0
    } else if variation <= 0.2 {
        0.3
    } else if variation <= 0.5 {
        0.7
    } else {
        1.5
    }
}

/// Stability factor: timeout penalty plus a staleness penalty once the last
/// validated response is more than a minute old.
#[must_use]
pub fn stability_factor(
    timeout_count: Option<u32>,
    last_success: Option<Instant>,
    now: Instant,
) -> f64 {
    let mut factor = 0.0;
    if let Some(count) = timeout_count {
        factor += 0.2 * f64::from(count);
    }
    if let Some(last) = last_success {
        let since = now
            .checked_duration_since(last)
            .unwrap_or(Duration::ZERO)
            .as_secs_f64();
        if since > STALE_SUCCESS_SECS {
            factor += f64::min(2.0, since / STALE_SUCCESS_SECS * 0.1);
        }
    }
    factor
}

/// The load-aware cost calculator: per-neighbor RTT history plus the
/// composite formula.
#[must_use]
pub struct LoadAwareCostCalculator {
    weights: CostWeights,
    history: BTreeMap<RouterName, VecDeque<f64>>,
    adjustment_count: u64,
}

impl LoadAwareCostCalculator {
    pub fn new(weights: CostWeights) -> Self {
        Self {
            weights,
            history: BTreeMap::new(),
            adjustment_count: 0,
        }
    }

    #[must_use]
    pub fn adjustment_count(&self) -> u64 {
        self.adjustment_count
    }

    /// Append one RTT sample (milliseconds), creating the history lazily and
    /// dropping the oldest sample on overflow.
    fn push_sample(&mut self, neighbor: &RouterName, rtt_ms: f64) {
        let history = self.history.entry(neighbor.clone()).or_default();
        history.push_back(rtt_ms);
        while history.len() > MAX_RTT_HISTORY {
            history.pop_front();
        }
    }

    /// The load factor for one query: fold the current RTT into the history
    /// first, then read the variation off everything recorded so far.
    fn load_factor_for(&mut self, metrics: &LinkMetrics) -> f64 {
        if let Some(rtt) = metrics.current_rtt {
            self.push_sample(&metrics.neighbor, rtt.as_secs_f64() * 1000.0);
        }
        self.history
            .get(&metrics.neighbor)
            .map_or(0.0, load_factor)
    }
}

impl Default for LoadAwareCostCalculator {
    fn default() -> Self {
        Self::new(CostWeights::default())
    }
}

impl CostCalculator for LoadAwareCostCalculator {
    fn name(&self) -> &'static str {
        "load-aware"
    }

    fn adjusted_cost(&mut self, rtt_based_cost: f64, metrics: &LinkMetrics, now: Instant) -> f64 {
        if rtt_based_cost <= 0.0 || metrics.original_cost <= 0.0 {
            return rtt_based_cost;
        }

        let rtt = rtt_factor(metrics.current_rtt);
        let load = self.load_factor_for(metrics);
        let stability = stability_factor(metrics.timeout_count, metrics.last_success, now);

        let adjustment =
            self.weights.rtt * rtt + self.weights.load * load + self.weights.stability * stability;
        let adjusted = (rtt_based_cost * (1.0 + adjustment)).clamp(
            metrics.original_cost * MIN_COST_RATIO,
            metrics.original_cost * MAX_COST_RATIO,
        );

        if let Some(current) = metrics.current_rtt {
            self.push_sample(&metrics.neighbor, current.as_secs_f64() * 1000.0);
        }

        self.adjustment_count += 1;
        tracing::trace!(
            neighbor = %metrics.neighbor,
            rtt_based_cost,
            rtt,
            load,
            stability,
            adjusted,
            "load-aware cost"
        );
        adjusted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> RouterName {
        RouterName::from_uri(uri).unwrap()
    }

    fn make_metrics(original_cost: f64) -> LinkMetrics {
        LinkMetrics {
            neighbor: name("/site/b"),
            original_cost,
            current_rtt: None,
            timeout_count: None,
            last_success: None,
        }
    }

    fn seed_history(calculator: &mut LoadAwareCostCalculator, neighbor: &RouterName, samples: &[f64]) {
        for &sample in samples {
            calculator.push_sample(neighbor, sample);
        }
    }

    // === rtt_factor boundaries ===

    #[test]
    fn rtt_factor_table() {
        let ms = |v: u64| Some(Duration::from_millis(v));
        assert_eq!(rtt_factor(None), 0.0);
        assert_eq!(rtt_factor(ms(10)), 0.0);
        assert_eq!(rtt_factor(Some(Duration::from_nanos(10_000_100))), 0.2);
        assert_eq!(rtt_factor(ms(50)), 0.2);
        assert_eq!(rtt_factor(ms(51)), 0.5);
        assert_eq!(rtt_factor(ms(100)), 0.5);
        assert_eq!(rtt_factor(ms(101)), 1.0);
        assert_eq!(rtt_factor(ms(200)), 1.0);
        assert_eq!(rtt_factor(ms(201)), 2.0);
    }

    // === load_factor boundaries ===

    #[test]
    fn load_factor_needs_three_samples() {
        let mut history = VecDeque::from(vec![100.0, 200.0]);
        assert_eq!(load_factor(&history), 0.0);
        history.push_back(300.0);
        assert!(load_factor(&history) > 0.0);
    }

    #[test]
    fn load_factor_variation_boundaries() {
        // Identical samples: v = 0.
        assert_eq!(load_factor(&VecDeque::from(vec![50.0; 5])), 0.0);

        // The history {100-d, 100-d, 100+d, 100+d} has mean 100 and
        // population stddev exactly d, so v = d / 100 with no rounding.
        let with_spread =
            |d: f64| VecDeque::from(vec![100.0 - d, 100.0 - d, 100.0 + d, 100.0 + d]);

        // v exactly 0.1 stays in the lowest band; just above moves out.
        assert_eq!(load_factor(&with_spread(10.0)), 0.0);
        assert_eq!(load_factor(&with_spread(11.0)), 0.3);

        // v exactly 0.2 is still the 0.3 band; 0.3 sits in the 0.7 band.
        assert_eq!(load_factor(&with_spread(20.0)), 0.3);
        assert_eq!(load_factor(&with_spread(30.0)), 0.7);

        // v exactly 0.5 holds at 0.7; above it is the unstable band.
        assert_eq!(load_factor(&with_spread(50.0)), 0.7);
        assert_eq!(load_factor(&with_spread(60.0)), 1.5);
    }

    #[test]
    fn load_factor_zero_mean_is_zero() {
        assert_eq!(load_factor(&VecDeque::from(vec![0.0; 4])), 0.0);
    }

    #[test]
    fn load_factor_uses_population_stddev() {
        // {4, 6, 8}: mean 6, population variance 8/3, stddev 1.632...
        // v = 0.2721 -> band 0.7. With the sample form (divisor n-1) the
        // stddev would be 2.0 and v = 1/3, still 0.7 - so pick a case where
        // the two disagree: {90, 100, 110}: population v = 0.0816 -> 0.0,
        // sample v = 0.1 -> still 0.0. Use {88, 100, 112}:
        // population stddev = 9.798, v = 0.09798 -> 0.0
        // sample stddev = 12.0, v = 0.12 -> 0.3
        let history = VecDeque::from(vec![88.0, 100.0, 112.0]);
        assert_eq!(load_factor(&history), 0.0);
    }

    // === stability_factor ===

    #[test]
    fn stability_factor_zero_when_healthy() {
        let now = Instant::now();
        assert_eq!(stability_factor(Some(0), Some(now), now), 0.0);
        assert_eq!(stability_factor(None, None, now), 0.0);
    }

    #[test]
    fn stability_factor_timeout_penalty() {
        let now = Instant::now();
        assert!((stability_factor(Some(3), None, now) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn stability_factor_staleness_penalty() {
        let t0 = Instant::now();
        // 60s is not yet stale.
        assert_eq!(
            stability_factor(None, Some(t0), t0 + Duration::from_secs(60)),
            0.0
        );
        // 120s: 120/60 * 0.1 = 0.2.
        let factor = stability_factor(None, Some(t0), t0 + Duration::from_secs(120));
        assert!((factor - 0.2).abs() < 1e-9);
        // Very stale: capped at 2.0.
        let factor = stability_factor(None, Some(t0), t0 + Duration::from_secs(7200));
        assert!((factor - 2.0).abs() < 1e-9);
    }

    // === composite formula ===

    #[test]
    fn non_positive_inputs_pass_through_unchanged() {
        let mut calculator = LoadAwareCostCalculator::default();
        let now = Instant::now();
        assert_eq!(calculator.adjusted_cost(-5.0, &make_metrics(100.0), now), -5.0);
        assert_eq!(calculator.adjusted_cost(0.0, &make_metrics(100.0), now), 0.0);
        assert_eq!(calculator.adjusted_cost(80.0, &make_metrics(0.0), now), 80.0);
        assert_eq!(calculator.adjustment_count(), 0);
    }

    #[test]
    fn quiet_link_with_short_history_is_rtt_factor_only() {
        let mut calculator = LoadAwareCostCalculator::default();
        let now = Instant::now();
        let mut metrics = make_metrics(100.0);
        metrics.current_rtt = Some(Duration::from_millis(60));
        metrics.timeout_count = Some(0);
        metrics.last_success = Some(now);

        // One prior sample; the query appends twice, so the load factor sees
        // two samples and stays zero.
        seed_history(&mut calculator, &metrics.neighbor, &[60.0]);
        let adjusted = calculator.adjusted_cost(100.0, &metrics, now);
        // 100 * (1 + 0.3 * 0.5) = 115
        assert!((adjusted - 115.0).abs() < 1e-9);
    }

    #[test]
    fn composite_adjustment_matches_hand_computation() {
        // originalCost=100, rttBasedCost=100, currentRtt=60ms, 2 timeouts,
        // last success 120s ago, seeded history {40,50,60,70,80}.
        let mut calculator = LoadAwareCostCalculator::default();
        let t0 = Instant::now();
        let now = t0 + Duration::from_secs(120);
        let mut metrics = make_metrics(100.0);
        metrics.current_rtt = Some(Duration::from_millis(60));
        metrics.timeout_count = Some(2);
        metrics.last_success = Some(t0);

        seed_history(&mut calculator, &metrics.neighbor, &[40.0, 50.0, 60.0, 70.0, 80.0]);

        // rtt factor: 60ms -> 0.5
        // load factor: history becomes {40,50,60,70,80,60}, mean 60,
        //   population stddev 12.91, v = 0.215 -> 0.7
        // stability: 2 * 0.2 + min(2.0, 120/60 * 0.1) = 0.6
        // adjustment = 0.3*0.5 + 0.4*0.7 + 0.3*0.6 = 0.61
        let adjusted = calculator.adjusted_cost(100.0, &metrics, now);
        assert!((adjusted - 161.0).abs() < 1e-9);
        assert_eq!(calculator.adjustment_count(), 1);
    }

    #[test]
    fn clamp_low() {
        // All factors zero, cheap baseline: clamped up to half the original.
        let mut calculator = LoadAwareCostCalculator::default();
        let adjusted = calculator.adjusted_cost(10.0, &make_metrics(100.0), Instant::now());
        assert_eq!(adjusted, 50.0);
    }

    #[test]
    fn clamp_high() {
        // Maximal factors: 0.3*2 + 0.4*1.5 + 0.3*2 = 1.8 -> 200 * 2.8 = 560,
        // clamped down to 3x the original.
        let mut calculator = LoadAwareCostCalculator::default();
        let t0 = Instant::now();
        let now = t0 + Duration::from_secs(7200);
        let mut metrics = make_metrics(100.0);
        metrics.current_rtt = Some(Duration::from_millis(500));
        metrics.timeout_count = Some(10);
        metrics.last_success = Some(t0);
        // Wildly varying history for the 1.5 load band.
        seed_history(
            &mut calculator,
            &metrics.neighbor,
            &[10.0, 500.0, 10.0, 500.0, 10.0],
        );

        let adjusted = calculator.adjusted_cost(200.0, &metrics, now);
        assert_eq!(adjusted, 300.0);
    }

    #[test]
    fn each_query_with_rtt_appends_two_samples() {
        let mut calculator = LoadAwareCostCalculator::default();
        let mut metrics = make_metrics(100.0);
        metrics.current_rtt = Some(Duration::from_millis(60));

        calculator.adjusted_cost(100.0, &metrics, Instant::now());
        assert_eq!(calculator.history[&metrics.neighbor].len(), 2);

        calculator.adjusted_cost(100.0, &metrics, Instant::now());
        assert_eq!(calculator.history[&metrics.neighbor].len(), 4);
    }

    #[test]
    fn query_without_rtt_leaves_history_untouched() {
        let mut calculator = LoadAwareCostCalculator::default();
        let metrics = make_metrics(100.0);
        calculator.adjusted_cost(100.0, &metrics, Instant::now());
        assert!(!calculator.history.contains_key(&metrics.neighbor));
    }

    #[test]
    fn history_is_bounded_fifo() {
        let mut calculator = LoadAwareCostCalculator::default();
        let neighbor = name("/site/b");
        for i in 0..(MAX_RTT_HISTORY + 5) {
            calculator.push_sample(&neighbor, i as f64);
        }
        let history = &calculator.history[&neighbor];
        assert_eq!(history.len(), MAX_RTT_HISTORY);
        // Oldest samples were dropped from the front.
        assert_eq!(*history.front().unwrap(), 5.0);
        assert_eq!(*history.back().unwrap(), (MAX_RTT_HISTORY + 4) as f64);
    }

    #[test]
    fn histories_are_per_neighbor() {
        let mut calculator = LoadAwareCostCalculator::default();
        calculator.push_sample(&name("/site/b"), 10.0);
        calculator.push_sample(&name("/site/c"), 20.0);
        assert_eq!(calculator.history.len(), 2);
        assert_eq!(calculator.history[&name("/site/b")].len(), 1);
    }
}
