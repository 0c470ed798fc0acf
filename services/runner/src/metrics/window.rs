//! Dual-window aggregation over replayed samples.
//!
//! Every pass rebuilds a 60s stable window and a 6s panic window from the
//! same scan. A node contributes the average of its samples inside the
//! window; a workload's value is the sum of its node averages. The panic
//! value wins when it diverges sharply from the stable one, which makes a
//! sudden burst (or drain) act within one pass instead of waiting for the
//! stable window to catch up.

use std::collections::BTreeMap;

use strato_model::Target;

use super::store::SampleRecord;

/// Stable window width in seconds.
pub const STABLE_WINDOW_SECS: i64 = 60;
/// Panic window width in seconds.
pub const PANIC_WINDOW_SECS: i64 = 6;

#[derive(Debug, Default, Clone, Copy)]
struct RunningAverage {
    sum: f64,
    count: u64,
}

impl RunningAverage {
    fn observe(&mut self, value: i64) {
        self.sum += value as f64;
        self.count += 1;
    }

    fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }
}

/// One workload's scale decision for a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleDecision {
    pub target: Target,
    pub value: f64,
}

/// Per-workload node averages over both windows.
#[derive(Debug, Default)]
pub struct WindowSet {
    stable: BTreeMap<Target, BTreeMap<String, RunningAverage>>,
    panic: BTreeMap<Target, BTreeMap<String, RunningAverage>>,
}

impl WindowSet {
    pub fn build(records: &[SampleRecord], now_secs: i64) -> Self {
        let mut windows = Self::default();
        for record in records {
            let age_secs = now_secs - record.timestamp_secs;
            if age_secs <= STABLE_WINDOW_SECS {
                windows.observe_stable(record);
            }
            if age_secs <= PANIC_WINDOW_SECS {
                windows.observe_panic(record);
            }
        }
        windows
    }

    fn observe_stable(&mut self, record: &SampleRecord) {
        self.stable
            .entry(record.target.clone())
            .or_default()
            .entry(record.node_id.clone())
            .or_default()
            .observe(record.value);
    }

    fn observe_panic(&mut self, record: &SampleRecord) {
        self.panic
            .entry(record.target.clone())
            .or_default()
            .entry(record.node_id.clone())
            .or_default()
            .observe(record.value);
    }

    /// Sum of node averages in the stable window.
    pub fn stable_value(&self, target: &Target) -> Option<f64> {
        self.stable.get(target).map(sum_of_node_averages)
    }

    /// Sum of node averages in the panic window.
    pub fn panic_value(&self, target: &Target) -> Option<f64> {
        self.panic.get(target).map(sum_of_node_averages)
    }

    /// The value a pass would act on for one workload.
    pub fn value_for(&self, target: &Target) -> Option<f64> {
        resolve(self.stable_value(target), self.panic_value(target))
    }

    /// Resolve every workload seen in either window, consuming the set.
    pub fn into_decisions(mut self) -> Vec<ScaleDecision> {
        let mut decisions = Vec::with_capacity(self.stable.len());

        for (target, nodes) in self.stable {
            let stable = sum_of_node_averages(&nodes);
            let panic = self.panic.remove(&target).map(|n| sum_of_node_averages(&n));
            if let Some(value) = resolve(Some(stable), panic) {
                decisions.push(ScaleDecision { target, value });
            }
        }

        // Workloads with panic history only.
        for (target, nodes) in self.panic {
            decisions.push(ScaleDecision {
                target,
                value: sum_of_node_averages(&nodes),
            });
        }

        decisions
    }
}

fn sum_of_node_averages(nodes: &BTreeMap<String, RunningAverage>) -> f64 {
    nodes.values().map(RunningAverage::average).sum()
}

/// Pick between the stable and panic values. The panic value applies when
/// it at least doubles or at most halves the stable one.
pub fn resolve(stable: Option<f64>, panic: Option<f64>) -> Option<f64> {
    match (stable, panic) {
        (Some(stable), Some(panic)) => {
            if panic >= stable * 2.0 || panic <= stable / 2.0 {
                Some(panic)
            } else {
                Some(stable)
            }
        }
        (Some(stable), None) => Some(stable),
        (None, Some(panic)) => Some(panic),
        (None, None) => None,
    }
}

/// Round a resolved value for the driver, halves away from zero.
pub fn to_adjust_value(value: f64) -> i64 {
    value.round() as i64
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn record(target: &Target, node: &str, value: i64, age_secs: i64) -> SampleRecord {
        SampleRecord {
            target: target.clone(),
            node_id: node.to_string(),
            value,
            timestamp_secs: 1_000_000 - age_secs,
        }
    }

    const NOW: i64 = 1_000_000;

    #[test]
    fn test_node_average_then_sum() {
        let target = Target::new("acme", "checkout", "v1");
        let records = vec![
            record(&target, "node-a", 10, 50),
            record(&target, "node-a", 20, 40),
            record(&target, "node-a", 30, 30),
            record(&target, "node-b", 4, 20),
        ];

        let windows = WindowSet::build(&records, NOW);
        // node-a averages to 20, node-b to 4.
        assert_eq!(windows.stable_value(&target), Some(24.0));
        assert_eq!(windows.panic_value(&target), None);
        assert_eq!(windows.value_for(&target), Some(24.0));
    }

    #[test]
    fn test_samples_older_than_stable_window_ignored() {
        let target = Target::new("acme", "checkout", "v1");
        let records = vec![
            record(&target, "node-a", 100, 90),
            record(&target, "node-a", 10, 10),
        ];

        let windows = WindowSet::build(&records, NOW);
        assert_eq!(windows.stable_value(&target), Some(10.0));
    }

    #[test]
    fn test_recent_samples_land_in_both_windows() {
        let target = Target::new("acme", "checkout", "v1");
        let records = vec![
            record(&target, "node-a", 10, 30),
            record(&target, "node-a", 40, 2),
        ];

        let windows = WindowSet::build(&records, NOW);
        assert_eq!(windows.stable_value(&target), Some(25.0));
        assert_eq!(windows.panic_value(&target), Some(40.0));
    }

    #[rstest]
    #[case::burst_doubles(10.0, 20.0, 20.0)]
    #[case::drain_halves(10.0, 5.0, 5.0)]
    #[case::mild_rise_holds_stable(10.0, 15.0, 10.0)]
    #[case::mild_dip_holds_stable(10.0, 6.0, 10.0)]
    #[case::zero_panic_wins(10.0, 0.0, 0.0)]
    fn test_resolve_panic_rule(#[case] stable: f64, #[case] panic: f64, #[case] expected: f64) {
        assert_eq!(resolve(Some(stable), Some(panic)), Some(expected));
    }

    #[test]
    fn test_resolve_single_window() {
        assert_eq!(resolve(Some(12.0), None), Some(12.0));
        assert_eq!(resolve(None, Some(7.0)), Some(7.0));
        assert_eq!(resolve(None, None), None);
    }

    #[test]
    fn test_decisions_cover_both_windows_once() {
        let hot = Target::new("acme", "checkout", "v1");
        let quiet = Target::new("acme", "billing", "v2");
        let records = vec![
            record(&hot, "node-a", 10, 30),
            record(&hot, "node-a", 40, 2),
            record(&quiet, "node-a", 3, 45),
        ];

        let decisions = WindowSet::build(&records, NOW).into_decisions();
        assert_eq!(decisions.len(), 2);

        let hot_decision = decisions.iter().find(|d| d.target == hot).unwrap();
        // Panic 40 vs stable 25: below the 2x bar, stable holds.
        assert_eq!(hot_decision.value, 25.0);

        let quiet_decision = decisions.iter().find(|d| d.target == quiet).unwrap();
        assert_eq!(quiet_decision.value, 3.0);
    }

    #[rstest]
    #[case(0.4, 0)]
    #[case(0.5, 1)]
    #[case(1.5, 2)]
    #[case(-0.5, -1)]
    #[case(-1.4, -1)]
    fn test_rounding_half_away_from_zero(#[case] value: f64, #[case] expected: i64) {
        assert_eq!(to_adjust_value(value), expected);
    }
}
