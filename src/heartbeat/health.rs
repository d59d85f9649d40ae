//! Health score and status derivation (§4.D, §9).
//!
//! The rolling health score is a weighted combination of the most recent
//! heartbeat samples; status is derived from the score plus a few hard
//! overrides (disk pressure, declared maintenance, decommissioning) that
//! take precedence over the numeric score.

use crate::db::schemas::{HealthTrend, NodeStatus};

/// Raw metrics reported in a single heartbeat (§3 Heartbeat payload).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeartbeatSample {
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub disk_pct: f64,
    pub failed_processes: u32,
}

impl HeartbeatSample {
    /// 0-100 score for a single sample: starts at 100, loses points for
    /// resource pressure and failed processes (§9 weighting decision — CPU
    /// and memory pressure count equally, disk pressure is weighted
    /// slightly higher since it tends to precede outright failure, and each
    /// failed process is a flat penalty).
    pub fn score(&self) -> f64 {
        let mut score = 100.0;
        score -= (self.cpu_pct / 100.0) * 20.0;
        score -= (self.mem_pct / 100.0) * 20.0;
        score -= (self.disk_pct / 100.0) * 30.0;
        score -= (self.failed_processes as f64) * 10.0;
        score.clamp(0.0, 100.0)
    }
}

/// Folds a window of recent samples into a single 0-100 score using a
/// simple recency-weighted average (most recent sample weighted highest).
pub fn rolling_score(samples: &[HeartbeatSample]) -> u8 {
    if samples.is_empty() {
        return 100;
    }
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (i, sample) in samples.iter().enumerate() {
        let weight = (i + 1) as f64;
        weighted_sum += sample.score() * weight;
        weight_total += weight;
    }
    (weighted_sum / weight_total).round().clamp(0.0, 100.0) as u8
}

/// Derives a trend by comparing the most recent score against the average
/// of the samples preceding it within the trend window.
pub fn derive_trend(scores: &[u8]) -> HealthTrend {
    if scores.len() < 2 {
        return HealthTrend::Flat;
    }
    let (latest, rest) = scores.split_last().expect("checked non-empty above");
    let rest_avg = rest.iter().map(|&s| s as f64).sum::<f64>() / rest.len() as f64;
    let latest = *latest as f64;
    if latest > rest_avg + 2.0 {
        HealthTrend::Up
    } else if latest < rest_avg - 2.0 {
        HealthTrend::Down
    } else {
        HealthTrend::Flat
    }
}

/// Derives the node's reported status from the health score and hard
/// overrides. Maintenance and Decommissioned are administrator-set and
/// always take precedence over what the heartbeat itself would imply
/// (§9 Open question, decided: administrator state wins over telemetry).
///
/// Degraded whenever the score drops below threshold, disk pressure
/// exceeds the threshold, or any warning was reported (§4.D step 4).
pub fn derive_status(
    current_status: NodeStatus,
    score: u8,
    disk_pct: f64,
    has_warnings: bool,
    degraded_below: u8,
    disk_degraded_pct: f64,
) -> NodeStatus {
    if matches!(current_status, NodeStatus::Maintenance | NodeStatus::Decommissioned) {
        return current_status;
    }
    if score < degraded_below || disk_pct > disk_degraded_pct || has_warnings {
        NodeStatus::Degraded
    } else {
        NodeStatus::Online
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_sample_scores_near_100() {
        let sample = HeartbeatSample::default();
        assert_eq!(sample.score(), 100.0);
    }

    #[test]
    fn disk_pressure_weighted_higher_than_cpu() {
        let disk_heavy = HeartbeatSample { disk_pct: 100.0, ..Default::default() };
        let cpu_heavy = HeartbeatSample { cpu_pct: 100.0, ..Default::default() };
        assert!(disk_heavy.score() < cpu_heavy.score());
    }

    #[test]
    fn rolling_score_weights_recent_samples_more() {
        let samples = vec![
            HeartbeatSample { cpu_pct: 100.0, ..Default::default() },
            HeartbeatSample::default(),
        ];
        let score = rolling_score(&samples);
        // The healthy (most recent) sample should pull the average up
        // past the midpoint between a failing and a healthy sample.
        assert!(score > 70);
    }

    #[test]
    fn trend_detects_improvement_and_decline() {
        assert_eq!(derive_trend(&[50, 50, 80]), HealthTrend::Up);
        assert_eq!(derive_trend(&[90, 90, 60]), HealthTrend::Down);
        assert_eq!(derive_trend(&[70, 71, 70]), HealthTrend::Flat);
    }

    #[test]
    fn maintenance_overrides_score_derived_status() {
        let status = derive_status(NodeStatus::Maintenance, 10, 99.0, false, 50, 90.0);
        assert_eq!(status, NodeStatus::Maintenance);
    }

    #[test]
    fn disk_pressure_forces_degraded_even_with_high_score() {
        let status = derive_status(NodeStatus::Online, 95, 95.0, false, 50, 90.0);
        assert_eq!(status, NodeStatus::Degraded);
    }

    #[test]
    fn disk_exactly_at_threshold_does_not_alone_force_degraded() {
        let status = derive_status(NodeStatus::Online, 95, 90.0, false, 50, 90.0);
        assert_eq!(status, NodeStatus::Online);
    }

    #[test]
    fn warnings_force_degraded_even_with_high_score() {
        let status = derive_status(NodeStatus::Online, 95, 10.0, true, 50, 90.0);
        assert_eq!(status, NodeStatus::Degraded);
    }
}
