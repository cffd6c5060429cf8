use std::{
	collections::{HashMap, VecDeque},
	sync::Mutex,
};

use serde::Serialize;

const WINDOW_SIZE: usize = 1_000;
const HIGH_AVG_MS: f64 = 500.;
const MEDIUM_AVG_MS: f64 = 200.;
const SPIKE_MAX_MS: f64 = 1_000.;
const CACHE_HIT_RATE_FLOOR: f64 = 70.;
const CACHE_SLOW_AVG_MS: f64 = 100.;

#[derive(Clone, Debug, Serialize)]
pub struct OperationStats {
	pub operation: String,
	pub count: usize,
	pub avg_ms: f64,
	pub min_ms: f64,
	pub max_ms: f64,
	pub p50_ms: f64,
	pub p95_ms: f64,
	pub p99_ms: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct MetricsSummary {
	pub operations: Vec<OperationStats>,
	pub total_samples: usize,
	pub overall_avg_ms: f64,
	pub slowest_operations: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BottleneckReport {
	pub operation: String,
	pub severity: &'static str,
	pub avg_ms: f64,
	pub max_ms: f64,
	pub detail: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct CacheAdvice {
	pub hit_rate: f64,
	pub slow_operations: Vec<String>,
	pub suggestions: Vec<String>,
	pub overall_health: &'static str,
}

/// In-process timing windows, one per pipeline stage. Each window keeps
/// the newest thousand samples so the numbers follow current behavior
/// instead of process lifetime.
pub struct Monitor {
	windows: Mutex<HashMap<String, VecDeque<f64>>>,
}
impl Monitor {
	pub fn new() -> Self {
		Self { windows: Mutex::new(HashMap::new()) }
	}

	pub fn record(&self, operation: &str, duration_ms: f64) {
		if !duration_ms.is_finite() || duration_ms < 0. {
			return;
		}

		let mut windows = self.windows.lock().unwrap_or_else(|err| err.into_inner());
		let window = windows.entry(operation.to_string()).or_default();

		if window.len() == WINDOW_SIZE {
			window.pop_front();
		}

		window.push_back(duration_ms);
	}

	pub fn metrics_summary(&self) -> MetricsSummary {
		let windows = self.windows.lock().unwrap_or_else(|err| err.into_inner());
		let mut operations = windows
			.iter()
			.map(|(operation, window)| operation_stats(operation, window))
			.collect::<Vec<_>>();

		operations.sort_by(|a, b| a.operation.cmp(&b.operation));

		let total_samples = operations.iter().map(|stats| stats.count).sum::<usize>();
		let overall_avg_ms = if total_samples > 0 {
			operations.iter().map(|stats| stats.avg_ms * stats.count as f64).sum::<f64>()
				/ total_samples as f64
		} else {
			0.
		};
		let mut by_avg = operations.clone();

		by_avg.sort_by(|a, b| b.avg_ms.partial_cmp(&a.avg_ms).unwrap_or(std::cmp::Ordering::Equal));

		let slowest_operations =
			by_avg.into_iter().take(5).map(|stats| stats.operation).collect();

		MetricsSummary { operations, total_samples, overall_avg_ms, slowest_operations }
	}

	/// Flags operations whose timings look pathological, most severe
	/// first.
	pub fn identify_bottlenecks(&self) -> Vec<BottleneckReport> {
		let summary = self.metrics_summary();
		let mut reports = Vec::new();

		for stats in &summary.operations {
			if stats.avg_ms > HIGH_AVG_MS {
				reports.push(BottleneckReport {
					operation: stats.operation.clone(),
					severity: "high",
					avg_ms: stats.avg_ms,
					max_ms: stats.max_ms,
					detail: format!("Average latency {:.0}ms.", stats.avg_ms),
				});
			} else if stats.avg_ms > MEDIUM_AVG_MS {
				reports.push(BottleneckReport {
					operation: stats.operation.clone(),
					severity: "medium",
					avg_ms: stats.avg_ms,
					max_ms: stats.max_ms,
					detail: format!("Average latency {:.0}ms.", stats.avg_ms),
				});
			} else if stats.max_ms > SPIKE_MAX_MS && stats.max_ms > 3. * stats.avg_ms {
				reports.push(BottleneckReport {
					operation: stats.operation.clone(),
					severity: "low",
					avg_ms: stats.avg_ms,
					max_ms: stats.max_ms,
					detail: format!("Latency spikes up to {:.0}ms.", stats.max_ms),
				});
			}
		}

		reports.sort_by_key(|report| severity_rank(report.severity));

		reports
	}

	/// Suggests cache tuning from the observed hit rate and per-stage
	/// latencies. Any stage averaging above 100ms is a pre-warming
	/// candidate.
	pub fn optimize_cache_strategy(&self, hit_rate: f64) -> CacheAdvice {
		let summary = self.metrics_summary();
		let slow_operations = summary
			.operations
			.iter()
			.filter(|stats| stats.avg_ms > CACHE_SLOW_AVG_MS)
			.map(|stats| stats.operation.clone())
			.collect::<Vec<_>>();
		let mut suggestions = Vec::new();

		if hit_rate < CACHE_HIT_RATE_FLOOR {
			suggestions.push(format!(
				"Hit rate is {hit_rate:.1}%; consider longer TTLs or prewarming frequent queries."
			));
		}

		for operation in &slow_operations {
			suggestions
				.push(format!("{operation} averages above 100ms; pre-warm its cache entries."));
		}

		let overall_health = if suggestions.is_empty() { "good" } else { "needs_attention" };

		CacheAdvice { hit_rate, slow_operations, suggestions, overall_health }
	}
}
impl Default for Monitor {
	fn default() -> Self {
		Self::new()
	}
}

fn severity_rank(severity: &str) -> u8 {
	match severity {
		"high" => 0,
		"medium" => 1,
		_ => 2,
	}
}

fn operation_stats(operation: &str, window: &VecDeque<f64>) -> OperationStats {
	let mut sorted = window.iter().copied().collect::<Vec<_>>();

	sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

	let count = sorted.len();
	let sum = sorted.iter().sum::<f64>();
	let avg_ms = if count > 0 { sum / count as f64 } else { 0. };

	OperationStats {
		operation: operation.to_string(),
		count,
		avg_ms,
		min_ms: sorted.first().copied().unwrap_or(0.),
		max_ms: sorted.last().copied().unwrap_or(0.),
		p50_ms: percentile(&sorted, 50.),
		p95_ms: percentile(&sorted, 95.),
		p99_ms: percentile(&sorted, 99.),
	}
}

/// Nearest-rank percentile over a sorted sample list.
fn percentile(sorted: &[f64], p: f64) -> f64 {
	if sorted.is_empty() {
		return 0.;
	}

	let index = ((p / 100. * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);

	sorted[index]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn percentile_uses_nearest_rank() {
		let sorted = [10., 20., 30., 40., 50.];

		assert_eq!(percentile(&sorted, 50.), 30.);
		assert_eq!(percentile(&sorted, 95.), 50.);
		assert_eq!(percentile(&sorted, 99.), 50.);
		assert_eq!(percentile(&[], 50.), 0.);
	}

	#[test]
	fn windows_keep_the_newest_samples() {
		let monitor = Monitor::new();

		for sample in 0..(WINDOW_SIZE + 10) {
			monitor.record("embed", sample as f64);
		}

		let summary = monitor.metrics_summary();
		let stats = &summary.operations[0];

		assert_eq!(stats.count, WINDOW_SIZE);
		assert_eq!(stats.min_ms, 10.);
	}

	#[test]
	fn bottlenecks_are_ranked_by_severity() {
		let monitor = Monitor::new();

		monitor.record("fast", 10.);

		for _ in 0..10 {
			monitor.record("spiky", 20.);
		}

		monitor.record("spiky", 1_500.);
		monitor.record("slow", 600.);
		monitor.record("warm", 300.);

		let reports = monitor.identify_bottlenecks();
		let severities =
			reports.iter().map(|report| report.severity).collect::<Vec<_>>();

		assert_eq!(severities, ["high", "medium", "low"]);
		assert_eq!(reports[0].operation, "slow");
	}

	#[test]
	fn cache_advice_flags_low_hit_rate() {
		let monitor = Monitor::new();
		let advice = monitor.optimize_cache_strategy(42.);

		assert_eq!(advice.overall_health, "needs_attention");
		assert_eq!(advice.suggestions.len(), 1);

		let healthy = monitor.optimize_cache_strategy(90.);

		assert_eq!(healthy.overall_health, "good");
		assert!(healthy.suggestions.is_empty());
	}

	#[test]
	fn cache_advice_marks_slow_stages_for_prewarming() {
		let monitor = Monitor::new();

		monitor.record("embedding", 250.);
		monitor.record("enrichment", 15.);

		let advice = monitor.optimize_cache_strategy(90.);

		assert_eq!(advice.slow_operations, ["embedding"]);
		assert_eq!(advice.overall_health, "needs_attention");
		assert!(advice.suggestions[0].contains("embedding"));
	}
}
