//! Rolling health statistics for one provider on one network.

use civic_types::{CircuitState, HealthStatus, Network, ProviderHealth};
use std::collections::VecDeque;

/// Samples retained per provider and network.
pub const HEALTH_WINDOW_SIZE: usize = 100;

#[derive(Debug, Clone, Copy)]
struct Sample {
	success: bool,
	latency_ms: u64,
}

/// Bounded window of attempt outcomes.
///
/// Success rate covers every retained sample; latency figures cover only the
/// successful ones, since failed attempts usually end at a timeout.
#[derive(Debug, Clone, Default)]
pub struct HealthWindow {
	samples: VecDeque<Sample>,
	/// Attempts recorded since the last reset, not capped by the window.
	total_requests: u64,
}

impl HealthWindow {
	pub fn new() -> Self {
		Self {
			samples: VecDeque::with_capacity(HEALTH_WINDOW_SIZE),
			total_requests: 0,
		}
	}

	pub fn record_success(&mut self, latency_ms: u64) {
		self.push(Sample {
			success: true,
			latency_ms,
		});
	}

	pub fn record_failure(&mut self, latency_ms: u64) {
		self.push(Sample {
			success: false,
			latency_ms,
		});
	}

	fn push(&mut self, sample: Sample) {
		if self.samples.len() == HEALTH_WINDOW_SIZE {
			self.samples.pop_front();
		}
		self.samples.push_back(sample);
		self.total_requests += 1;
	}

	pub fn total_requests(&self) -> u64 {
		self.total_requests
	}

	/// Percentage of successful samples. A window without samples reports 100.
	pub fn success_rate(&self) -> f64 {
		if self.samples.is_empty() {
			return 100.0;
		}
		let successes = self.samples.iter().filter(|s| s.success).count();
		successes as f64 / self.samples.len() as f64 * 100.0
	}

	fn success_latencies(&self) -> Vec<u64> {
		self.samples
			.iter()
			.filter(|s| s.success)
			.map(|s| s.latency_ms)
			.collect()
	}

	pub fn average_latency_ms(&self) -> f64 {
		mean(&self.success_latencies())
	}

	/// 95th percentile of successful latencies, never below the rounded-up mean.
	pub fn p95_latency_ms(&self) -> u64 {
		let mut latencies = self.success_latencies();
		latencies.sort_unstable();
		let average = mean(&latencies);
		percentile(&latencies, 0.95).max(average.ceil() as u64)
	}

	/// Builds a consistent snapshot. Callers hold the window's lock.
	pub fn snapshot(&self, provider: &str, network: Network, circuit: CircuitState) -> ProviderHealth {
		let success_rate = self.success_rate();
		ProviderHealth {
			provider: provider.to_string(),
			network,
			total_requests: self.total_requests,
			success_rate,
			average_latency_ms: self.average_latency_ms(),
			p95_latency_ms: self.p95_latency_ms(),
			status: HealthStatus::classify(success_rate, circuit),
			circuit_breaker_state: circuit,
		}
	}

	pub fn clear(&mut self) {
		self.samples.clear();
		self.total_requests = 0;
	}
}

fn mean(values: &[u64]) -> f64 {
	if values.is_empty() {
		return 0.0;
	}
	values.iter().sum::<u64>() as f64 / values.len() as f64
}

/// Nearest-rank percentile over an ascending slice: index `ceil(q * n) - 1`.
pub fn percentile(sorted: &[u64], quantile: f64) -> u64 {
	if sorted.is_empty() {
		return 0;
	}
	let rank = (quantile * sorted.len() as f64).ceil() as usize;
	let index = rank.saturating_sub(1).min(sorted.len() - 1);
	sorted[index]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_empty_window_is_healthy() {
		let window = HealthWindow::new();
		let health = window.snapshot("alpha", Network::Mainnet, CircuitState::Closed);
		assert_eq!(health.success_rate, 100.0);
		assert_eq!(health.total_requests, 0);
		assert_eq!(health.p95_latency_ms, 0);
		assert_eq!(health.status, HealthStatus::Healthy);
	}

	#[test]
	fn test_success_rate_and_status() {
		let mut window = HealthWindow::new();
		for _ in 0..8 {
			window.record_success(10);
		}
		for _ in 0..2 {
			window.record_failure(500);
		}
		let health = window.snapshot("alpha", Network::Testnet, CircuitState::Closed);
		assert_eq!(health.success_rate, 80.0);
		assert_eq!(health.status, HealthStatus::Degraded);
		// Failed attempts do not count towards latency
		assert_eq!(health.average_latency_ms, 10.0);
	}

	#[test]
	fn test_percentile_nearest_rank() {
		let values: Vec<u64> = (1..=100).collect();
		assert_eq!(percentile(&values, 0.95), 95);
		assert_eq!(percentile(&[7], 0.95), 7);
		assert_eq!(percentile(&[1, 2], 0.95), 2);
	}

	#[test]
	fn test_p95_bounded_by_average_and_max() {
		let samples: [&[u64]; 4] = [
			&[10, 20, 30, 40, 1000],
			&[5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 900],
			&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
			&[100, 3],
		];
		for latencies in samples {
			let mut window = HealthWindow::new();
			for latency in latencies {
				window.record_success(*latency);
			}
			let max = *latencies.iter().max().unwrap();
			let p95 = window.p95_latency_ms();
			assert!(p95 as f64 >= window.average_latency_ms(), "{:?}", latencies);
			assert!(p95 <= max, "{:?}", latencies);
		}
	}

	#[test]
	fn test_window_is_bounded() {
		let mut window = HealthWindow::new();
		for _ in 0..HEALTH_WINDOW_SIZE {
			window.record_failure(1);
		}
		for _ in 0..HEALTH_WINDOW_SIZE {
			window.record_success(1);
		}
		assert_eq!(window.total_requests(), 2 * HEALTH_WINDOW_SIZE as u64);
		assert_eq!(window.success_rate(), 100.0);
	}

	#[test]
	fn test_open_circuit_overrides_rate() {
		let mut window = HealthWindow::new();
		window.record_success(3);
		let health = window.snapshot("alpha", Network::Mainnet, CircuitState::Open);
		assert_eq!(health.status, HealthStatus::Unhealthy);
	}
}
