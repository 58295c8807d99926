use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::info;

/// Percentile summary for one named HTTP call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub p50: Duration,
    pub p95: Duration,
    pub max: Duration,
    pub samples: usize,
}

/// Rolling request latencies per endpoint (market list, order book, order
/// placement, sync).
pub struct LatencyTracker {
    windows: DashMap<String, VecDeque<Duration>>,
    window: usize,
}

impl LatencyTracker {
    pub fn new(window: usize) -> Self {
        Self {
            windows: DashMap::new(),
            window: window.max(1),
        }
    }

    pub fn record(&self, endpoint: &str, elapsed: Duration) {
        let mut samples = self
            .windows
            .entry(endpoint.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.window));
        if samples.len() == self.window {
            samples.pop_front();
        }
        samples.push_back(elapsed);
    }

    /// Guard that records the elapsed time when dropped.
    pub fn start_timer(&self, endpoint: &str) -> Timer<'_> {
        Timer {
            endpoint: endpoint.to_string(),
            started: Instant::now(),
            tracker: self,
        }
    }

    pub fn stats(&self, endpoint: &str) -> Option<LatencyStats> {
        let mut sorted: Vec<Duration> = self.windows.get(endpoint)?.iter().copied().collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_unstable();
        Some(LatencyStats {
            p50: nearest_rank(&sorted, 0.50),
            p95: nearest_rank(&sorted, 0.95),
            max: sorted[sorted.len() - 1],
            samples: sorted.len(),
        })
    }

    pub fn log_summary(&self) {
        let mut endpoints: Vec<String> = self.windows.iter().map(|e| e.key().clone()).collect();
        endpoints.sort();
        for endpoint in endpoints {
            if let Some(s) = self.stats(&endpoint) {
                info!(
                    "Latency [{endpoint}]: p50={:.0}ms p95={:.0}ms max={:.0}ms n={}",
                    s.p50.as_secs_f64() * 1000.0,
                    s.p95.as_secs_f64() * 1000.0,
                    s.max.as_secs_f64() * 1000.0,
                    s.samples
                );
            }
        }
    }
}

fn nearest_rank(sorted: &[Duration], q: f64) -> Duration {
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

pub struct Timer<'a> {
    endpoint: String,
    started: Instant,
    tracker: &'a LatencyTracker,
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.tracker.record(&self.endpoint, self.started.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_bounded() {
        let tracker = LatencyTracker::new(3);
        for ms in [10, 20, 30, 40] {
            tracker.record("markets", Duration::from_millis(ms));
        }
        let s = tracker.stats("markets").unwrap();
        assert_eq!(s.samples, 3);
        assert_eq!(s.max, Duration::from_millis(40));
        assert_eq!(s.p50, Duration::from_millis(30));
    }

    #[test]
    fn test_timer_records_on_drop() {
        let tracker = LatencyTracker::new(10);
        {
            let _t = tracker.start_timer("orderbook");
        }
        assert_eq!(tracker.stats("orderbook").unwrap().samples, 1);
        assert!(tracker.stats("unknown").is_none());
    }
}
