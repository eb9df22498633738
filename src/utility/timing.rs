// ============================================
// TIMING UTILITY - Performance Measurement
// ============================================
// Usage:
//   1. Manual tracking: let timer = Timer::start("name"); ... timer.stop();
//   2. Scoped tracking: let _timer = Timer::start("name"); logs on drop
//   3. Batches: AggregateTimer::new("name").record(d) per item, then stats()
// ============================================

use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Timer for measuring execution time
pub struct Timer {
    name: String,
    start: Instant,
    stopped: bool,
}

impl Timer {
    /// Create a timer that logs when stopped or dropped
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            stopped: false,
        }
    }

    /// Stop the timer and log the result
    pub fn stop(mut self) -> Duration {
        let duration = self.start.elapsed();
        self.log_duration(duration);
        self.stopped = true;
        duration
    }

    fn log_duration(&self, duration: Duration) {
        let ms = duration.as_millis();
        tracing::debug!(name = %self.name, elapsed_ms = ms as u64, "timer");

        let emoji = Self::get_emoji(ms);
        if ms < 1000 {
            println!("{} {} - {}ms", emoji, self.name.as_str().cyan(), ms);
        } else {
            println!("{} {} - {:.2}s", emoji, self.name.as_str().cyan(), duration.as_secs_f64());
        }
    }

    fn get_emoji(ms: u128) -> &'static str {
        match ms {
            0..=100 => "⚡",
            101..=500 => "✅",
            501..=1000 => "⏱️",
            1001..=5000 => "🐌",
            _ => "🔥",
        }
    }

    /// Log a section header for grouping output
    pub fn section(name: impl Into<String>) {
        let name = name.into();
        println!("\n{}", "=".repeat(60).blue());
        println!("{} {}", "⏱️", name.cyan().bold());
        println!("{}", "=".repeat(60).blue());
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if !self.stopped {
            let duration = self.start.elapsed();
            self.log_duration(duration);
        }
    }
}

// ============================================
// AGGREGATE TIMING FOR BATCH OPERATIONS
// ============================================

/// Plain numbers of an `AggregateTimer`, for reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingStats {
    pub count: usize,
    pub total_ms: u64,
    pub avg_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

/// Aggregate timer for tracking multiple operations
pub struct AggregateTimer {
    name: String,
    count: usize,
    total_duration: Duration,
    min_duration: Option<Duration>,
    max_duration: Option<Duration>,
}

impl AggregateTimer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: 0,
            total_duration: Duration::ZERO,
            min_duration: None,
            max_duration: None,
        }
    }

    /// Record a single operation duration
    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total_duration += duration;
        self.min_duration = Some(self.min_duration.map_or(duration, |min| min.min(duration)));
        self.max_duration = Some(self.max_duration.map_or(duration, |max| max.max(duration)));
    }

    pub fn avg_duration(&self) -> Option<Duration> {
        if self.count == 0 {
            None
        } else {
            Some(self.total_duration / self.count as u32)
        }
    }

    pub fn stats(&self) -> TimingStats {
        let ms = |d: Option<Duration>| d.map_or(0, |d| d.as_millis() as u64);
        TimingStats {
            count: self.count,
            total_ms: self.total_duration.as_millis() as u64,
            avg_ms: ms(self.avg_duration()),
            min_ms: ms(self.min_duration),
            max_ms: ms(self.max_duration),
        }
    }

    /// Log summary statistics
    pub fn log_summary(&self) {
        let stats = self.stats();
        tracing::info!(
            name = %self.name,
            count = stats.count,
            total_ms = stats.total_ms,
            avg_ms = stats.avg_ms,
            min_ms = stats.min_ms,
            max_ms = stats.max_ms,
            "aggregate timing"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_stats() {
        let mut agg = AggregateTimer::new("fetch");
        assert_eq!(agg.stats(), TimingStats::default());
        assert!(agg.avg_duration().is_none());

        agg.record(Duration::from_millis(10));
        agg.record(Duration::from_millis(30));
        agg.record(Duration::from_millis(20));

        let stats = agg.stats();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.total_ms, 60);
        assert_eq!(stats.avg_ms, 20);
        assert_eq!(stats.min_ms, 10);
        assert_eq!(stats.max_ms, 30);
    }

    #[test]
    fn test_stop_returns_elapsed() {
        let timer = Timer::start("sleep");
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.stop() >= Duration::from_millis(5));
    }
}
