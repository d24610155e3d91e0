//! Stage timing.

use crate::utils::timestamps::duration_ms;
use tokio::time::Instant;
use tracing::debug;

/// Measures how long a named stage took.
///
/// Reads the tokio clock, so durations follow a paused test clock.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        duration_ms(self.start.elapsed())
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration in milliseconds.
    pub fn finish(self) -> f64 {
        let elapsed = self.elapsed_ms();
        debug!(span = %self.name, duration_ms = elapsed, "Span finished");
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_measures_paused_clock() {
        let timer = SpanTimer::start("parsing");
        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(timer.name(), "parsing");
        assert!((timer.finish() - 250.0).abs() < 1.0);
    }
}
