use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::indicator::{ActivityIndicator, NoIndicator};

/// Configuration for a [`Link`](crate::Link).
#[derive(Clone)]
pub struct LinkConfig {
    /// Sleep between sender iterations when there is nothing to send or the gate is closed.
    pub send_interval: Duration,
    /// Upper bound on one receiver readiness wait; also bounds shutdown latency.
    pub read_poll_timeout: Duration,
    /// Drop pending commands that stay unacknowledged this long. `None` keeps them forever.
    pub pending_ttl: Option<Duration>,
    /// Activity side effects.
    pub indicator: Arc<dyn ActivityIndicator>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_millis(10),
            read_poll_timeout: Duration::from_millis(100),
            pending_ttl: None,
            indicator: Arc::new(NoIndicator),
        }
    }
}

impl LinkConfig {
    /// Replace the activity indicator.
    pub fn with_indicator(mut self, indicator: Arc<dyn ActivityIndicator>) -> Self {
        self.indicator = indicator;
        self
    }
}

impl fmt::Debug for LinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkConfig")
            .field("send_interval", &self.send_interval)
            .field("read_poll_timeout", &self.read_poll_timeout)
            .field("pending_ttl", &self.pending_ttl)
            .field("indicator", &format_args!("<dyn ActivityIndicator>"))
            .finish()
    }
}
