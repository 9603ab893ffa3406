use tokio::time::{interval, Duration, Interval, MissedTickBehavior};

/// Rate gate: lets at most one unit of work through per period.
///
/// The first `ready` returns immediately, so the Nth pass happens no earlier
/// than `(N - 1) * period` after the gate was created. A stall (nothing to
/// admit for a while) does not build up a burst of credit.
pub struct AdmissionGate {
    ticker: Interval,
}

impl AdmissionGate {
    /// Must be called from inside a tokio runtime. Zero periods are raised to 1 ms.
    pub fn new(period: Duration) -> Self {
        let mut ticker = interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { ticker }
    }

    pub fn period(&self) -> Duration {
        self.ticker.period()
    }

    /// Waits until the next pass is allowed.
    pub async fn ready(&mut self) {
        self.ticker.tick().await;
    }
}
