//! The result handed back to the monitoring engine's command pipeline.

/// How a check terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckStatus {
    /// The check produced a real pass/fail state.
    Normal,
    /// The deadline passed before telemetry arrived; distinct from any
    /// computed state.
    Timeout,
}

/// Service states in plugin convention, used for output state text.
pub const STATE_TEXT: [&str; 4] = ["OK", "WARNING", "CRITICAL", "UNKNOWN"];

#[derive(Clone, Debug, PartialEq)]
pub struct CheckResult {
    pub command_id: u64,
    pub status: CheckStatus,
    pub exit_code: i64,
    /// Timestamps of the anchor sample, nanoseconds since the epoch.
    pub start_time_unix_nano: u64,
    pub end_time_unix_nano: u64,
    /// `state_text|label=value[unit];warn;crit;min;max ...`
    pub output: String,
}

impl CheckResult {
    pub fn timed_out(command_id: u64) -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            command_id,
            status: CheckStatus::Timeout,
            exit_code: 3,
            start_time_unix_nano: now,
            end_time_unix_nano: now,
            output: "check timed out, no telemetry received".to_owned(),
        }
    }

    pub fn start_time_secs(&self) -> u64 {
        self.start_time_unix_nano / 1_000_000_000
    }

    pub fn end_time_secs(&self) -> u64 {
        self.end_time_unix_nano / 1_000_000_000
    }
}
