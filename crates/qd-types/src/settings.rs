//! Settlement tunables.
//!
//! Every window and interval in the settlement flow lives here, loaded once
//! at boot from `QD_*` env vars with compiled defaults. Durations are plain
//! second counts; the engine converts to `chrono::Duration` at comparison
//! sites and the monitors to `std::time::Duration` at their tickers.

use anyhow::{bail, Context, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Platform fee on the doubled stake, in basis points. `QD_FEE_BPS`.
    pub fee_bps: u32,
    /// Gas-recovery cut withheld from refunds, in basis points.
    /// `QD_REFUND_FEE_BPS`.
    pub refund_fee_bps: u32,
    /// How long a winner has to claim after the win is recorded.
    /// `QD_CLAIM_WINDOW_SECS`.
    pub claim_window_secs: i64,
    /// Clock-skew grace added to the claim deadline at validation time.
    /// `QD_CLAIM_GRACE_SECS`.
    pub claim_grace_secs: i64,
    /// How long a failed claim may be retried. `QD_RETRY_WINDOW_SECS`.
    pub retry_window_secs: i64,
    /// Heartbeat staleness threshold. `QD_HEARTBEAT_TIMEOUT_SECS`.
    pub heartbeat_timeout_secs: i64,
    /// Disconnect monitor tick interval. `QD_MONITOR_INTERVAL_SECS`.
    pub monitor_interval_secs: u64,
    /// Matches younger than this are never disconnect-resolved (clients are
    /// still connecting). `QD_MONITOR_GRACE_SECS`.
    pub monitor_grace_secs: i64,
    /// A match stuck in `waiting` longer than this is voided.
    /// `QD_WAITING_TIMEOUT_SECS`.
    pub waiting_timeout_secs: i64,
    /// A confirmed stake never attached to a match after this is
    /// refund-eligible. `QD_ORPHAN_TIMEOUT_SECS`.
    pub orphan_timeout_secs: i64,
    /// How long a refund-eligible stake may be claimed.
    /// `QD_REFUND_WINDOW_SECS`.
    pub refund_window_secs: i64,
    /// Timeout + expiry sweeper tick interval. `QD_SWEEP_INTERVAL_SECS`.
    pub sweep_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fee_bps: 300,
            refund_fee_bps: 100,
            claim_window_secs: 3_600,
            claim_grace_secs: 60,
            retry_window_secs: 24 * 3_600,
            heartbeat_timeout_secs: 30,
            monitor_interval_secs: 10,
            monitor_grace_secs: 30,
            waiting_timeout_secs: 600,
            orphan_timeout_secs: 900,
            refund_window_secs: 4 * 3_600,
            sweep_interval_secs: 60,
        }
    }
}

impl Settings {
    /// Load settings from the environment, falling back to defaults.
    ///
    /// Fails on unparseable values and on a fee above 10_000 bps — a fee
    /// larger than the pool would make the payout subtraction meaningless.
    pub fn from_env() -> Result<Self> {
        let d = Settings::default();
        let s = Settings {
            fee_bps: env_u32("QD_FEE_BPS", d.fee_bps)?,
            refund_fee_bps: env_u32("QD_REFUND_FEE_BPS", d.refund_fee_bps)?,
            claim_window_secs: env_i64("QD_CLAIM_WINDOW_SECS", d.claim_window_secs)?,
            claim_grace_secs: env_i64("QD_CLAIM_GRACE_SECS", d.claim_grace_secs)?,
            retry_window_secs: env_i64("QD_RETRY_WINDOW_SECS", d.retry_window_secs)?,
            heartbeat_timeout_secs: env_i64("QD_HEARTBEAT_TIMEOUT_SECS", d.heartbeat_timeout_secs)?,
            monitor_interval_secs: env_u64("QD_MONITOR_INTERVAL_SECS", d.monitor_interval_secs)?,
            monitor_grace_secs: env_i64("QD_MONITOR_GRACE_SECS", d.monitor_grace_secs)?,
            waiting_timeout_secs: env_i64("QD_WAITING_TIMEOUT_SECS", d.waiting_timeout_secs)?,
            orphan_timeout_secs: env_i64("QD_ORPHAN_TIMEOUT_SECS", d.orphan_timeout_secs)?,
            refund_window_secs: env_i64("QD_REFUND_WINDOW_SECS", d.refund_window_secs)?,
            sweep_interval_secs: env_u64("QD_SWEEP_INTERVAL_SECS", d.sweep_interval_secs)?,
        };
        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fee_bps > 10_000 {
            bail!("QD_FEE_BPS must be <= 10000, got {}", self.fee_bps);
        }
        if self.refund_fee_bps > 10_000 {
            bail!(
                "QD_REFUND_FEE_BPS must be <= 10000, got {}",
                self.refund_fee_bps
            );
        }
        if self.claim_window_secs <= 0 || self.retry_window_secs <= 0 {
            bail!("claim/retry windows must be positive");
        }
        if self.heartbeat_timeout_secs <= 0 {
            bail!("heartbeat timeout must be positive");
        }
        Ok(())
    }

    pub fn claim_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.claim_window_secs)
    }

    pub fn claim_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.claim_grace_secs)
    }

    pub fn retry_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retry_window_secs)
    }

    pub fn heartbeat_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.heartbeat_timeout_secs)
    }

    pub fn monitor_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.monitor_grace_secs)
    }

    pub fn waiting_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.waiting_timeout_secs)
    }

    pub fn orphan_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.orphan_timeout_secs)
    }

    pub fn refund_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refund_window_secs)
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32> {
    match std::env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("bad {key}: {v:?}")),
        Err(_) => Ok(default),
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("bad {key}: {v:?}")),
        Err(_) => Ok(default),
    }
}

fn env_i64(key: &str, default: i64) -> Result<i64> {
    match std::env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("bad {key}: {v:?}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_settlement_windows() {
        let s = Settings::default();
        assert_eq!(s.fee_bps, 300);
        assert_eq!(s.claim_window_secs, 3_600);
        assert_eq!(s.claim_grace_secs, 60);
        assert_eq!(s.retry_window_secs, 86_400);
        assert_eq!(s.heartbeat_timeout_secs, 30);
        assert_eq!(s.monitor_interval_secs, 10);
        assert_eq!(s.waiting_timeout_secs, 600);
        assert_eq!(s.orphan_timeout_secs, 900);
        assert_eq!(s.refund_window_secs, 14_400);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn validate_rejects_oversized_fee() {
        let s = Settings {
            fee_bps: 10_001,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_nonpositive_windows() {
        let s = Settings {
            claim_window_secs: 0,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }
}
