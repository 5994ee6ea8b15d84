use altis_core::{CoreError, CoreResult};

/// Tunables shared by the seating services.
#[derive(Debug, Clone)]
pub struct SeatingPolicy {
    pub default_hold_seconds: u64,
    pub max_hold_seconds: u64,
    /// Extra attempts after a lost compare-and-set before reporting Conflict.
    pub cas_max_retries: u32,
    /// How long hold metadata (and booking receipts) outlive the hold itself.
    pub receipt_retention_seconds: u64,
}

impl Default for SeatingPolicy {
    fn default() -> Self {
        Self {
            default_hold_seconds: 900,
            max_hold_seconds: 1800,
            cas_max_retries: 3,
            receipt_retention_seconds: 86_400,
        }
    }
}

impl SeatingPolicy {
    pub fn resolve_ttl(&self, requested: Option<u64>) -> CoreResult<u64> {
        let ttl = requested.unwrap_or(self.default_hold_seconds);
        if ttl == 0 || ttl > self.max_hold_seconds {
            return Err(CoreError::ValidationError(format!(
                "ttl must be between 1 and {} seconds",
                self.max_hold_seconds
            )));
        }
        Ok(ttl)
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.cas_max_retries + 1
    }
}
