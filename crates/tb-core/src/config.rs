//! Pipeline configuration.

const DEFAULT_MAX_CONCURRENT_ROWS: usize = 8;

/// Configuration shared by every pipeline component.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Provider business-partner number, stamped on every shell and asset.
    pub manufacturer_id: String,
    /// Public data-plane endpoint backing submodel and asset addresses.
    pub exchange_endpoint: String,
    /// Upper bound on rows processed concurrently within one batch.
    pub max_concurrent_rows: usize,
}

impl PipelineConfig {
    pub fn new(manufacturer_id: impl Into<String>, exchange_endpoint: impl Into<String>) -> Self {
        Self {
            manufacturer_id: manufacturer_id.into(),
            exchange_endpoint: exchange_endpoint.into(),
            max_concurrent_rows: DEFAULT_MAX_CONCURRENT_ROWS,
        }
    }

    pub fn with_max_concurrent_rows(mut self, max: usize) -> Self {
        self.max_concurrent_rows = max.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_concurrency() {
        let config = PipelineConfig::new("BPNL000000000001", "https://provider.example.com/data");
        assert_eq!(config.max_concurrent_rows, DEFAULT_MAX_CONCURRENT_ROWS);
    }

    #[test]
    fn test_concurrency_floor_is_one() {
        let config = PipelineConfig::new("BPNL000000000001", "https://provider.example.com/data")
            .with_max_concurrent_rows(0);
        assert_eq!(config.max_concurrent_rows, 1);
    }
}
