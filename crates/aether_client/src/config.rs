//! Client configuration.

/// Configuration for an aether client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Capacity of the intake queue between reader and dispatcher, or
    /// `None` to dispatch straight from the reader.
    pub intake_capacity: Option<usize>,
    /// Keep the session alive after non-fatal errors.
    pub error_tolerant: bool,
    /// Slots per direction of an in-process link.
    pub channel_capacity: usize,
}

impl ClientConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            intake_capacity: Some(256),
            error_tolerant: false,
            channel_capacity: 256,
        }
    }

    /// Sets the intake queue capacity.
    pub fn with_intake_capacity(mut self, capacity: Option<usize>) -> Self {
        self.intake_capacity = capacity;
        self
    }

    /// Enables or disables error tolerance.
    pub fn with_error_tolerant(mut self, tolerant: bool) -> Self {
        self.error_tolerant = tolerant;
        self
    }

    /// Sets the in-process channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let config = ClientConfig::new()
            .with_intake_capacity(None)
            .with_error_tolerant(true)
            .with_channel_capacity(8);
        assert!(config.intake_capacity.is_none());
        assert!(config.error_tolerant);
        assert_eq!(config.channel_capacity, 8);
        assert_eq!(ClientConfig::default().intake_capacity, Some(256));
    }
}
