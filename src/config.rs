//! Adapter configuration.
//!
//! [`AdapterConfig`] collects the settings shared by every connection served
//! with the same application. Codec-facing options,
//! [`AdapterConfig::max_message_size`] and
//! [`AdapterConfig::per_message_deflate`], are read when a codec is built
//! for a connection; the rest are consumed by the adapter and the stream
//! driver.

use thiserror::Error;

/// Default maximum size of a single inbound message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
/// Default write-buffer size above which sends are paused.
pub const DEFAULT_HIGH_WATERMARK: usize = 64 * 1024;
/// Default write-buffer size below which sends resume.
pub const DEFAULT_LOW_WATERMARK: usize = 16 * 1024;
/// Default size of the read buffer used by the stream driver.
pub const DEFAULT_READ_BUFFER: usize = 8 * 1024;

/// Errors raised while building an [`AdapterConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The low watermark exceeds the high watermark.
    #[error("low watermark {low} exceeds high watermark {high}")]
    InvertedWatermarks {
        /// Requested high watermark.
        high: usize,
        /// Requested low watermark.
        low: usize,
    },
    /// A size that must be positive was zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Settings shared by all connections of one server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterConfig {
    root_path: String,
    asgi_version: String,
    max_message_size: usize,
    per_message_deflate: bool,
    write_high_watermark: usize,
    write_low_watermark: usize,
    read_buffer_size: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            root_path: String::new(),
            asgi_version: "3.0".to_owned(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            per_message_deflate: true,
            write_high_watermark: DEFAULT_HIGH_WATERMARK,
            write_low_watermark: DEFAULT_LOW_WATERMARK,
            read_buffer_size: DEFAULT_READ_BUFFER,
        }
    }
}

impl AdapterConfig {
    /// Configuration with default values.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Set the application mount point reported in the scope.
    #[must_use]
    pub fn with_root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = root_path.into();
        self
    }

    /// Set the interface version reported in the scope.
    #[must_use]
    pub fn with_asgi_version(mut self, version: impl Into<String>) -> Self {
        self.asgi_version = version.into();
        self
    }

    /// Set the maximum inbound message size.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Zero`] if `size` is zero.
    pub fn with_max_message_size(mut self, size: usize) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::Zero("max message size"));
        }
        self.max_message_size = size;
        Ok(self)
    }

    /// Enable or disable per-message compression negotiation.
    #[must_use]
    pub fn with_per_message_deflate(mut self, enabled: bool) -> Self {
        self.per_message_deflate = enabled;
        self
    }

    /// Set the write-buffer watermarks used by the stream driver.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvertedWatermarks`] if `low > high`, or
    /// [`ConfigError::Zero`] if `high` is zero.
    pub fn with_watermarks(mut self, high: usize, low: usize) -> Result<Self, ConfigError> {
        if high == 0 {
            return Err(ConfigError::Zero("high watermark"));
        }
        if low > high {
            return Err(ConfigError::InvertedWatermarks { high, low });
        }
        self.write_high_watermark = high;
        self.write_low_watermark = low;
        Ok(self)
    }

    /// Set the read buffer size used by the stream driver.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Zero`] if `size` is zero.
    pub fn with_read_buffer_size(mut self, size: usize) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::Zero("read buffer size"));
        }
        self.read_buffer_size = size;
        Ok(self)
    }

    /// Application mount point.
    #[must_use]
    pub fn root_path(&self) -> &str { &self.root_path }

    /// Interface version.
    #[must_use]
    pub fn asgi_version(&self) -> &str { &self.asgi_version }

    /// Maximum inbound message size.
    #[must_use]
    pub fn max_message_size(&self) -> usize { self.max_message_size }

    /// Whether per-message compression should be offered.
    #[must_use]
    pub fn per_message_deflate(&self) -> bool { self.per_message_deflate }

    /// High write watermark.
    #[must_use]
    pub fn write_high_watermark(&self) -> usize { self.write_high_watermark }

    /// Low write watermark.
    #[must_use]
    pub fn write_low_watermark(&self) -> usize { self.write_low_watermark }

    /// Read buffer size.
    #[must_use]
    pub fn read_buffer_size(&self) -> usize { self.read_buffer_size }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults() {
        let config = AdapterConfig::new();
        assert_eq!(config.root_path(), "");
        assert_eq!(config.asgi_version(), "3.0");
        assert_eq!(config.max_message_size(), DEFAULT_MAX_MESSAGE_SIZE);
        assert!(config.per_message_deflate());
        assert_eq!(config.write_high_watermark(), DEFAULT_HIGH_WATERMARK);
        assert_eq!(config.write_low_watermark(), DEFAULT_LOW_WATERMARK);
    }

    #[rstest]
    #[case(10, 20, Err(ConfigError::InvertedWatermarks { high: 10, low: 20 }))]
    #[case(0, 0, Err(ConfigError::Zero("high watermark")))]
    #[case(20, 10, Ok((20, 10)))]
    #[case(8, 8, Ok((8, 8)))]
    fn validates_watermarks(
        #[case] high: usize,
        #[case] low: usize,
        #[case] expected: Result<(usize, usize), ConfigError>,
    ) {
        let result = AdapterConfig::new()
            .with_watermarks(high, low)
            .map(|c| (c.write_high_watermark(), c.write_low_watermark()));
        assert_eq!(result, expected);
    }

    #[test]
    fn rejects_zero_message_size() {
        assert_eq!(
            AdapterConfig::new().with_max_message_size(0),
            Err(ConfigError::Zero("max message size"))
        );
    }
}
