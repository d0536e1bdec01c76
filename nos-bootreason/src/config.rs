//! Bring-up configuration

use crate::region::RegionLimits;

/// Default name of the reserved log region
pub const DEFAULT_LOG_REGION: &str = "brlog_mem";
/// Default name of the reset-reason beacon
pub const DEFAULT_BEACON_REGION: &str = "imem,reset_reason";
/// Default name of the secure-world reset-reason beacon
pub const DEFAULT_TZ_BEACON_REGION: &str = "imem,tz_reset_reason";
/// Default boot command-line key carrying the previous boot reason
pub const DEFAULT_CMDLINE_KEY: &str = "androidboot.boot_reason=";
/// Default upper bound on the log region size
pub const DEFAULT_MAX_LOG_REGION: usize = 64 * 1024;
/// Beacon regions hold one word and never span more than a page
pub const BEACON_LIMITS: RegionLimits = RegionLimits::new(4, 4096);

/// Names and limits used by [`crate::install`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub log_region: &'static str,
    pub beacon_region: &'static str,
    pub tz_beacon_region: &'static str,
    pub max_log_region_size: usize,
    pub cmdline_key: &'static str,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            log_region: DEFAULT_LOG_REGION,
            beacon_region: DEFAULT_BEACON_REGION,
            tz_beacon_region: DEFAULT_TZ_BEACON_REGION,
            max_log_region_size: DEFAULT_MAX_LOG_REGION,
            cmdline_key: DEFAULT_CMDLINE_KEY,
        }
    }

    pub const fn with_log_region(mut self, name: &'static str) -> Self {
        self.log_region = name;
        self
    }

    pub const fn with_beacon_region(mut self, name: &'static str) -> Self {
        self.beacon_region = name;
        self
    }

    pub const fn with_tz_beacon_region(mut self, name: &'static str) -> Self {
        self.tz_beacon_region = name;
        self
    }

    pub const fn with_max_log_region_size(mut self, size: usize) -> Self {
        self.max_log_region_size = size;
        self
    }

    pub const fn with_cmdline_key(mut self, key: &'static str) -> Self {
        self.cmdline_key = key;
        self
    }

    /// Accepted log region sizes: room for the header plus at least one
    /// byte of text, up to the configured maximum
    pub const fn log_limits(&self) -> RegionLimits {
        RegionLimits::new(crate::header::HEADER_SIZE + 1, self.max_log_region_size)
    }

    /// Value of the boot-reason token in a kernel command line
    ///
    /// Tokens are whitespace separated; the first one starting with the key
    /// wins.
    pub fn boot_reason_token<'a>(&self, cmdline: &'a str) -> Option<&'a str> {
        cmdline
            .split_ascii_whitespace()
            .find_map(|token| token.strip_prefix(self.cmdline_key))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log_region, "brlog_mem");
        assert_eq!(config.max_log_region_size, 0x10000);
        assert!(config.log_limits().accepts(4096));
        assert!(!config.log_limits().accepts(64));
        assert!(!config.log_limits().accepts(0x10001));
    }

    #[test]
    fn test_builder() {
        let config = Config::new()
            .with_log_region("diag_log")
            .with_max_log_region_size(8192)
            .with_cmdline_key("reason=");
        assert_eq!(config.log_region, "diag_log");
        assert_eq!(config.beacon_region, DEFAULT_BEACON_REGION);
        assert!(!config.log_limits().accepts(8193));
        assert_eq!(config.boot_reason_token("quiet reason=kernel_panic"), Some("kernel_panic"));
    }

    #[test]
    fn test_cmdline_token() {
        let config = Config::default();
        let cmdline = "console=ttyMSM0 androidboot.boot_reason=wdt_bark root=/dev/sda1";
        assert_eq!(config.boot_reason_token(cmdline), Some("wdt_bark"));
        assert_eq!(config.boot_reason_token("console=ttyMSM0"), None);
        assert_eq!(config.boot_reason_token("androidboot.boot_reason="), Some(""));
        assert_eq!(config.boot_reason_token("xandroidboot.boot_reason=x"), None);
    }

    #[test]
    fn test_beacon_limits() {
        assert!(BEACON_LIMITS.accepts(4));
        assert!(!BEACON_LIMITS.accepts(2));
        assert!(!BEACON_LIMITS.accepts(8192));
    }
}
