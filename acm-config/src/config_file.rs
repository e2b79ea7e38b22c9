//! Minimal `KEY VALUE` parser for the delay-override config file (spec
//! §6.2). Intentionally small: a line scanner, first-whitespace-run split,
//! numeric parsing via `str::parse`, unknown keys ignored, missing file
//! falls back to compiled defaults everywhere this is consulted.

use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/default/config_acm";
pub const DEFAULT_PREFIX: &str = "acm_";
pub const DEFAULT_REC_TIMEOUT_MS: u32 = 1000;

pub const KEY_PRAEFIX: &str = "PRAEFIX_MSG_BUFFER_FILENAME";
pub const KEY_RECOVERY_TIMEOUT_MS: &str = "RECOVERY_TIMEOUT_MS";

pub const KEY_CHIP_IN_100MBPS: &str = "HW_DELAY_100MBps_CHIP_IN_NS";
pub const KEY_CHIP_EG_100MBPS: &str = "HW_DELAY_100MBps_CHIP_EG_NS";
pub const KEY_PHY_IN_100MBPS: &str = "HW_DELAY_100MBps_PHY_IN_NS";
pub const KEY_PHY_EG_100MBPS: &str = "HW_DELAY_100MBps_PHY_EG_NS";
pub const KEY_SER_BYPASS_100MBPS: &str = "HW_DELAY_100MBps_SER_BYPASS_NS";
pub const KEY_SER_SWITCH_100MBPS: &str = "HW_DELAY_100MBps_SER_SWITCH_NS";

pub const KEY_CHIP_IN_1GBPS: &str = "HW_DELAY_1GBps_CHIP_IN_NS";
pub const KEY_CHIP_EG_1GBPS: &str = "HW_DELAY_1GBps_CHIP_EG_NS";
pub const KEY_PHY_IN_1GBPS: &str = "HW_DELAY_1GBps_PHY_IN_NS";
pub const KEY_PHY_EG_1GBPS: &str = "HW_DELAY_1GBps_PHY_EG_NS";
pub const KEY_SER_BYPASS_1GBPS: &str = "HW_DELAY_1GBps_SER_BYPASS_NS";
pub const KEY_SER_SWITCH_1GBPS: &str = "HW_DELAY_1GBps_SER_SWITCH_NS";

#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    values: HashMap<String, String>,
}

impl ConfigFile {
    /// Loads and parses `path`; a missing file yields an empty (all
    /// defaults) `ConfigFile` rather than an error, since the original
    /// treats the whole config file as an optional override layer.
    pub fn load(path: impl AsRef<Path>) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(_) => ConfigFile::default(),
        }
    }

    /// Re-reads the config file fresh; spec §5 notes the file is "read
    /// fresh on each module creation" rather than cached process-wide.
    pub fn load_default() -> Self {
        let path = option_env!("ACM_CONFIG_FILE").unwrap_or(DEFAULT_CONFIG_PATH);
        Self::load(path)
    }

    fn parse(contents: &str) -> Self {
        let mut values = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once(char::is_whitespace) {
                values.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        ConfigFile { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key)?.parse().ok()
    }

    pub fn prefix(&self) -> &str {
        self.get(KEY_PRAEFIX).unwrap_or(DEFAULT_PREFIX)
    }

    pub fn recovery_timeout_ms(&self) -> u32 {
        self.get_u32(KEY_RECOVERY_TIMEOUT_MS).unwrap_or(DEFAULT_REC_TIMEOUT_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_are_ignored_and_known_keys_override_defaults() {
        let cf = ConfigFile::parse("SOME_UNKNOWN_KEY 42\nHW_DELAY_1GBps_CHIP_IN_NS 7\n");
        assert_eq!(cf.get_u32(KEY_CHIP_IN_1GBPS), Some(7));
        assert_eq!(cf.get("SOME_UNKNOWN_KEY"), Some("42"));
        assert_eq!(cf.prefix(), DEFAULT_PREFIX);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cf = ConfigFile::load("/nonexistent/path/config_acm");
        assert_eq!(cf.prefix(), DEFAULT_PREFIX);
        assert_eq!(cf.recovery_timeout_ms(), DEFAULT_REC_TIMEOUT_MS);
    }
}
