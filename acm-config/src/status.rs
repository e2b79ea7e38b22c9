//! Capability introspection, status items, diagnostics and version
//! reporting. These back the hard limits the validator and compiler use
//! instead of hard-coded magic numbers (spec's `[SUPPLEMENT]` section).

use std::fmt;

use crate::device::{DeviceInterface, Subdir};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionTriple {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl fmt::Display for VersionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

fn parse_version(text: &str) -> Option<VersionTriple> {
    let mut parts = text.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    Some(VersionTriple { major, minor, patch })
}

pub fn read_lib_version(device: &DeviceInterface) -> Option<VersionTriple> {
    let text: String = device.read_text_scalar(Subdir::Status, "lib_version")?;
    parse_version(&text)
}

pub fn read_ip_version(device: &DeviceInterface) -> Option<VersionTriple> {
    let text: String = device.read_text_scalar(Subdir::Status, "ip_version")?;
    parse_version(&text)
}

/// Capability keys read once per `Configuration` and held immutable for its
/// lifetime, backing hardware resource limits instead of magic numbers.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub msgbuf_count: u32,
    pub msgbuf_mem: u32,
    pub time_freq_hz: u64,
    pub device_id: u32,
    pub lookup_count: u32,
    pub gather_count: u32,
    pub scatter_count: u32,
    pub redundant_count: u32,
    pub block_granularity: u32,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            msgbuf_count: 32,
            msgbuf_mem: 4096,
            time_freq_hz: 100_000_000, // 10ns tick
            device_id: 0,
            lookup_count: 16,
            gather_count: 256,
            scatter_count: 256,
            redundant_count: 32,
            block_granularity: 4,
        }
    }
}

impl Capabilities {
    pub fn tick_ns(&self) -> u64 {
        1_000_000_000 / self.time_freq_hz
    }

    /// Reads every capability item from `status/*`; any item that is
    /// missing or unparsable falls back to the compiled default, matching
    /// the "compiled defaults on missing config" convention used for the
    /// delay-override file (spec §6.2).
    pub fn read(device: &DeviceInterface) -> Self {
        let defaults = Capabilities::default();
        Capabilities {
            msgbuf_count: device.read_text_scalar(Subdir::Status, "msgbuf_count").unwrap_or(defaults.msgbuf_count),
            msgbuf_mem: device.read_text_scalar(Subdir::Status, "msgbuf_mem").unwrap_or(defaults.msgbuf_mem),
            time_freq_hz: device.read_text_scalar(Subdir::Status, "time_freq").unwrap_or(defaults.time_freq_hz),
            device_id: device.read_text_scalar(Subdir::Status, "device_id").unwrap_or(defaults.device_id),
            lookup_count: device.read_text_scalar(Subdir::Status, "lookup_count").unwrap_or(defaults.lookup_count),
            gather_count: device.read_text_scalar(Subdir::Status, "gather_count").unwrap_or(defaults.gather_count),
            scatter_count: device.read_text_scalar(Subdir::Status, "scatter_count").unwrap_or(defaults.scatter_count),
            redundant_count: device.read_text_scalar(Subdir::Status, "redundant_count").unwrap_or(defaults.redundant_count),
            block_granularity: defaults.block_granularity,
        }
    }
}

/// Closed set of status items a caller can poll per module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusItem {
    LinkStatus,
    Duplex,
    Speed,
    ModuleEnabled,
    EmergencyDisable,
}

impl StatusItem {
    fn file(self) -> &'static str {
        match self {
            StatusItem::LinkStatus => "link_status",
            StatusItem::Duplex => "duplex",
            StatusItem::Speed => "speed",
            StatusItem::ModuleEnabled => "module_enabled",
            StatusItem::EmergencyDisable => "emergency_disable",
        }
    }
}

pub fn read_status_item(device: &DeviceInterface, module_id: u8, item: StatusItem) -> Option<u32> {
    device.read_text_scalar(Subdir::Status, &format!("m{}_{}", module_id, item.file()))
}

/// Frame and redundancy counters. Spec §1/§7 calls this a "trivial struct
/// copy" and the only API surface that returns `Option` rather than
/// `Result`: a missing or short backing file simply yields `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub timestamp: u64,
    pub schedule_cycle_counter: u64,
    pub tx_frames_counter: u64,
    pub rx_frames_counter: u64,
    pub ingress_window_closed_flags: u16,
    pub no_frame_received_flags: u16,
    pub recovery_flags: u16,
    pub additional_filter_mismatch_flags: u16,
}

pub fn read_diagnostics(device: &DeviceInterface, module_id: u8) -> Option<Diagnostics> {
    let path = device.path(Subdir::Diag, &format!("m{module_id}_diagnostics"));
    let bytes = std::fs::read(path).ok()?;
    if bytes.len() < 8 * 4 + 4 * 2 {
        return None;
    }
    let mut r = bytes.as_slice();
    let take_u64 = |r: &mut &[u8]| -> u64 {
        let (head, tail) = r.split_at(8);
        *r = tail;
        u64::from_le_bytes(head.try_into().unwrap())
    };
    let take_u16 = |r: &mut &[u8]| -> u16 {
        let (head, tail) = r.split_at(2);
        *r = tail;
        u16::from_le_bytes(head.try_into().unwrap())
    };
    Some(Diagnostics {
        timestamp: take_u64(&mut r),
        schedule_cycle_counter: take_u64(&mut r),
        tx_frames_counter: take_u64(&mut r),
        rx_frames_counter: take_u64(&mut r),
        ingress_window_closed_flags: take_u16(&mut r),
        no_frame_received_flags: take_u16(&mut r),
        recovery_flags: take_u16(&mut r),
        additional_filter_mismatch_flags: take_u16(&mut r),
    })
}

pub fn set_diagnostics_poll_time(device: &DeviceInterface, module_id: u8, ms: u32) -> Result<(), crate::error::AcmError> {
    device.write_text_scalar(Subdir::Diag, &format!("m{module_id}_poll_ms"), ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parses_major_minor_patch() {
        assert_eq!(parse_version("2.4.1"), Some(VersionTriple { major: 2, minor: 4, patch: 1 }));
        assert_eq!(parse_version("garbage"), None);
    }

    #[test]
    fn tick_ns_derives_from_time_freq() {
        let caps = Capabilities { time_freq_hz: 100_000_000, ..Capabilities::default() };
        assert_eq!(caps.tick_ns(), 10);
    }

    #[test]
    fn diagnostics_returns_none_for_short_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("diag")).unwrap();
        std::fs::write(dir.path().join("diag").join("m0_diagnostics"), [0u8; 4]).unwrap();
        let device = DeviceInterface::new(dir.path());
        assert_eq!(read_diagnostics(&device, 0), None);
    }
}
