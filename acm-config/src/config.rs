//! The configuration object: up to two bypass modules, the global
//! message-buffer table, and the applied/disabled lifecycle (spec §3, §4.2,
//! §4.4, §4.5). This is the crate's single entry point — every builder,
//! validator and compiler call in the library is reached through a
//! `Configuration` method.

use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info, warn};

use crate::arena::{Arena, ArenaError};
use crate::compiler::{indices, msgbuf_alloc, tables};
use crate::device::{DeviceInterface, Subdir};
use crate::error::{AcmError, AcmResult};
use crate::lookup::LookupEntry;
use crate::module::Module;
use crate::msgbuf::MessageBuffer;
use crate::operation::Operation;
use crate::schedule::ScheduleEntry;
use crate::status::Capabilities;
use crate::stream::{reference_pairing_allowed, Ownership, Stream, StreamId, StreamVariant};
use crate::validate;

const ACM_MODULES_COUNT: usize = 2;

/// Every `Configuration` gets a distinct arena owner id so a [`StreamId`]
/// minted by one configuration is rejected — not silently resolved — if a
/// caller ever passes it to another (see [`crate::arena`]).
static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

fn map_arena_error(e: ArenaError) -> AcmError {
    match e {
        ArenaError::ForeignHandle => AcmError::DifferentConfig,
        ArenaError::Stale => AcmError::Internal,
    }
}

/// Up to two bypass modules, the streams they own, the message-buffer
/// table the compiler derives from them, and the applied/disabled flag
/// that gates further structural mutation.
pub struct Configuration {
    pub modules: [Option<Module>; ACM_MODULES_COUNT],
    pub streams: Arena<Stream>,
    pub msg_buffers: Vec<MessageBuffer>,
    pub config_applied: bool,
    pub caps: Capabilities,
    buffer_prefix: String,
    device: DeviceInterface,
}

impl Configuration {
    /// Builds a detached configuration rooted at `device_root` (the sysfs
    /// namespace root, e.g. `/sys/devices/acm` in production or a
    /// `tempfile::tempdir()` in tests) and reads the device's capability
    /// scalars once, per spec §5 ("no process-wide singletons other than
    /// a log-level/trace-level pair").
    pub fn create(device_root: impl Into<std::path::PathBuf>) -> Self {
        let device = DeviceInterface::new(device_root);
        let caps = Capabilities::read(&device);
        let buffer_prefix = crate::config_file::ConfigFile::load_default().prefix().to_string();
        Configuration {
            modules: [None, None],
            streams: Arena::new(NEXT_OWNER.fetch_add(1, Ordering::Relaxed)),
            msg_buffers: Vec::new(),
            config_applied: false,
            caps,
            buffer_prefix,
            device,
        }
    }

    pub fn device(&self) -> &DeviceInterface {
        &self.device
    }

    // ---- stream factories (spec §6.1 "Lifecycle") ----

    pub fn create_time_triggered_stream(&mut self, dmac: [u8; 6], smac: [u8; 6], vlan_id: u16, vlan_prio: u8) -> AcmResult<StreamId> {
        let stream = Stream::new_time_triggered(dmac, smac, vlan_id, vlan_prio)?;
        Ok(self.streams.insert(stream))
    }

    pub fn create_ingress_triggered_stream(
        &mut self,
        header_pattern: [u8; 16],
        header_mask: [u8; 16],
        filter_pattern: Option<&[u8]>,
        filter_mask: Option<&[u8]>,
        filter_size: usize,
    ) -> AcmResult<StreamId> {
        let lookup = LookupEntry::new(header_pattern, header_mask, filter_pattern, filter_mask, filter_size)?;
        Ok(self.streams.insert(Stream::new_ingress_triggered(lookup)))
    }

    pub fn create_event_stream(&mut self) -> StreamId {
        self.streams.insert(Stream::new_event())
    }

    pub fn create_recovery_stream(&mut self) -> StreamId {
        self.streams.insert(Stream::new_recovery())
    }

    /// A no-op if the stream is still owned by a module, per spec §3
    /// ("Destroying a stream/module that has a parent is a no-op").
    pub fn destroy_stream(&mut self, id: StreamId) {
        if let Ok(stream) = self.streams.get(id) {
            if stream.owner.is_some() {
                return;
            }
        }
        let _ = self.streams.remove(id);
    }

    // ---- operation / schedule recipe (spec §4.1) ----

    /// Appends `op` and immediately re-validates the stream in non-final
    /// mode; a failure pops the just-appended operation so the graph is
    /// byte-identical to its pre-call state (spec §8 universal property).
    fn add_operation(&mut self, id: StreamId, op: Operation) -> AcmResult<()> {
        let stream = self.streams.get_mut(id).map_err(map_arena_error)?;
        stream.add_operation(op)?;
        if let Err(e) = validate::validate_stream(&self.streams, id, false) {
            let stream = self.streams.get_mut(id).map_err(map_arena_error)?;
            stream.pop_operation();
            return Err(e);
        }
        Ok(())
    }

    pub fn add_stream_operation_insert(&mut self, id: StreamId, length: u16, buffer_name: &str) -> AcmResult<()> {
        self.add_operation(id, Operation::insert(length, buffer_name)?)
    }

    pub fn add_stream_operation_insertconstant(&mut self, id: StreamId, data: &[u8]) -> AcmResult<()> {
        self.add_operation(id, Operation::insert_constant(data)?)
    }

    pub fn add_stream_operation_pad(&mut self, id: StreamId, length: u16, fill_byte: u8) -> AcmResult<()> {
        self.add_operation(id, Operation::pad(length, fill_byte)?)
    }

    pub fn add_stream_operation_forward(&mut self, id: StreamId, offset: u16, length: u16) -> AcmResult<()> {
        self.add_operation(id, Operation::forward(offset, length)?)
    }

    pub fn add_stream_operation_read(&mut self, id: StreamId, offset: u16, length: u16, buffer_name: &str) -> AcmResult<()> {
        self.add_operation(id, Operation::read(offset, length, buffer_name)?)
    }

    pub fn add_stream_operation_forwardall(&mut self, id: StreamId) -> AcmResult<()> {
        self.add_operation(id, Operation::forward_all())
    }

    pub fn clean_operations(&mut self, id: StreamId) -> AcmResult<()> {
        self.streams.get_mut(id).map_err(map_arena_error)?.clean_operations();
        Ok(())
    }

    fn with_owning_module<R>(&mut self, id: StreamId, f: impl FnOnce(&mut Module, &mut Arena<Stream>) -> R) -> AcmResult<Option<R>> {
        let owner = self.streams.get(id).map_err(map_arena_error)?.owner;
        match owner {
            Some(Ownership { module_id, .. }) => {
                let module = self.modules[module_id as usize].as_mut().ok_or(AcmError::Internal)?;
                Ok(Some(f(module, &mut self.streams)))
            }
            None => Ok(None),
        }
    }

    /// Adds a schedule entry; if the stream is already owned by a module,
    /// generates and inserts the corresponding FSC commands immediately,
    /// rolling both back together on failure (mirrors the rollback
    /// contract `module_add_stream` applies to a stream's existing
    /// schedules, per spec §4.2).
    fn add_schedule(&mut self, id: StreamId, entry_result: AcmResult<ScheduleEntry>) -> AcmResult<()> {
        let entry = entry_result?;
        let caps = self.caps;
        let gen_result = self.with_owning_module(id, |module, streams| module.generate_and_insert(streams, id, entry, &caps));
        match gen_result {
            Ok(Some(Err(e))) => {
                self.streams.get_mut(id).map_err(map_arena_error)?.pop_schedule();
                return Err(e);
            }
            Ok(_) => {}
            Err(e) => return Err(e),
        }
        if let Err(e) = validate::validate_stream(&self.streams, id, false) {
            self.streams.get_mut(id).map_err(map_arena_error)?.pop_schedule();
            let _ = self.with_owning_module(id, |module, _| module.remove_schedule(id, entry));
            return Err(e);
        }
        Ok(())
    }

    pub fn add_stream_schedule_event(&mut self, id: StreamId, period_ns: u64, send_time_ns: u64) -> AcmResult<()> {
        let entry_result = self.streams.get_mut(id).map_err(map_arena_error)?.add_event_schedule(period_ns, send_time_ns);
        self.add_schedule(id, entry_result)
    }

    pub fn add_stream_schedule_window(&mut self, id: StreamId, period_ns: u64, time_start_ns: u64, time_end_ns: u64) -> AcmResult<()> {
        let entry_result = self.streams.get_mut(id).map_err(map_arena_error)?.add_window_schedule(period_ns, time_start_ns, time_end_ns);
        self.add_schedule(id, entry_result)
    }

    /// Drops every schedule entry of the stream and every FSC command any
    /// of them produced, if the stream is owned by a module.
    pub fn clean_schedule(&mut self, id: StreamId) -> AcmResult<()> {
        self.streams.get_mut(id).map_err(map_arena_error)?.clean_schedule();
        self.with_owning_module(id, |module, _| module.remove_all_for_stream(id))?;
        Ok(())
    }

    // ---- cross-references (spec §4.1) ----

    /// Implements the `set_reference(parent, child)` FSM of spec §4.1:
    /// `IngressTriggered -> Event`, `Event -> Recovery`, and
    /// `TimeTriggered -> TimeTriggered` (which relabels both sides, and
    /// their ingress partners if any, into a redundant pair).
    pub fn set_reference_stream(&mut self, parent: StreamId, child: StreamId) -> AcmResult<()> {
        let (parent_variant, parent_has_ref) = {
            let p = self.streams.get(parent).map_err(map_arena_error)?;
            (p.variant, p.reference.is_some())
        };
        let (child_variant, child_has_parent) = {
            let c = self.streams.get(child).map_err(map_arena_error)?;
            (c.variant, c.reference_parent.is_some())
        };
        if parent_has_ref || child_has_parent {
            return Err(AcmError::PermissionDenied);
        }

        if parent_variant == StreamVariant::TimeTriggered && child_variant == StreamVariant::TimeTriggered {
            return self.link_redundant_pair(parent, child);
        }

        if !reference_pairing_allowed(parent_variant, child_variant) {
            return Err(AcmError::InvalidArgument);
        }

        // "IngressTriggered -> IngressTriggered when pointing at an Event" (spec §3):
        // the ingress stream's own tag never changes here, only its reference.
        self.streams.get_mut(parent).map_err(map_arena_error)?.reference = Some(child);
        self.streams.get_mut(child).map_err(map_arena_error)?.reference_parent = Some(parent);
        Ok(())
    }

    fn link_redundant_pair(&mut self, a: StreamId, b: StreamId) -> AcmResult<()> {
        let a_owner = self.streams.get(a).map_err(map_arena_error)?.owner;
        let b_owner = self.streams.get(b).map_err(map_arena_error)?.owner;
        if let (Some(ao), Some(bo)) = (a_owner, b_owner) {
            if ao.module_id == bo.module_id {
                return Err(AcmError::RedundantSameModule);
            }
        }

        {
            let sa = self.streams.get_mut(a).map_err(map_arena_error)?;
            sa.variant = StreamVariant::RedundantTx;
            sa.reference_redundant = Some(b);
        }
        {
            let sb = self.streams.get_mut(b).map_err(map_arena_error)?;
            sb.variant = StreamVariant::RedundantTx;
            sb.reference_redundant = Some(a);
        }
        for tx in [a, b] {
            let rx_id = self.streams.get(tx).map_err(map_arena_error)?.reference_parent;
            if let Some(rx_id) = rx_id {
                if let Ok(rx) = self.streams.get_mut(rx_id) {
                    if rx.variant == StreamVariant::IngressTriggered {
                        rx.variant = StreamVariant::RedundantRx;
                    }
                }
            }
        }
        debug!("linked redundant pair");
        Ok(())
    }

    pub fn set_rtag_stream(&mut self, id: StreamId, timeout_ns: u64) -> AcmResult<()> {
        let stream = self.streams.get_mut(id).map_err(map_arena_error)?;
        if !matches!(stream.variant, StreamVariant::RedundantTx | StreamVariant::RedundantRx) {
            return Err(AcmError::InvalidArgument);
        }
        stream.indices.indiv_recov_timeout_ms = Some((timeout_ns / 1_000_000) as u32);
        Ok(())
    }

    // ---- module / config assembly (spec §4.2) ----

    /// Binds `module` into its fixed slot (`module.module_id`), then runs
    /// non-final configuration validation; a failure un-binds the slot.
    pub fn add_module(&mut self, module: Module) -> AcmResult<()> {
        let id = module.module_id as usize;
        if id >= ACM_MODULES_COUNT {
            return Err(AcmError::InvalidArgument);
        }
        if self.modules[id].is_some() {
            return Err(AcmError::PermissionDenied);
        }
        self.modules[id] = Some(module);
        if let Err(e) = validate::validate_config(self, false) {
            self.modules[id] = None;
            return Err(e);
        }
        Ok(())
    }

    /// Appends `stream_id` to `module_id`. For an `IngressTriggered` stream
    /// with a chained `Event` (and possibly chained `Recovery`), the whole
    /// chain is appended in sequence and any failure rolls the entire
    /// addition back (spec §4.2).
    pub fn add_module_stream(&mut self, module_id: u8, stream_id: StreamId) -> AcmResult<()> {
        if let Ok(stream) = self.streams.get(stream_id) {
            if let Some(partner_id) = stream.reference_redundant {
                if let Ok(Some(owner)) = self.streams.get(partner_id).map(|p| p.owner) {
                    if owner.module_id == module_id {
                        return Err(AcmError::RedundantSameModule);
                    }
                }
            }
        }

        let mut added = Vec::new();
        if let Err(e) = self.add_one_module_stream(module_id, stream_id) {
            return Err(e);
        }
        added.push(stream_id);

        let mut next = self.streams.get(stream_id).map_err(map_arena_error)?.reference;
        while let Some(chained) = next {
            if let Err(e) = self.add_one_module_stream(module_id, chained) {
                for &done in added.iter().rev() {
                    self.remove_one_module_stream(module_id, done);
                }
                return Err(e);
            }
            added.push(chained);
            next = self.streams.get(chained).map_err(map_arena_error)?.reference;
        }

        let module = self.modules[module_id as usize].as_ref().ok_or(AcmError::Internal)?;
        if let Err(e) = validate::validate_module(module, &self.streams, false) {
            for &done in added.iter().rev() {
                self.remove_one_module_stream(module_id, done);
            }
            return Err(e);
        }
        Ok(())
    }

    fn add_one_module_stream(&mut self, module_id: u8, stream_id: StreamId) -> AcmResult<()> {
        let module = self.modules[module_id as usize].as_mut().ok_or(AcmError::StreamNotInConfig)?;
        module.add_stream(&mut self.streams, stream_id, &self.caps)?;
        // `add_stream` only knows the owning module, not whether that module
        // is itself bound to a configuration yet; `add_one_module_stream` is
        // only ever reached through `self.modules[module_id]`, so the module
        // is config-bound by construction at this point.
        if let Ok(stream) = self.streams.get_mut(stream_id) {
            if let Some(owner) = stream.owner.as_mut() {
                owner.config_bound = true;
            }
        }
        Ok(())
    }

    fn remove_one_module_stream(&mut self, module_id: u8, stream_id: StreamId) {
        if let Some(module) = self.modules[module_id as usize].as_mut() {
            module.remove_stream(&mut self.streams, stream_id);
        }
    }

    // ---- validation (spec §4.3) ----

    pub fn validate_stream(&self, id: StreamId) -> AcmResult<()> {
        validate::validate_stream(&self.streams, id, true)
    }

    pub fn validate_module(&self, module_id: u8) -> AcmResult<()> {
        let module = self.modules[module_id as usize].as_ref().ok_or(AcmError::InvalidArgument)?;
        validate::validate_module(module, &self.streams, true)
    }

    pub fn validate_config(&mut self) -> AcmResult<()> {
        validate::validate_config(self, true)
    }

    pub(crate) fn recompute_msg_buffers(&mut self) -> AcmResult<()> {
        let module_order: Vec<Vec<StreamId>> = self.modules.iter().flatten().map(|m| m.streams.clone()).collect();
        self.msg_buffers = msgbuf_alloc::allocate(&mut self.streams, &module_order, self.caps.block_granularity, self.caps.msgbuf_mem, &self.buffer_prefix)?;
        Ok(())
    }

    // ---- commit (spec §4.2, §4.4) ----

    /// Final top-down validation, then the full compile/write phase, then
    /// the configuration-id register last — so a reader observing the id
    /// knows every table is already committed (spec §5).
    pub fn apply(&mut self, identifier: u32) -> AcmResult<()> {
        if identifier == 0 {
            return Err(AcmError::InvalidArgument);
        }
        validate::validate_config(self, true)?;
        self.assign_all_indices()?;
        self.device.write_text_scalar(Subdir::ConfigBin, "clear_all_fpga", 1u32)?;
        for module in self.modules.iter().flatten() {
            tables::write_module_tables(&self.device, module, &mut self.streams, &self.msg_buffers)?;
        }
        self.write_all_schedules()?;
        self.device.write_text_scalar(Subdir::ConfigBin, "configuration_id", identifier)?;
        self.config_applied = true;
        info!("configuration applied with id {identifier}");
        Ok(())
    }

    /// Reads the hardware config-id as a compare-and-set token; aborts if
    /// it does not match `expected_id`. On success, re-validates and
    /// rewrites only the FSC schedule tables and per-module cycle/start/
    /// emergency-disable, then commits `new_id` (spec §4.2).
    pub fn apply_schedule(&mut self, new_id: u32, expected_id: u32) -> AcmResult<()> {
        if new_id == 0 {
            return Err(AcmError::InvalidArgument);
        }
        let current: Option<u32> = self.device.read_text_scalar(Subdir::ConfigBin, "configuration_id");
        let Some(current) = current else {
            warn!("apply_schedule: hardware configuration_id is unreadable");
            return Err(AcmError::SysfsNoData);
        };
        if current != expected_id {
            warn!("apply_schedule: hardware config id {current} does not match expected {expected_id}");
            return Err(AcmError::InvalidArgument);
        }
        validate::validate_config(self, true)?;
        self.assign_all_indices()?;
        self.write_all_schedules()?;
        self.device.write_text_scalar(Subdir::ConfigBin, "configuration_id", new_id)?;
        Ok(())
    }

    fn assign_all_indices(&mut self) -> AcmResult<()> {
        for module in self.modules.iter().flatten() {
            let assigned = indices::assign_indices(&self.streams, &module.streams)?;
            for (id, computed) in assigned {
                if let Ok(stream) = self.streams.get_mut(id) {
                    stream.indices = computed;
                }
            }
        }
        // Redundancy indices span two modules (a pair's TX streams each
        // live in a different module), so they are assigned in one global
        // pass rather than per-module like gather/scatter/lookup above.
        let module_order: Vec<Vec<StreamId>> = self.modules.iter().flatten().map(|m| m.streams.clone()).collect();
        for (id, redundand_index) in indices::assign_redundant_indices(&self.streams, &module_order) {
            if let Ok(stream) = self.streams.get_mut(id) {
                stream.indices.redundand_index = Some(redundand_index);
            }
        }
        // Commands were generated before most streams had computed indices
        // (schedules are normally added before the first `apply`); rewrite
        // every command's index fields now that indices are current.
        for module in self.modules.iter_mut().flatten() {
            module.rewrite_fsc_indices(&self.streams);
        }
        Ok(())
    }

    fn write_all_schedules(&self) -> AcmResult<()> {
        for (slot, module) in self.modules.iter().flatten().enumerate() {
            if slot >= 2 {
                return Err(AcmError::NoFreeScheduleTable);
            }
            tables::write_schedule(&self.device, module, slot as u8, self.caps.tick_ns())?;
        }
        Ok(())
    }

    /// Removes the applied configuration and restores default parallel-mode
    /// delays (spec §4.5).
    pub fn disable(&mut self) -> AcmResult<()> {
        self.device.write_text_scalar(Subdir::ConfigBin, "clear_all_fpga", 1u32)?;
        self.config_applied = false;
        Ok(())
    }

    // ---- status / control passthroughs (spec §6.1) ----

    pub fn read_config_identifier(&self) -> Option<u32> {
        self.device.read_text_scalar(Subdir::ConfigBin, "configuration_id")
    }

    pub fn read_status_item(&self, module_id: u8, item: crate::status::StatusItem) -> Option<u32> {
        crate::status::read_status_item(&self.device, module_id, item)
    }

    pub fn read_diagnostics(&self, module_id: u8) -> Option<crate::status::Diagnostics> {
        crate::status::read_diagnostics(&self.device, module_id)
    }

    pub fn set_diagnostics_poll_time(&self, module_id: u8, ms: u32) -> AcmResult<()> {
        crate::status::set_diagnostics_poll_time(&self.device, module_id, ms)
    }

    pub fn read_capability_item(&self) -> &Capabilities {
        &self.caps
    }

    pub fn read_lib_version(&self) -> Option<crate::status::VersionTriple> {
        crate::status::read_lib_version(&self.device)
    }

    pub fn read_ip_version(&self) -> Option<crate::status::VersionTriple> {
        crate::status::read_ip_version(&self.device)
    }

    pub fn get_buffer_id(&self, name: &str) -> Option<usize> {
        self.msg_buffers.iter().find(|b| b.name == name).map(|b| b.index)
    }

    pub fn read_buffer_locking_vector(&self) -> Option<u64> {
        self.device.read_text_scalar(Subdir::ControlBin, "lock_msg_bufs")
    }

    fn check_buffer_mask_width(&self, mask: u64) -> AcmResult<()> {
        if self.caps.msgbuf_count < 64 && (mask >> self.caps.msgbuf_count) != 0 {
            return Err(AcmError::InvalidArgument);
        }
        Ok(())
    }

    pub fn set_buffer_locking_mask(&self, mask: u64) -> AcmResult<()> {
        self.check_buffer_mask_width(mask)?;
        self.device.write_text_scalar(Subdir::ControlBin, "lock_msg_bufs", mask)
    }

    pub fn set_buffer_unlocking_mask(&self, mask: u64) -> AcmResult<()> {
        self.check_buffer_mask_width(mask)?;
        self.device.write_text_scalar(Subdir::ControlBin, "unlock_msg_bufs", mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ConnMode, Speed};

    fn setup() -> (tempfile::TempDir, Configuration) {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["config_bin", "status", "control_bin", "error", "diag"] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
        }
        let config = Configuration::create(dir.path());
        (dir, config)
    }

    #[test]
    fn minimal_egress_single_insert_applies_and_reports_its_id() {
        let (_dir, mut config) = setup();
        let mut module = Module::create(ConnMode::Parallel, Speed::Gbps1, 0).unwrap();
        module.set_schedule(1_000_000, 0).unwrap();

        let stream = config.create_time_triggered_stream([0x00, 0x11, 0x22, 0x33, 0x44, 0x55], [0; 6], 100, 3).unwrap();
        config.add_stream_operation_insert(stream, 60, "acm_tx_main").unwrap();
        config.add_stream_schedule_event(stream, 1_000_000, 500_000).unwrap();

        config.add_module(module).unwrap();
        config.add_module_stream(0, stream).unwrap();

        config.apply(7).unwrap();
        assert_eq!(config.read_config_identifier(), Some(7));
        assert_eq!(config.msg_buffers.len(), 1);
        assert_eq!(config.msg_buffers[0].size_in_blocks, 15);
        let module = config.modules[0].as_ref().unwrap();
        assert_eq!(module.fsc_list.len(), 1);
    }

    #[test]
    fn redundant_pair_added_to_same_module_is_rejected() {
        let (_dir, mut config) = setup();
        let mut m0 = Module::create(ConnMode::Parallel, Speed::Gbps1, 0).unwrap();
        m0.set_schedule(2_000_000, 0).unwrap();
        let mut m1 = Module::create(ConnMode::Parallel, Speed::Gbps1, 1).unwrap();
        m1.set_schedule(2_000_000, 0).unwrap();

        let a = config.create_time_triggered_stream([1; 6], [0; 6], 100, 0).unwrap();
        let b = config.create_time_triggered_stream([2; 6], [0; 6], 100, 0).unwrap();
        config.add_stream_schedule_event(a, 2_000_000, 1_000_000).unwrap();
        config.add_stream_schedule_event(b, 2_000_000, 1_000_000).unwrap();
        config.set_reference_stream(a, b).unwrap();

        config.add_module(m0).unwrap();
        config.add_module(m1).unwrap();
        config.add_module_stream(0, a).unwrap();
        assert_eq!(config.add_module_stream(0, b).unwrap_err(), AcmError::RedundantSameModule);
        config.add_module_stream(1, b).unwrap();
        assert_eq!(config.streams.get(a).unwrap().variant, StreamVariant::RedundantTx);
        assert_eq!(config.streams.get(b).unwrap().variant, StreamVariant::RedundantTx);
    }

    #[test]
    fn apply_schedule_with_wrong_expected_id_is_rejected() {
        let (_dir, mut config) = setup();
        let mut module = Module::create(ConnMode::Parallel, Speed::Gbps1, 0).unwrap();
        module.set_schedule(1_000_000, 0).unwrap();
        let stream = config.create_time_triggered_stream([1; 6], [0; 6], 100, 0).unwrap();
        config.add_stream_operation_insert(stream, 60, "acm_tx").unwrap();
        config.add_stream_schedule_event(stream, 1_000_000, 500_000).unwrap();
        config.add_module(module).unwrap();
        config.add_module_stream(0, stream).unwrap();
        config.apply(7).unwrap();

        assert_eq!(config.apply_schedule(8, 9).unwrap_err(), AcmError::InvalidArgument);
        assert_eq!(config.read_config_identifier(), Some(7));
    }
}
