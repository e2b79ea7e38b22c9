//! Modules: one directional processing pipeline, its stream set, delay
//! table, and compiled FSC command list.

use log::debug;

use crate::arena::Arena;
use crate::compiler::fsc::{self, FscCommand};
use crate::config_file::{self, ConfigFile};
use crate::error::{AcmError, AcmResult};
use crate::schedule::ScheduleEntry;
use crate::status::Capabilities;
use crate::stream::{reference_pairing_allowed, Ownership, Stream, StreamId, StreamVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnMode {
    Serial,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Mbps100,
    Gbps1,
}

/// HW delays for scheduling, per-speed. Defaults are the values the
/// original `hwconfig_def.h` ships; overridden per key from the delay
/// config file.
#[derive(Debug, Clone, Copy)]
pub struct DelayTable {
    pub chip_in: u64,
    pub chip_eg: u64,
    pub phy_in: u64,
    pub phy_eg: u64,
    pub ser_bypass: u64,
    pub ser_switch: u64,
}

impl DelayTable {
    fn defaults_100mbps() -> Self {
        DelayTable { chip_in: 50, chip_eg: 120, phy_in: 404, phy_eg: 444, ser_bypass: 2844, ser_switch: 3900 }
    }

    fn defaults_1gbps() -> Self {
        DelayTable { chip_in: 50, chip_eg: 120, phy_in: 298, phy_eg: 199, ser_bypass: 439, ser_switch: 940 }
    }

    fn for_speed(speed: Speed) -> Self {
        match speed {
            Speed::Mbps100 => Self::defaults_100mbps(),
            Speed::Gbps1 => Self::defaults_1gbps(),
        }
    }

    /// Applies per-key overrides from the delay config file, per spec §6.2
    /// ("missing keys fall back to compiled defaults").
    fn apply_overrides(mut self, speed: Speed, file: &ConfigFile) -> Self {
        let (chip_in, chip_eg, phy_in, phy_eg, ser_bypass, ser_switch) = match speed {
            Speed::Mbps100 => (
                config_file::KEY_CHIP_IN_100MBPS,
                config_file::KEY_CHIP_EG_100MBPS,
                config_file::KEY_PHY_IN_100MBPS,
                config_file::KEY_PHY_EG_100MBPS,
                config_file::KEY_SER_BYPASS_100MBPS,
                config_file::KEY_SER_SWITCH_100MBPS,
            ),
            Speed::Gbps1 => (
                config_file::KEY_CHIP_IN_1GBPS,
                config_file::KEY_CHIP_EG_1GBPS,
                config_file::KEY_PHY_IN_1GBPS,
                config_file::KEY_PHY_EG_1GBPS,
                config_file::KEY_SER_BYPASS_1GBPS,
                config_file::KEY_SER_SWITCH_1GBPS,
            ),
        };
        if let Some(v) = file.get_u32(chip_in) {
            self.chip_in = v as u64;
        }
        if let Some(v) = file.get_u32(chip_eg) {
            self.chip_eg = v as u64;
        }
        if let Some(v) = file.get_u32(phy_in) {
            self.phy_in = v as u64;
        }
        if let Some(v) = file.get_u32(phy_eg) {
            self.phy_eg = v as u64;
        }
        if let Some(v) = file.get_u32(ser_bypass) {
            self.ser_bypass = v as u64;
        }
        if let Some(v) = file.get_u32(ser_switch) {
            self.ser_switch = v as u64;
        }
        self
    }
}

/// One of the two directional processing pipelines a configuration can
/// host, identified by `module_id` (0 or 1, each bound to a fixed physical
/// port — `sw0p2`/`sw0p3` in the original).
#[derive(Debug, Clone)]
pub struct Module {
    pub module_id: u8,
    pub mode: ConnMode,
    pub speed: Speed,
    pub cycle_ns: u64,
    pub start_ns: u64,
    pub delays: DelayTable,
    pub streams: Vec<StreamId>,
    pub fsc_list: Vec<FscCommand>,
    pub port_mac: [u8; 6],
    pub recovery_timeout_ms: u32,
}

impl Module {
    pub fn create(mode: ConnMode, speed: Speed, module_id: u8) -> AcmResult<Self> {
        if module_id > 1 {
            return Err(AcmError::InvalidArgument);
        }
        let file = ConfigFile::load_default();
        let delays = DelayTable::for_speed(speed).apply_overrides(speed, &file);
        let port_mac = if module_id == 0 { [0x02, 0, 0, 0, 0, 2] } else { [0x02, 0, 0, 0, 0, 3] };
        Ok(Module {
            module_id,
            mode,
            speed,
            cycle_ns: 0,
            start_ns: 0,
            delays,
            streams: Vec::new(),
            fsc_list: Vec::new(),
            port_mac,
            recovery_timeout_ms: file.recovery_timeout_ms(),
        })
    }

    pub fn set_schedule(&mut self, cycle_ns: u64, start_ns: u64) -> AcmResult<()> {
        if cycle_ns == 0 {
            return Err(AcmError::BadModuleCycle);
        }
        self.cycle_ns = cycle_ns;
        self.start_ns = start_ns;
        Ok(())
    }

    fn tick_ns(&self, caps: &Capabilities) -> u64 {
        caps.tick_ns()
    }

    fn generate_for_schedule(
        &self,
        streams: &Arena<Stream>,
        stream_id: StreamId,
        schedule: ScheduleEntry,
        caps: &Capabilities,
    ) -> AcmResult<Vec<FscCommand>> {
        let stream = streams.get(stream_id).map_err(|_| AcmError::Internal)?;
        let tick = self.tick_ns(caps);
        if self.cycle_ns % schedule.period_ns() != 0 {
            return Err(AcmError::PeriodIncompatible);
        }
        match (stream.variant, schedule) {
            (StreamVariant::TimeTriggered | StreamVariant::RedundantTx, ScheduleEntry::Event { tag, period_ns, send_time_ns }) => {
                Ok(fsc::generate_event_commands(
                    stream_id,
                    period_ns,
                    send_time_ns,
                    tag,
                    self.cycle_ns,
                    tick,
                    self.delays.chip_eg,
                    self.delays.phy_eg,
                    stream.indices.gather_dma_index.unwrap_or(0),
                    stream.indices.redundand_index.unwrap_or(0),
                ))
            }
            (
                StreamVariant::IngressTriggered | StreamVariant::RedundantRx,
                ScheduleEntry::Window { tag, period_ns, time_start_ns, time_end_ns },
            ) => {
                let recovery_gather_index = recovery_chain_gather_index(streams, stream_id)?;
                Ok(fsc::generate_window_commands(
                    stream_id,
                    period_ns,
                    time_start_ns,
                    time_end_ns,
                    tag,
                    self.cycle_ns,
                    tick,
                    self.delays.chip_in,
                    self.delays.phy_in,
                    self.delays.ser_switch,
                    self.mode == ConnMode::Serial,
                    stream.indices.lookup_index.unwrap_or(0),
                    recovery_gather_index,
                ))
            }
            _ => Err(AcmError::Internal),
        }
    }

    /// Appends `stream_id` to this module, generates FSC commands for every
    /// schedule entry already on the stream, and recomputes table indices.
    /// Any failure rolls back the append, the generated commands, and the
    /// index recomputation, per spec §4.2.
    pub fn add_stream(&mut self, streams: &mut Arena<Stream>, stream_id: StreamId, caps: &Capabilities) -> AcmResult<()> {
        {
            let stream = streams.get(stream_id).map_err(|_| AcmError::Internal)?;
            if stream.owner.is_some() {
                return Err(AcmError::PermissionDenied);
            }
        }

        self.streams.push(stream_id);
        let schedules: Vec<ScheduleEntry> = streams.get(stream_id).map_err(|_| AcmError::Internal)?.schedules.clone();

        let mut generated = Vec::new();
        for schedule in &schedules {
            match self.generate_for_schedule(streams, stream_id, *schedule, caps) {
                Ok(cmds) => generated.extend(cmds),
                Err(e) => {
                    self.streams.pop();
                    return Err(e);
                }
            }
        }

        if let Some(port_mac) = self.port_mac_if_egress(streams, stream_id) {
            streams.get_mut(stream_id).map_err(|_| AcmError::Internal)?.update_smac(port_mac);
        }

        for cmd in generated {
            fsc::insert_sorted(&mut self.fsc_list, cmd);
        }

        if let Ok(stream) = streams.get_mut(stream_id) {
            stream.owner = Some(Ownership { module_id: self.module_id, config_bound: false });
        }

        debug!("stream added to module {}; fsc_list now has {} entries", self.module_id, self.fsc_list.len());
        Ok(())
    }

    fn port_mac_if_egress(&self, streams: &Arena<Stream>, stream_id: StreamId) -> Option<[u8; 6]> {
        let stream = streams.get(stream_id).ok()?;
        if stream.is_egress() {
            Some(self.port_mac)
        } else {
            None
        }
    }

    /// Reverses `add_stream`: detaches the stream, drops its generated
    /// FSC commands, and leaves table indices to be recomputed by the
    /// caller (see [`crate::compiler::indices::assign_indices`]).
    pub fn remove_stream(&mut self, streams: &mut Arena<Stream>, stream_id: StreamId) {
        self.streams.retain(|&id| id != stream_id);
        fsc::remove_for_stream(&mut self.fsc_list, stream_id);
        if let Ok(stream) = streams.get_mut(stream_id) {
            stream.owner = None;
        }
    }

    /// Generates FSC commands for one schedule entry of a stream this
    /// module already owns and inserts them into `fsc_list`, sorted. Used
    /// when a schedule is added to a stream *after* it joined a module
    /// (the initial batch, for schedules present at `add_stream` time, goes
    /// through [`Module::add_stream`] instead).
    pub fn generate_and_insert(&mut self, streams: &Arena<Stream>, stream_id: StreamId, schedule: ScheduleEntry, caps: &Capabilities) -> AcmResult<()> {
        let commands = self.generate_for_schedule(streams, stream_id, schedule, caps)?;
        for cmd in commands {
            fsc::insert_sorted(&mut self.fsc_list, cmd);
        }
        Ok(())
    }

    /// Removes every FSC command produced by one schedule entry.
    pub fn remove_schedule(&mut self, stream_id: StreamId, schedule: ScheduleEntry) {
        let _ = stream_id;
        fsc::remove_for_schedule(&mut self.fsc_list, stream_id, &schedule);
    }

    /// Removes every FSC command produced by any schedule entry of a stream
    /// (used by `clean_schedule`, which clears the whole schedule list).
    pub fn remove_all_for_stream(&mut self, stream_id: StreamId) {
        fsc::remove_for_stream(&mut self.fsc_list, stream_id);
    }

    /// Re-derives every FSC command's gather/lookup/redundancy indices, and
    /// the window-close recovery trigger, from the owning streams' current
    /// [`crate::stream::ComputedIndices`]. Commands are generated before a
    /// stream necessarily has indices assigned (schedules are usually added
    /// before `apply` ever runs `assign_indices`), so this rewrite has to
    /// happen once more right before a table write — the "late bind" spec
    /// §9 describes ("do the index rewrite at write time only").
    pub fn rewrite_fsc_indices(&mut self, streams: &Arena<Stream>) {
        for cmd in &mut self.fsc_list {
            let Ok(stream) = streams.get(cmd.stream) else { continue };
            if cmd.win_open || cmd.win_close {
                if let Some(lookup) = stream.indices.lookup_index {
                    cmd.lookup_index = lookup;
                }
                if cmd.win_close {
                    match recovery_chain_gather_index(streams, cmd.stream) {
                        Ok(Some(idx)) => {
                            cmd.trigger = fsc::Trigger::FirstStage;
                            cmd.gather_dma_index = idx;
                        }
                        _ => {
                            cmd.trigger = fsc::Trigger::NoTrigger;
                            cmd.gather_dma_index = 0;
                        }
                    }
                }
            } else {
                if let Some(gather) = stream.indices.gather_dma_index {
                    cmd.gather_dma_index = gather;
                }
                if let Some(redundand) = stream.indices.redundand_index {
                    cmd.redundand_index = redundand;
                }
            }
        }
    }

    pub fn redundant_stream_count(&self, streams: &Arena<Stream>) -> usize {
        self.streams
            .iter()
            .filter(|&&id| {
                streams
                    .get(id)
                    .map(|s| matches!(s.variant, StreamVariant::RedundantTx | StreamVariant::RedundantRx))
                    .unwrap_or(false)
            })
            .count()
    }
}

/// Walks `ingress -> event -> recovery` to find the gather index an ingress
/// window's close command should embed, if a recovery stream is chained.
fn recovery_chain_gather_index(streams: &Arena<Stream>, ingress: StreamId) -> AcmResult<Option<u16>> {
    let ingress_stream = streams.get(ingress).map_err(|_| AcmError::Internal)?;
    let Some(event_id) = ingress_stream.reference else {
        return Ok(None);
    };
    let event_stream = streams.get(event_id).map_err(|_| AcmError::Internal)?;
    if !reference_pairing_allowed(StreamVariant::IngressTriggered, event_stream.variant) {
        return Ok(None);
    }
    match event_stream.reference {
        Some(recovery_id) => {
            let recovery_stream = streams.get(recovery_id).map_err(|_| AcmError::Internal)?;
            Ok(recovery_stream.indices.gather_dma_index)
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::LookupEntry;

    #[test]
    fn module_create_rejects_out_of_range_id() {
        assert_eq!(Module::create(ConnMode::Parallel, Speed::Gbps1, 2).unwrap_err(), AcmError::InvalidArgument);
    }

    #[test]
    fn add_stream_generates_one_fsc_command_for_a_single_event() {
        let mut arena: Arena<Stream> = Arena::new(1);
        let mut stream = Stream::new_time_triggered([1; 6], [0; 6], 100, 3).unwrap();
        stream.add_event_schedule(1_000_000, 500_000).unwrap();
        let id = arena.insert(stream);

        let mut module = Module::create(ConnMode::Parallel, Speed::Gbps1, 0).unwrap();
        module.set_schedule(1_000_000, 0).unwrap();
        let caps = Capabilities::default();
        module.add_stream(&mut arena, id, &caps).unwrap();
        assert_eq!(module.fsc_list.len(), 1);
    }

    #[test]
    fn add_stream_rejects_already_owned_stream() {
        let mut arena: Arena<Stream> = Arena::new(1);
        let header = [0u8; 16];
        let id = arena.insert(Stream::new_ingress_triggered(LookupEntry::new(header, header, None, None, 0).unwrap()));
        let mut module = Module::create(ConnMode::Parallel, Speed::Gbps1, 0).unwrap();
        module.set_schedule(1_000_000, 0).unwrap();
        let caps = Capabilities::default();
        module.add_stream(&mut arena, id, &caps).unwrap();
        let mut other = Module::create(ConnMode::Parallel, Speed::Gbps1, 1).unwrap();
        other.set_schedule(1_000_000, 0).unwrap();
        assert_eq!(other.add_stream(&mut arena, id, &caps).unwrap_err(), AcmError::PermissionDenied);
    }

    #[test]
    fn incompatible_period_rolls_back_the_stream_addition() {
        let mut arena: Arena<Stream> = Arena::new(1);
        let mut stream = Stream::new_time_triggered([1; 6], [0; 6], 100, 3).unwrap();
        stream.add_event_schedule(300_000, 0).unwrap();
        let id = arena.insert(stream);
        let mut module = Module::create(ConnMode::Parallel, Speed::Gbps1, 0).unwrap();
        module.set_schedule(1_000_000, 0).unwrap(); // not a multiple of 300_000
        let caps = Capabilities::default();
        assert_eq!(module.add_stream(&mut arena, id, &caps).unwrap_err(), AcmError::PeriodIncompatible);
        assert!(module.streams.is_empty());
        assert!(module.fsc_list.is_empty());
    }
}
