//! Hardware table emission: constant buffer, lookup tables, scatter/gather
//! DMA and prefetch tables, redundancy table, FSC schedule tables, and the
//! fixed write order of spec §4.4.4.
//!
//! FSC command payloads are packed into a 32-bit word with
//! `tock_registers`' `register_bitfields!`/`LocalRegisterCopy`, the same
//! machinery the teacher driver uses to describe MMIO register layouts —
//! here repurposed to pack a plain in-memory value rather than address a
//! device register, since the payload word is assembled locally and only
//! then handed to [`crate::device::DeviceInterface`] for the actual write.

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::{InMemoryRegister, LocalRegisterCopy};
use tock_registers::register_bitfields;

use crate::arena::Arena;
use crate::compiler::fsc::{FscCommand, Trigger};
use crate::device::{DeviceInterface, Subdir};
use crate::error::{AcmError, AcmResult};
use crate::module::Module;
use crate::msgbuf::MessageBuffer;
use crate::operation::Opcode;
use crate::stream::{Stream, StreamVariant};

register_bitfields![u32,
    FscPayload [
        GATHER_INDEX OFFSET(0) NUMBITS(9) [],
        LOOKUP_INDEX OFFSET(9) NUMBITS(5) [],
        REDUND_INDEX OFFSET(14) NUMBITS(6) [],
        TRIGGER OFFSET(20) NUMBITS(2) [
            StandAlone = 0,
            NoTrigger = 1,
            FirstStage = 2
        ],
        WIN_OPEN OFFSET(22) NUMBITS(1) [],
        WIN_CLOSE OFFSET(23) NUMBITS(1) []
    ]
];

register_bitfields![u32,
    RedundancyEntry [
        SRC OFFSET(0) NUMBITS(2) [
            InternalSeqNum = 0
        ],
        UPDATE OFFSET(2) NUMBITS(2) [
            FinishBoth = 0
        ],
        DROP_NO_RTAG OFFSET(4) NUMBITS(1) [],
        INDEX OFFSET(8) NUMBITS(6) []
    ]
];

pub const NOP_DELTA_CYCLE: u64 = 60_000;
const MIN_GAP_TICKS: u16 = 8;

fn trigger_value(trigger: Trigger) -> u32 {
    match trigger {
        Trigger::StandAlone => 0,
        Trigger::NoTrigger => 1,
        Trigger::FirstStage => 2,
    }
}

/// Packs one FSC command's payload bits, rewriting its indices "late" —
/// at write time — so a structural change after generation is always
/// reflected in the bytes that reach hardware (spec §4.4.3).
pub fn pack_fsc_payload(cmd: &FscCommand) -> u32 {
    let reg: InMemoryRegister<u32, FscPayload::Register> = InMemoryRegister::new(0);
    reg.write(
        FscPayload::GATHER_INDEX.val(cmd.gather_dma_index as u32)
            + FscPayload::LOOKUP_INDEX.val(cmd.lookup_index as u32)
            + FscPayload::REDUND_INDEX.val(cmd.redundand_index as u32)
            + FscPayload::TRIGGER.val(trigger_value(cmd.trigger))
            + FscPayload::WIN_OPEN.val(cmd.win_open as u32)
            + FscPayload::WIN_CLOSE.val(cmd.win_close as u32),
    );
    reg.get()
}

/// Converts a module's absolute-tick FSC list to delta-tick rows, inserting
/// NOP fillers (delta `NOP_DELTA_CYCLE`) wherever the gap exceeds the
/// hardware's 16-bit delta field, per spec §4.4.4 step 2. The trailing gap
/// after the last real command is fixed at the hardware minimum.
pub fn delta_encode(fsc_list: &[FscCommand], cycle_ticks: u64) -> Vec<(u16, Option<u32>)> {
    let mut out = Vec::new();
    let mut last = 0u64;
    for cmd in fsc_list {
        let mut gap = cmd.abs_cycle.saturating_sub(last);
        while gap > u16::MAX as u64 {
            let chunk = gap.min(NOP_DELTA_CYCLE);
            out.push((chunk as u16, None));
            gap -= chunk;
        }
        out.push((gap as u16, Some(pack_fsc_payload(cmd))));
        last = cmd.abs_cycle;
    }
    let trailing = cycle_ticks.saturating_sub(last);
    if trailing > u16::MAX as u64 {
        let mut remaining = trailing - MIN_GAP_TICKS as u64;
        while remaining > 0 {
            let chunk = remaining.min(NOP_DELTA_CYCLE);
            out.push((chunk as u16, None));
            remaining -= chunk;
        }
        out.push((MIN_GAP_TICKS, None));
    } else {
        out.push((trailing.max(MIN_GAP_TICKS as u64) as u16, None));
    }
    out
}

/// Writes every hardware table for one module, in the fixed order of spec
/// §4.4.4. `base_row` is the module's starting row in the shared
/// config_bin tables (module 0 at row 0, module 1 after module 0's rows).
pub fn write_module_tables(
    device: &DeviceInterface,
    module: &Module,
    streams: &mut Arena<Stream>,
    msg_buffers: &[MessageBuffer],
) -> AcmResult<()> {
    write_constant_buffer(device, module, streams)?;
    write_lookup_tables(device, module, streams)?;
    write_scatter_table(device, module, streams)?;
    write_gather_and_prefetch_tables(device, module, streams, msg_buffers)?;
    write_redundancy_table(device, module, streams)?;
    device.write_text_scalar(Subdir::ConfigBin, &format!("m{}_link_speed", module.module_id), module.speed as u8 as u32)?;
    device.write_text_scalar(Subdir::ConfigBin, &format!("m{}_enable", module.module_id), 1u32)?;
    Ok(())
}

/// Emits every `InsertConstant` payload contiguously and records each
/// operation's `const_buff_offset` as it goes, the same way
/// `msgbuf_alloc::allocate` binds `msg_buf` during its own walk — the
/// gather table's "move-from-constant-buffer" row reads this offset back
/// (spec §4.4.4 step 1).
fn write_constant_buffer(device: &DeviceInterface, module: &Module, streams: &mut Arena<Stream>) -> AcmResult<()> {
    let mut buf = Vec::new();
    for &id in &module.streams {
        let Ok(stream) = streams.get_mut(id) else { continue };
        for op in &mut stream.operations {
            if op.opcode == Opcode::InsertConstant {
                op.const_buff_offset = Some(buf.len() as u16);
                buf.extend_from_slice(&op.data);
            }
        }
    }
    device.write_at(Subdir::ConfigBin, &format!("m{}_const_buffer", module.module_id), 0, &buf)
}

fn write_lookup_tables(device: &DeviceInterface, module: &Module, streams: &Arena<Stream>) -> AcmResult<()> {
    for &id in &module.streams {
        let Ok(stream) = streams.get(id) else { continue };
        let Some(lookup) = &stream.lookup else { continue };
        let Some(index) = stream.indices.lookup_index else { continue };
        let offset = index as u64 * 16;
        device.write_at(Subdir::ConfigBin, &format!("m{}_lookup_pattern", module.module_id), offset, &lookup.header_pattern)?;
        device.write_at(Subdir::ConfigBin, &format!("m{}_lookup_mask", module.module_id), offset, &lookup.header_mask)?;
        if let Some((pattern, mask)) = &lookup.filter {
            let filter_offset = index as u64 * crate::lookup::ACM_MAX_FILTER_SIZE as u64;
            device.write_at(Subdir::ConfigBin, &format!("m{}_lookup_filter_pattern", module.module_id), filter_offset, pattern)?;
            device.write_at(Subdir::ConfigBin, &format!("m{}_lookup_filter_mask", module.module_id), filter_offset, mask)?;
        }
    }
    let fallback: u32 = if module.mode == crate::module::ConnMode::Serial { 1 } else { 0 };
    device.write_text_scalar(Subdir::ConfigBin, &format!("m{}_lookup_fallback", module.module_id), fallback)
}

fn write_scatter_table(device: &DeviceInterface, module: &Module, streams: &Arena<Stream>) -> AcmResult<()> {
    let mut rows: Vec<u8> = vec![0u8; 4]; // slot 0: permanent NOP row
    for &id in &module.streams {
        let Ok(stream) = streams.get(id) else { continue };
        if !stream.is_ingress() {
            continue;
        }
        let read_ops: Vec<_> = stream.operations.iter().filter(|o| o.opcode == Opcode::Read).collect();
        for (i, op) in read_ops.iter().enumerate() {
            let last = i + 1 == read_ops.len();
            rows.push(op.msg_buf.unwrap_or(0) as u8);
            rows.push(last as u8);
            rows.push(0);
            rows.push(0);
        }
    }
    device.write_at(Subdir::ConfigBin, &format!("m{}_scatter_dma", module.module_id), 0, &rows)
}

fn write_gather_and_prefetch_tables(
    device: &DeviceInterface,
    module: &Module,
    streams: &Arena<Stream>,
    msg_buffers: &[MessageBuffer],
) -> AcmResult<()> {
    let mut gather_rows: Vec<u8> = vec![0u8; 8]; // slot 0 NOP, slot 1 forward-all
    let mut prefetch_rows: Vec<u8> = Vec::new();

    for &id in &module.streams {
        let Ok(stream) = streams.get(id) else { continue };
        if !stream.is_egress() {
            continue;
        }
        let lock_vector: Vec<u16> = stream
            .operations
            .iter()
            .filter(|o| o.opcode == Opcode::Insert)
            .filter_map(|o| o.msg_buf)
            .map(|idx| msg_buffers.get(idx).map(|b| b.index as u16).unwrap_or(0))
            .collect();
        for word in lock_vector.iter().take(4) {
            prefetch_rows.extend_from_slice(&word.to_le_bytes());
        }
        if stream.variant == StreamVariant::RedundantTx {
            gather_rows.extend_from_slice(&[0xff, 0, 0, 0]); // R-Tag gather command marker
        }
        for op in &stream.operations {
            match op.opcode {
                Opcode::Insert => {
                    gather_rows.push(1); // move-from-prefetch
                    gather_rows.extend_from_slice(&(op.msg_buf.unwrap_or(0) as u16).to_le_bytes());
                    gather_rows.push(0);
                    prefetch_rows.push(2); // move-from-message-buffer
                    prefetch_rows.extend_from_slice(&(op.msg_buf.unwrap_or(0) as u16).to_le_bytes());
                    prefetch_rows.push(0);
                }
                Opcode::InsertConstant => {
                    gather_rows.push(3); // move-from-constant-buffer
                    gather_rows.extend_from_slice(&op.const_buff_offset.unwrap_or(0).to_le_bytes());
                    gather_rows.push(0);
                }
                Opcode::Pad => {
                    gather_rows.push(4);
                    gather_rows.extend_from_slice(&op.length.to_le_bytes());
                    gather_rows.push(op.data.first().copied().unwrap_or(0));
                }
                Opcode::Forward => {
                    gather_rows.push(5);
                    gather_rows.extend_from_slice(&op.offset.to_le_bytes());
                    gather_rows.push(op.length as u8);
                }
                Opcode::Read | Opcode::ForwardAll => {}
            }
        }
    }

    device.write_at(Subdir::ConfigBin, &format!("m{}_gather_dma", module.module_id), 0, &gather_rows)?;
    device.write_at(Subdir::ConfigBin, &format!("m{}_prefetch_dma", module.module_id), 0, &prefetch_rows)
}

/// Writes the per-module redundancy control table (spec §4.4.4 step 5 /
/// §8 scenario 2: entry 0 is a permanent NOP, real entries indexed
/// thereafter by `redundand_index`, each encoding
/// `{src=InternalSeqNum, update=FinishBoth, drop_no_rtag=false, index}`)
/// and the matching individual-recovery-timeout table, reading the
/// per-stream override `set_rtag_stream` recorded on
/// `indiv_recov_timeout_ms` where one was set rather than always falling
/// back to the module's config-file default.
fn write_redundancy_table(device: &DeviceInterface, module: &Module, streams: &Arena<Stream>) -> AcmResult<()> {
    const ENTRY_SIZE: u64 = 4;
    device.write_at(Subdir::ConfigBin, &format!("m{}_redund_cnt_tab", module.module_id), 0, &[0u8; ENTRY_SIZE as usize])?;
    device.write_at(
        Subdir::ConfigBin,
        &format!("m{}_individual_recovery", module.module_id),
        0,
        &module.recovery_timeout_ms.to_le_bytes(),
    )?;

    for &id in &module.streams {
        let Ok(stream) = streams.get(id) else { continue };
        if !matches!(stream.variant, StreamVariant::RedundantTx | StreamVariant::RedundantRx) {
            continue;
        }
        let Some(index) = stream.indices.redundand_index else { continue };
        if index == 0 {
            continue;
        }
        let offset = index as u64 * ENTRY_SIZE;

        let reg: InMemoryRegister<u32, RedundancyEntry::Register> = InMemoryRegister::new(0);
        reg.write(
            RedundancyEntry::SRC::InternalSeqNum
                + RedundancyEntry::UPDATE::FinishBoth
                + RedundancyEntry::DROP_NO_RTAG.val(0)
                + RedundancyEntry::INDEX.val(index as u32),
        );
        device.write_at(Subdir::ConfigBin, &format!("m{}_redund_cnt_tab", module.module_id), offset, &reg.get().to_le_bytes())?;

        let timeout_ms = stream.indices.indiv_recov_timeout_ms.unwrap_or(module.recovery_timeout_ms);
        device.write_at(Subdir::ConfigBin, &format!("m{}_individual_recovery", module.module_id), offset, &timeout_ms.to_le_bytes())?;
    }
    Ok(())
}

/// Writes a module's compiled schedule to one of the two hardware
/// schedule-table slots, converting absolute ticks to the delta-tick rows
/// of [`delta_encode`] and arming the scheduler by writing cycle/start last
/// (spec §4.4.4's schedule-application steps).
pub fn write_schedule(device: &DeviceInterface, module: &Module, slot: u8, tick_ns: u64) -> AcmResult<()> {
    let cycle_ticks = module.cycle_ns / tick_ns;
    let rows = delta_encode(&module.fsc_list, cycle_ticks);
    let mut bytes = Vec::with_capacity(rows.len() * 6);
    for (delta, payload) in rows {
        bytes.extend_from_slice(&delta.to_le_bytes());
        bytes.extend_from_slice(&payload.unwrap_or(0).to_le_bytes());
    }
    device.write_at(Subdir::ConfigBin, &format!("sched_tab_row_s{slot}"), 0, &bytes)?;
    device.write_text_scalar(Subdir::ConfigBin, &format!("sched_cycle_time_s{slot}"), module.cycle_ns)?;
    device.write_text_scalar(Subdir::ConfigBin, &format!("sched_start_time_s{slot}"), module.start_ns)?;
    device.write_text_scalar(Subdir::ConfigBin, &format!("m{}_emergency_disable", module.module_id), 0u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::compiler::fsc::FscCommand;
    use crate::stream::Stream;

    fn dummy_stream_id() -> crate::stream::StreamId {
        let mut arena: Arena<Stream> = Arena::new(1);
        arena.insert(Stream::new_event())
    }

    #[test]
    fn payload_round_trips_through_the_bitfield() {
        let cmd = FscCommand {
            abs_cycle: 0,
            stream: dummy_stream_id(),
            schedule_tag: 0,
            gather_dma_index: 5,
            lookup_index: 3,
            redundand_index: 1,
            trigger: Trigger::FirstStage,
            win_open: false,
            win_close: true,
        };
        let packed = pack_fsc_payload(&cmd);
        let reg = LocalRegisterCopy::<u32, FscPayload::Register>::new(packed);
        assert_eq!(reg.read(FscPayload::GATHER_INDEX), 5);
        assert_eq!(reg.read(FscPayload::LOOKUP_INDEX), 3);
        assert_eq!(reg.read(FscPayload::REDUND_INDEX), 1);
        assert_eq!(reg.read(FscPayload::TRIGGER), 2);
        assert_eq!(reg.read(FscPayload::WIN_CLOSE), 1);
    }

    #[test]
    fn delta_encode_inserts_nop_fillers_for_long_gaps() {
        let stream = dummy_stream_id();
        let cmd = FscCommand {
            abs_cycle: 19_999_992,
            stream,
            schedule_tag: 0,
            gather_dma_index: 2,
            lookup_index: 0,
            redundand_index: 0,
            trigger: Trigger::StandAlone,
            win_open: false,
            win_close: false,
        };
        let first = FscCommand { abs_cycle: 0, ..cmd };
        let rows = delta_encode(&[first, cmd], 20_000_000);
        let nop_count = rows.iter().filter(|(_, payload)| payload.is_none()).count();
        assert!(nop_count >= 333);
        let sum: u64 = rows.iter().map(|(d, _)| *d as u64).sum();
        assert_eq!(sum, 20_000_000);
    }
}
