//! Incremental validator: non-final (bottom-up, run after every mutation)
//! and final (top-down, run at `apply_config`/`apply_schedule`) modes,
//! enforcing the hardware resource and semantic invariants of spec §3/§4.3.

use log::debug;

use crate::arena::{Arena, ArenaError};
use crate::compiler::indices::{GATHER_START_IDX, LOOKUP_FALLBACK_SLOT, REDUNDANCY_START_IDX, SCATTER_START_IDX};
use crate::config::Configuration;
use crate::error::{AcmError, AcmResult};
use crate::module::Module;
use crate::operation::{Opcode, ACM_MAX_CONST_BUFFER_SIZE, ACM_MAX_INSERT_OPERATIONS, ACM_MIN_FRAME_SIZE, MAX_PAYLOAD_HEADER_SIZE, MAX_TRUNC_BYTES};
use crate::stream::{Stream, StreamId, StreamVariant};

const ANZ_MIN_TICKS: u64 = 8;
const ACM_MAX_SCHEDULE_EVENTS: usize = 1024;
const ACM_MAX_REDUNDANT_STREAMS: usize = 32;

fn map_arena_error(e: ArenaError) -> AcmError {
    match e {
        ArenaError::ForeignHandle => AcmError::DifferentConfig,
        ArenaError::Stale => AcmError::Internal,
    }
}

/// Walks a stream's operation list, checking the forward-offset truncation
/// rule and the final egress payload-size bounds.
fn check_stream_payload(stream: &Stream, final_validate: bool) -> AcmResult<()> {
    let mut egress_pos: u32 = 0;
    let mut ingress_pos: u32 = 0;
    for op in &stream.operations {
        match op.opcode {
            Opcode::Insert | Opcode::InsertConstant | Opcode::Pad => {
                egress_pos += op.length as u32;
                ingress_pos += op.length as u32;
            }
            Opcode::Forward => {
                if op.offset as u32 > ingress_pos + MAX_TRUNC_BYTES as u32 {
                    return Err(AcmError::ForwardOffset);
                }
                egress_pos += op.length as u32;
                ingress_pos = ingress_pos.max(op.offset as u32) + op.length as u32;
            }
            Opcode::Read | Opcode::ForwardAll => {}
        }
    }
    if final_validate && stream.is_egress() && egress_pos < ACM_MIN_FRAME_SIZE as u32 {
        return Err(AcmError::EgressFrameTooSmall);
    }
    if egress_pos > MAX_PAYLOAD_HEADER_SIZE as u32 {
        return Err(AcmError::PayloadTooLarge);
    }
    Ok(())
}

fn stream_sum_const_buffer(stream: &Stream) -> u32 {
    stream.operations.iter().filter(|o| o.opcode == Opcode::InsertConstant).map(|o| o.length as u32).sum()
}

/// Cross-checks a redundant stream's partner: the two must be added to
/// different modules of the same configuration (final mode only — while
/// detached/non-final, the partner may not yet be bound to anything).
fn check_redundant_partner(streams: &Arena<Stream>, stream_id: StreamId, stream: &Stream, final_validate: bool) -> AcmResult<()> {
    let Some(partner_id) = stream.reference_redundant else {
        return Ok(());
    };
    let partner = match streams.get(partner_id) {
        Ok(p) => p,
        Err(e) => return Err(map_arena_error(e)),
    };
    if !final_validate {
        return Ok(());
    }
    let (Some(own), Some(their)) = (stream.owner, partner.owner) else {
        return Err(AcmError::StreamNotInConfig);
    };
    if !own.config_bound || !their.config_bound {
        return Err(AcmError::StreamNotInConfig);
    }
    if own.module_id == their.module_id {
        return Err(AcmError::RedundantSameModule);
    }
    let _ = stream_id;
    Ok(())
}

/// Validates one stream: payload rules, insert-operation cap, redundant
/// partner cross-check. `final_validate` gates the min-egress-framesize
/// rule and the redundant-partner configuration checks.
pub fn validate_stream(streams: &Arena<Stream>, stream_id: StreamId, final_validate: bool) -> AcmResult<()> {
    let stream = streams.get(stream_id).map_err(map_arena_error)?;
    check_stream_payload(stream, final_validate)?;
    if stream.insert_op_count() > ACM_MAX_INSERT_OPERATIONS {
        return Err(AcmError::TooManyInsertOps);
    }
    check_redundant_partner(streams, stream_id, stream, final_validate)?;
    Ok(())
}

/// Validates every stream of a module, then the module-level aggregate
/// invariants (constant-buffer sum, redundant-stream count, FSC count and
/// gap spacing, gather/scatter/lookup counts, schedule-period divisibility).
pub fn validate_module(module: &Module, streams: &Arena<Stream>, final_validate: bool) -> AcmResult<()> {
    if final_validate {
        for &id in &module.streams {
            validate_stream(streams, id, true)?;
        }
    }

    if module.cycle_ns == 0 {
        return Err(AcmError::BadModuleCycle);
    }

    let const_sum: u32 = module.streams.iter().filter_map(|&id| streams.get(id).ok()).map(stream_sum_const_buffer).sum();
    if const_sum > ACM_MAX_CONST_BUFFER_SIZE as u32 {
        return Err(AcmError::ConstBufferOverflow);
    }

    let redundant_count = module.redundant_stream_count(streams);
    if redundant_count + REDUNDANCY_START_IDX as usize > ACM_MAX_REDUNDANT_STREAMS {
        return Err(AcmError::TooManyRedundantStreams);
    }

    let first_at_zero = module.fsc_list.first().map(|c| c.abs_cycle == 0).unwrap_or(true);
    let fsc_cap = if first_at_zero { ACM_MAX_SCHEDULE_EVENTS } else { ACM_MAX_SCHEDULE_EVENTS - 1 };
    if module.fsc_list.len() > fsc_cap {
        return Err(AcmError::TooManyScheduleEvents);
    }

    for &id in &module.streams {
        if let Ok(stream) = streams.get(id) {
            for schedule in &stream.schedules {
                if module.cycle_ns % schedule.period_ns() != 0 {
                    return Err(AcmError::PeriodIncompatible);
                }
            }
        }
    }

    check_module_scheduling_gaps(module)?;

    // Gather/scatter table rows are per-operation, not per-stream: one
    // gather row per Insert/InsertConstant/Pad/Forward (plus an extra R-Tag
    // row for a redundant-TX stream), one scatter row per Read.
    let gather_ops: usize = module
        .streams
        .iter()
        .filter_map(|&id| streams.get(id).ok())
        .filter(|s| s.is_egress())
        .map(|s| {
            let op_rows = s.operations.iter().filter(|o| matches!(o.opcode, Opcode::Insert | Opcode::InsertConstant | Opcode::Pad | Opcode::Forward)).count();
            op_rows + if s.variant == StreamVariant::RedundantTx { 1 } else { 0 }
        })
        .sum();
    if gather_ops + GATHER_START_IDX as usize > 256 {
        return Err(AcmError::TooManyEgressOps);
    }
    let scatter_ops: usize = module
        .streams
        .iter()
        .filter_map(|&id| streams.get(id).ok())
        .filter(|s| s.is_ingress())
        .map(|s| s.operations.iter().filter(|o| o.opcode == Opcode::Read).count())
        .sum();
    if scatter_ops + SCATTER_START_IDX as usize > 256 {
        return Err(AcmError::TooManyIngressOps);
    }
    let lookup_ops = module
        .streams
        .iter()
        .filter(|&&id| streams.get(id).map(|s| matches!(s.variant, StreamVariant::IngressTriggered | StreamVariant::RedundantRx)).unwrap_or(false))
        .count();
    if lookup_ops >= LOOKUP_FALLBACK_SLOT as usize {
        return Err(AcmError::TooManyLookupEntries);
    }

    debug!("module {} validated ({} streams, {} fsc commands)", module.module_id, module.streams.len(), module.fsc_list.len());
    Ok(())
}

/// Every pair of adjacent commands (after sorting) must differ in
/// `abs_cycle` by at least `ANZ_MIN_TICKS`, except a first command sitting
/// exactly at cycle 0.
fn check_module_scheduling_gaps(module: &Module) -> AcmResult<()> {
    let mut last: Option<u64> = None;
    for (i, cmd) in module.fsc_list.iter().enumerate() {
        if let Some(last_time) = last {
            let diff = cmd.abs_cycle.saturating_sub(last_time);
            let is_leading_zero = i == 1 && last_time == 0 && diff == 0;
            if diff < ANZ_MIN_TICKS && !is_leading_zero {
                return Err(AcmError::BadScheduleTime);
            }
        }
        last = Some(cmd.abs_cycle);
    }
    Ok(())
}

fn check_module_op_exists(module: &Module, streams: &Arena<Stream>) -> AcmResult<()> {
    for &id in &module.streams {
        let Ok(stream) = streams.get(id) else { continue };
        if stream.operations.is_empty() {
            let has_event_child = stream.variant == StreamVariant::IngressTriggered && stream.reference.is_some();
            if !has_event_child {
                return Err(AcmError::OperationMissing);
            }
        }
    }
    Ok(())
}

/// Validates a whole configuration. Non-final mode is reached by an upward
/// walk from a module mutation and only re-checks module-level invariants
/// plus the message-buffer table; final mode additionally walks every
/// stream top-down and checks that every stream has an operation.
pub fn validate_config(config: &mut Configuration, final_validate: bool) -> AcmResult<()> {
    if final_validate {
        for module in config.modules.iter().flatten() {
            validate_module(module, &config.streams, true)?;
        }
        for module in config.modules.iter().flatten() {
            check_module_op_exists(module, &config.streams)?;
        }
    } else {
        for module in config.modules.iter().flatten() {
            validate_module(module, &config.streams, false)?;
        }
    }

    config.recompute_msg_buffers()?;
    if config.msg_buffers.len() > 32 {
        return Err(AcmError::TooManyMessageBuffers);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::LookupEntry;
    use crate::operation::Operation;

    #[test]
    fn forward_offset_within_truncation_window_is_accepted() {
        // Forward is only admissible on an Event stream (spec §3); TimeTriggered
        // has no Forward in its opcode bitset.
        let mut s = Stream::new_event();
        s.add_operation(Operation::insert(3, "acm_b").unwrap()).unwrap();
        s.add_operation(Operation::pad(13, 0).unwrap()).unwrap();
        s.add_operation(Operation::forward(35, 2).unwrap()).unwrap();
        assert!(check_stream_payload(&s, false).is_ok());
    }

    #[test]
    fn forward_offset_beyond_truncation_window_is_rejected() {
        let mut s = Stream::new_event();
        s.add_operation(Operation::insert(3, "acm_b").unwrap()).unwrap();
        s.add_operation(Operation::pad(13, 0).unwrap()).unwrap();
        s.add_operation(Operation::forward(36, 2).unwrap()).unwrap();
        assert_eq!(check_stream_payload(&s, false), Err(AcmError::ForwardOffset));
    }

    #[test]
    fn final_mode_enforces_minimum_egress_frame_size() {
        let mut s = Stream::new_time_triggered([1; 6], [0; 6], 100, 0).unwrap();
        s.clean_operations(); // drop the 16-byte header seed for this arithmetic check
        s.add_operation(Operation::pad(10, 0).unwrap()).unwrap();
        assert_eq!(check_stream_payload(&s, true), Err(AcmError::EgressFrameTooSmall));
    }

    #[test]
    fn lookup_slot_exhaustion_is_rejected() {
        let header = [0u8; 16];
        let _ = LookupEntry::new(header, header, None, None, 0).unwrap();
        // exercised end-to-end in compiler::indices tests; validated here only
        // via the count threshold constant re-used from that module.
        assert_eq!(LOOKUP_FALLBACK_SLOT, 16);
    }

    #[test]
    fn gather_scatter_caps_count_operations_not_streams() {
        use crate::module::{ConnMode, Module, Speed};

        let mut arena: Arena<Stream> = Arena::new(1);
        let mut stream = Stream::new_time_triggered([1; 6], [0; 6], 100, 0).unwrap();
        for i in 0..8 {
            stream.add_operation(Operation::insert(10, &format!("acm_x{i}")).unwrap()).unwrap();
        }
        let id = arena.insert(stream);
        let mut module = Module::create(ConnMode::Parallel, Speed::Gbps1, 0).unwrap();
        module.set_schedule(1_000_000, 0).unwrap();
        module.streams.push(id);

        // A single stream carrying 8 Inserts (plus its 3 generated header
        // ops) yields 11 gather rows, not the "1 stream" a per-stream count
        // would have reported — still far under the 256-row cap either way,
        // but the distinction matters once many streams are packed tightly.
        validate_module(&module, &arena, false).unwrap();
        let gather_ops = arena.get(id).unwrap().operations.len();
        assert_eq!(gather_ops, 11);
    }
}
