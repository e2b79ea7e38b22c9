//! Per-module fetch-and-schedule (FSC) command generation (spec §4.4.2).

use crate::schedule::ScheduleEntry;
use crate::stream::StreamId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    StandAlone,
    NoTrigger,
    FirstStage,
}

/// One row of a module's compiled command list. Indices are filled in with
/// whatever the stream's computed indices are at generation time; they are
/// rewritten again just before the table write (§4.4.3's "late bind").
#[derive(Debug, Clone, Copy)]
pub struct FscCommand {
    pub abs_cycle: u64,
    pub stream: StreamId,
    pub schedule_tag: u32,
    pub gather_dma_index: u16,
    pub lookup_index: u16,
    pub redundand_index: u16,
    pub trigger: Trigger,
    pub win_open: bool,
    pub win_close: bool,
}

/// Rounds `value / tick` to the nearest integer, ties away from zero.
/// `value` is only ever called with a non-negative numerator here; negative
/// occurrences are filtered out by the caller before rounding.
fn round_div(value: u64, tick: u64) -> u64 {
    (value * 2 + tick) / (2 * tick)
}

fn ceil_div(value: u64, tick: u64) -> u64 {
    (value + tick - 1) / tick
}

#[allow(clippy::too_many_arguments)]
pub fn generate_event_commands(
    stream: StreamId,
    period_ns: u64,
    send_time_ns: u64,
    schedule_tag: u32,
    cycle_ns: u64,
    tick_ns: u64,
    chip_eg_ns: u64,
    phy_eg_ns: u64,
    gather_dma_index: u16,
    redundand_index: u16,
) -> Vec<FscCommand> {
    let occurrences = cycle_ns / period_ns;
    let mut commands = Vec::with_capacity(occurrences as usize);
    let mut i: u64 = 0;
    let skew = chip_eg_ns + phy_eg_ns;
    while (commands.len() as u64) < occurrences {
        let raw = send_time_ns as i64 + (i as i64) * (period_ns as i64) - skew as i64;
        if raw < 0 {
            i += 1;
            continue;
        }
        let abs_cycle = round_div(raw as u64, tick_ns);
        commands.push(FscCommand {
            abs_cycle,
            stream,
            schedule_tag,
            gather_dma_index,
            lookup_index: 0,
            redundand_index,
            trigger: Trigger::StandAlone,
            win_open: false,
            win_close: false,
        });
        i += 1;
    }
    commands
}

#[allow(clippy::too_many_arguments)]
pub fn generate_window_commands(
    stream: StreamId,
    period_ns: u64,
    time_start_ns: u64,
    time_end_ns: u64,
    schedule_tag: u32,
    cycle_ns: u64,
    tick_ns: u64,
    chip_in_ns: u64,
    phy_in_ns: u64,
    ser_switch_ns: u64,
    serial: bool,
    lookup_index: u16,
    recovery_gather_index: Option<u16>,
) -> Vec<FscCommand> {
    let occurrences = cycle_ns / period_ns;
    let cycle_ticks = cycle_ns / tick_ns;
    let open_skew = chip_in_ns + phy_in_ns + if serial { ser_switch_ns } else { 0 };
    let close_skew = chip_in_ns + phy_in_ns;
    let mut commands = Vec::with_capacity(2 * occurrences as usize);
    for i in 0..occurrences {
        let open_raw = time_start_ns + i * period_ns + open_skew;
        let mut open_cycle = open_raw / tick_ns;
        if open_cycle >= cycle_ticks {
            open_cycle -= cycle_ticks;
        }
        commands.push(FscCommand {
            abs_cycle: open_cycle,
            stream,
            schedule_tag,
            gather_dma_index: 0,
            lookup_index,
            redundand_index: 0,
            trigger: Trigger::NoTrigger,
            win_open: true,
            win_close: false,
        });

        let close_raw = time_end_ns + i * period_ns + close_skew;
        let mut close_cycle = ceil_div(close_raw, tick_ns);
        if close_cycle >= cycle_ticks {
            close_cycle -= cycle_ticks;
        }
        let (trigger, gather_dma_index) = match recovery_gather_index {
            Some(idx) => (Trigger::FirstStage, idx),
            None => (Trigger::NoTrigger, 0),
        };
        commands.push(FscCommand {
            abs_cycle: close_cycle,
            stream,
            schedule_tag,
            gather_dma_index,
            lookup_index,
            redundand_index: 0,
            trigger,
            win_open: false,
            win_close: true,
        });
    }
    commands
}

/// Stable ascending insert by `abs_cycle`: ties keep FIFO order, matching
/// the original's append-on-tie behaviour.
pub fn insert_sorted(list: &mut Vec<FscCommand>, cmd: FscCommand) {
    let pos = list.iter().position(|existing| existing.abs_cycle > cmd.abs_cycle).unwrap_or(list.len());
    list.insert(pos, cmd);
}

pub fn insert_all_sorted(list: &mut Vec<FscCommand>, cmds: impl IntoIterator<Item = FscCommand>) {
    for cmd in cmds {
        insert_sorted(list, cmd);
    }
}

/// Removes every command generated from `stream`'s given schedule entry.
pub fn remove_for_schedule(list: &mut Vec<FscCommand>, stream: StreamId, schedule: &ScheduleEntry) {
    let tag = schedule.tag();
    list.retain(|cmd| !(cmd.stream == stream && cmd.schedule_tag == tag));
}

/// Removes every command generated from any schedule entry of `stream`.
pub fn remove_for_stream(list: &mut Vec<FscCommand>, stream: StreamId) {
    list.retain(|cmd| cmd.stream != stream);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::stream::Stream;

    fn dummy_stream_id() -> StreamId {
        let mut arena: Arena<Stream> = Arena::new(1);
        arena.insert(Stream::new_event())
    }

    #[test]
    fn event_commands_count_matches_cycle_over_period() {
        let s = dummy_stream_id();
        let cmds = generate_event_commands(s, 200_000, 100_000, 0, 1_000_000, 10, 0, 0, 2, 0);
        assert_eq!(cmds.len(), 5);
    }

    #[test]
    fn negative_occurrence_is_skipped_but_iteration_extends() {
        let s = dummy_stream_id();
        // send_time - skew goes negative for i=0; the generator must still
        // emit exactly `occurrences` commands by extending i.
        let cmds = generate_event_commands(s, 500_000, 100_000, 0, 1_000_000, 10, 200_000, 0, 2, 0);
        assert_eq!(cmds.len(), 2);
    }

    #[test]
    fn window_commands_emit_open_and_close_pair() {
        let s = dummy_stream_id();
        let cmds = generate_window_commands(s, 1_000_000, 100_000, 400_000, 0, 1_000_000, 10, 0, 0, 0, false, 3, None);
        assert_eq!(cmds.len(), 2);
        assert!(cmds[0].win_open);
        assert!(cmds[1].win_close);
    }

    #[test]
    fn sorted_insert_keeps_ascending_order_with_fifo_ties() {
        let s = dummy_stream_id();
        let mut list = Vec::new();
        let mk = |cycle, tag| FscCommand {
            abs_cycle: cycle,
            stream: s,
            schedule_tag: tag,
            gather_dma_index: 0,
            lookup_index: 0,
            redundand_index: 0,
            trigger: Trigger::StandAlone,
            win_open: false,
            win_close: false,
        };
        insert_sorted(&mut list, mk(10, 1));
        insert_sorted(&mut list, mk(5, 2));
        insert_sorted(&mut list, mk(10, 3));
        let cycles: Vec<_> = list.iter().map(|c| c.abs_cycle).collect();
        assert_eq!(cycles, vec![5, 10, 10]);
        assert_eq!(list[1].schedule_tag, 1);
        assert_eq!(list[2].schedule_tag, 3);
    }
}
