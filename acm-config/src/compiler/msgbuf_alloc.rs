//! Message-buffer allocation with name-based de-duplication (spec §4.4.1).

use crate::arena::Arena;
use crate::error::{AcmError, AcmResult};
use crate::msgbuf::{Direction, MessageBuffer};
use crate::operation::{check_buffer_prefix, Opcode};
use crate::stream::{Stream, StreamId};

const ACM_MAX_MSG_BUFFERS: usize = 32;

fn size_in_blocks(length: u16, is_read: bool, block_granularity: u32) -> u32 {
    let bytes = length as u32 + if is_read { 4 } else { 0 };
    (bytes + block_granularity - 1) / block_granularity
}

/// Walks every module's streams in insertion order and allocates a
/// message-buffer descriptor for every `Insert`/`Read` operation, binding
/// `Operation::msg_buf` to the resulting index. `modules` lists, per module
/// in configuration order, the stream ids in the order they were added.
pub fn allocate(
    streams: &mut Arena<Stream>,
    modules: &[Vec<StreamId>],
    block_granularity: u32,
    hardware_buffer_memory: u32,
    buffer_prefix: &str,
) -> AcmResult<Vec<MessageBuffer>> {
    let mut buffers: Vec<MessageBuffer> = Vec::new();
    let mut next_offset: u32 = 0;

    for stream_ids in modules {
        for &stream_id in stream_ids {
            let stream = streams.get_mut(stream_id).map_err(|_| AcmError::Internal)?;
            for op_index in 0..stream.operations.len() {
                let (opcode, length, name, direction) = {
                    let op = &stream.operations[op_index];
                    let direction = if stream.is_ingress() { Direction::Rx } else { Direction::Tx };
                    (op.opcode, op.length, op.buffer_name.clone(), direction)
                };
                if !matches!(opcode, Opcode::Insert | Opcode::Read) {
                    continue;
                }
                let name = name.ok_or(AcmError::Internal)?;
                check_buffer_prefix(&name, buffer_prefix)?;
                let blocks = size_in_blocks(length, opcode == Opcode::Read, block_granularity);

                if let Some(existing) = buffers.iter().position(|b| b.name == name) {
                    if buffers[existing].direction != direction {
                        return Err(AcmError::PermissionDenied);
                    }
                    if blocks > buffers[existing].size_in_blocks {
                        let delta = blocks - buffers[existing].size_in_blocks;
                        buffers[existing].size_in_blocks = blocks;
                        for later in buffers.iter_mut().skip(existing + 1) {
                            later.byte_offset += delta * block_granularity;
                        }
                        next_offset += delta;
                    }
                    stream.operations[op_index].msg_buf = Some(existing);
                } else {
                    if buffers.len() >= ACM_MAX_MSG_BUFFERS {
                        return Err(AcmError::TooManyMessageBuffers);
                    }
                    let index = buffers.len();
                    let descriptor = MessageBuffer::new(index, next_offset * block_granularity, direction, blocks, name);
                    buffers.push(descriptor);
                    next_offset += blocks;
                    stream.operations[op_index].msg_buf = Some(index);
                }
            }
        }
    }

    if (next_offset as u64 + 1) * block_granularity as u64 >= hardware_buffer_memory as u64 {
        return Err(AcmError::TooManyMessageBuffers);
    }
    Ok(buffers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;

    #[test]
    fn same_name_and_direction_reuses_the_same_buffer() {
        let mut arena: Arena<Stream> = Arena::new(1);
        let mut s1 = Stream::new_time_triggered([1; 6], [0; 6], 100, 0).unwrap();
        s1.add_operation(Operation::insert(60, "acm_tx").unwrap()).unwrap();
        let mut s2 = Stream::new_time_triggered([2; 6], [0; 6], 100, 0).unwrap();
        s2.add_operation(Operation::insert(40, "acm_tx").unwrap()).unwrap();
        let id1 = arena.insert(s1);
        let id2 = arena.insert(s2);

        let buffers = allocate(&mut arena, &[vec![id1, id2]], 4, 4096, "acm_").unwrap();
        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers[0].size_in_blocks, 15); // max(ceil(60/4), ceil(40/4))

        let s1 = arena.get(id1).unwrap();
        let s2 = arena.get(id2).unwrap();
        let buf1 = s1.operations.iter().find(|o| o.opcode == crate::operation::Opcode::Insert).unwrap().msg_buf;
        let buf2 = s2.operations.iter().find(|o| o.opcode == crate::operation::Opcode::Insert).unwrap().msg_buf;
        assert_eq!(buf1, buf2);
    }

    #[test]
    fn same_name_different_direction_conflicts() {
        let mut arena: Arena<Stream> = Arena::new(1);
        let mut tx = Stream::new_time_triggered([1; 6], [0; 6], 100, 0).unwrap();
        tx.add_operation(Operation::insert(60, "acm_shared").unwrap()).unwrap();
        let header = [0u8; 16];
        let mut rx = Stream::new_ingress_triggered(crate::lookup::LookupEntry::new(header, header, None, None, 0).unwrap());
        rx.add_operation(Operation::read(0, 20, "acm_shared").unwrap()).unwrap();
        let id1 = arena.insert(tx);
        let id2 = arena.insert(rx);

        let result = allocate(&mut arena, &[vec![id1, id2]], 4, 4096, "acm_");
        assert_eq!(result, Err(AcmError::PermissionDenied));
    }

    #[test]
    fn buffer_name_without_configured_prefix_is_rejected() {
        let mut arena: Arena<Stream> = Arena::new(1);
        let mut s = Stream::new_time_triggered([1; 6], [0; 6], 100, 0).unwrap();
        s.add_operation(Operation::insert(60, "tx_main").unwrap()).unwrap();
        let id = arena.insert(s);

        let result = allocate(&mut arena, &[vec![id]], 4, 4096, "acm_");
        assert_eq!(result, Err(AcmError::InvalidArgument));
    }
}
