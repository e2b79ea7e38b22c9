//! Streams: a stream variant's operations, schedule, lookup entry, and the
//! identity cross-references that tie streams into ingress→event→recovery
//! chains and redundant-TX pairs.

use crate::arena::Handle;
use crate::error::{AcmError, AcmResult};
use crate::lookup::LookupEntry;
use crate::operation::{Opcode, Operation, ACM_MAX_INSERT_OPERATIONS};
use crate::schedule::ScheduleEntry;

pub type StreamId = Handle<Stream>;

/// The five stream variants named by the data model, plus the two
/// redundancy-relabelled forms a `TimeTriggered`/`IngressTriggered` stream
/// takes on once linked into a redundant pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamVariant {
    TimeTriggered,
    IngressTriggered,
    Event,
    Recovery,
    RedundantTx,
    RedundantRx,
}

impl StreamVariant {
    pub fn is_egress(self) -> bool {
        matches!(self, StreamVariant::TimeTriggered | StreamVariant::Event | StreamVariant::Recovery | StreamVariant::RedundantTx)
    }

    pub fn is_ingress(self) -> bool {
        matches!(self, StreamVariant::IngressTriggered | StreamVariant::RedundantRx)
    }

    fn allowed_opcodes(self) -> &'static [Opcode] {
        match self {
            StreamVariant::TimeTriggered | StreamVariant::RedundantTx => &[Opcode::Insert, Opcode::InsertConstant, Opcode::Pad],
            StreamVariant::IngressTriggered | StreamVariant::RedundantRx => &[Opcode::Read, Opcode::ForwardAll],
            StreamVariant::Event => &[Opcode::Insert, Opcode::InsertConstant, Opcode::Pad, Opcode::Forward],
            StreamVariant::Recovery => &[Opcode::Insert, Opcode::InsertConstant, Opcode::Pad],
        }
    }
}

/// Records which module (and, once that module is bound, which
/// configuration) currently owns the stream. `None` means detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub module_id: u8,
    pub config_bound: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ComputedIndices {
    pub gather_dma_index: Option<u16>,
    pub scatter_dma_index: Option<u16>,
    pub lookup_index: Option<u16>,
    pub redundand_index: Option<u16>,
    pub indiv_recov_timeout_ms: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Stream {
    pub variant: StreamVariant,
    pub operations: Vec<Operation>,
    pub schedules: Vec<ScheduleEntry>,
    pub lookup: Option<LookupEntry>,
    pub dmac: Option<[u8; 6]>,
    pub smac: Option<[u8; 6]>,
    pub vlan_id: Option<u16>,
    pub vlan_prio: Option<u8>,

    pub reference: Option<StreamId>,
    pub reference_parent: Option<StreamId>,
    pub reference_redundant: Option<StreamId>,

    pub indices: ComputedIndices,
    pub owner: Option<Ownership>,
    next_schedule_tag: u32,
}

const NUM_AUTOGEN_OPS: usize = 3;

impl Stream {
    fn header_operations(dmac: [u8; 6], smac: [u8; 6], vlan_id: u16, vlan_prio: u8) -> Vec<Operation> {
        let tag = ((vlan_prio as u16) << 13) | (vlan_id & 0x0fff);
        vec![
            Operation::generated_header(Opcode::InsertConstant, 6, dmac.to_vec()),
            Operation::generated_header(Opcode::InsertConstant, 6, smac.to_vec()),
            Operation::generated_header(Opcode::InsertConstant, 4, tag.to_be_bytes().to_vec()),
        ]
    }

    pub(crate) fn new_time_triggered(dmac: [u8; 6], smac: [u8; 6], vlan_id: u16, vlan_prio: u8) -> AcmResult<Self> {
        if !(3..=4095).contains(&vlan_id) || vlan_prio > 7 {
            return Err(AcmError::InvalidArgument);
        }
        Ok(Stream {
            variant: StreamVariant::TimeTriggered,
            operations: Self::header_operations(dmac, smac, vlan_id, vlan_prio),
            schedules: Vec::new(),
            lookup: None,
            dmac: Some(dmac),
            smac: Some(smac),
            vlan_id: Some(vlan_id),
            vlan_prio: Some(vlan_prio),
            reference: None,
            reference_parent: None,
            reference_redundant: None,
            indices: ComputedIndices::default(),
            owner: None,
            next_schedule_tag: 0,
        })
    }

    pub(crate) fn new_ingress_triggered(lookup: LookupEntry) -> Self {
        Stream {
            variant: StreamVariant::IngressTriggered,
            operations: Vec::new(),
            schedules: Vec::new(),
            lookup: Some(lookup),
            dmac: None,
            smac: None,
            vlan_id: None,
            vlan_prio: None,
            reference: None,
            reference_parent: None,
            reference_redundant: None,
            indices: ComputedIndices::default(),
            owner: None,
            next_schedule_tag: 0,
        }
    }

    pub(crate) fn new_event() -> Self {
        Stream {
            variant: StreamVariant::Event,
            operations: Vec::new(),
            schedules: Vec::new(),
            lookup: None,
            dmac: None,
            smac: None,
            vlan_id: None,
            vlan_prio: None,
            reference: None,
            reference_parent: None,
            reference_redundant: None,
            indices: ComputedIndices::default(),
            owner: None,
            next_schedule_tag: 0,
        }
    }

    pub(crate) fn new_recovery() -> Self {
        Stream { variant: StreamVariant::Recovery, ..Self::new_event() }
    }

    pub fn is_egress(&self) -> bool {
        self.variant.is_egress()
    }

    pub fn is_ingress(&self) -> bool {
        self.variant.is_ingress()
    }

    /// Appends an operation, enforcing the per-variant opcode admissibility
    /// bitset and the insert-operation-per-stream cap. Caller is expected to
    /// roll back (pop) on a validation failure further up the chain.
    pub fn add_operation(&mut self, op: Operation) -> AcmResult<()> {
        if !self.variant.allowed_opcodes().contains(&op.opcode) {
            return Err(AcmError::InvalidArgument);
        }
        if op.opcode == Opcode::Insert {
            let insert_count = self.operations.iter().filter(|o| o.opcode == Opcode::Insert).count();
            if insert_count >= ACM_MAX_INSERT_OPERATIONS {
                return Err(AcmError::TooManyInsertOps);
            }
        }
        self.operations.push(op);
        Ok(())
    }

    pub fn pop_operation(&mut self) {
        self.operations.pop();
    }

    /// Removes only user-added operations; the auto-generated header
    /// operations (if any) are preserved in place.
    pub fn clean_operations(&mut self) {
        self.operations.retain(|op| op.generated);
    }

    pub fn add_event_schedule(&mut self, period_ns: u64, send_time_ns: u64) -> AcmResult<ScheduleEntry> {
        let entry = ScheduleEntry::new_event(self.next_schedule_tag, period_ns, send_time_ns)?;
        self.next_schedule_tag += 1;
        self.schedules.push(entry);
        Ok(entry)
    }

    pub fn add_window_schedule(&mut self, period_ns: u64, time_start_ns: u64, time_end_ns: u64) -> AcmResult<ScheduleEntry> {
        let entry = ScheduleEntry::new_window(self.next_schedule_tag, period_ns, time_start_ns, time_end_ns)?;
        self.next_schedule_tag += 1;
        self.schedules.push(entry);
        Ok(entry)
    }

    pub fn pop_schedule(&mut self) {
        self.schedules.pop();
    }

    pub fn clean_schedule(&mut self) {
        self.schedules.clear();
    }

    /// Replaces the placeholder SMAC seeded at creation with the module's
    /// port MAC, as spec §3 describes for the stream-to-module bind.
    pub(crate) fn update_smac(&mut self, port_mac: [u8; 6]) {
        // Layout fixed at creation: [0]=DMAC, [1]=SMAC placeholder, [2]=VLAN tag.
        if self.operations.len() >= NUM_AUTOGEN_OPS {
            self.operations[1].data = port_mac.to_vec();
        }
        self.smac = Some(port_mac);
    }

    pub fn insert_op_count(&self) -> usize {
        self.operations.iter().filter(|o| o.opcode == Opcode::Insert).count()
    }
}

/// Valid `(parent variant, child variant)` pairings for `set_reference`,
/// per spec §4.1. Redundant-pair linking (`TimeTriggered -> TimeTriggered`)
/// is handled separately since it relabels both sides.
pub fn reference_pairing_allowed(parent: StreamVariant, child: StreamVariant) -> bool {
    matches!(
        (parent, child),
        (StreamVariant::IngressTriggered, StreamVariant::Event) | (StreamVariant::Event, StreamVariant::Recovery)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_triggered_stream_is_preseeded_with_three_header_operations() {
        let s = Stream::new_time_triggered([1; 6], [0; 6], 100, 3).unwrap();
        assert_eq!(s.operations.len(), 3);
        assert!(s.operations.iter().all(|o| o.generated));
    }

    #[test]
    fn clean_operations_preserves_only_generated_ops() {
        let mut s = Stream::new_time_triggered([1; 6], [0; 6], 100, 3).unwrap();
        s.add_operation(Operation::pad(10, 0).unwrap()).unwrap();
        assert_eq!(s.operations.len(), 4);
        s.clean_operations();
        assert_eq!(s.operations.len(), 3);
    }

    #[test]
    fn insert_operation_cap_is_enforced() {
        let mut s = Stream::new_time_triggered([1; 6], [0; 6], 100, 3).unwrap();
        for _ in 0..ACM_MAX_INSERT_OPERATIONS {
            s.add_operation(Operation::insert(10, "acm_x").unwrap()).unwrap();
        }
        assert_eq!(s.add_operation(Operation::insert(10, "acm_x").unwrap()), Err(AcmError::TooManyInsertOps));
    }

    #[test]
    fn opcode_not_admissible_for_variant_is_rejected() {
        let mut s = Stream::new_time_triggered([1; 6], [0; 6], 100, 3).unwrap();
        assert_eq!(s.add_operation(Operation::forward(0, 10).unwrap()), Err(AcmError::InvalidArgument));
    }

    #[test]
    fn ingress_to_event_pairing_is_allowed_but_not_reversed() {
        assert!(reference_pairing_allowed(StreamVariant::IngressTriggered, StreamVariant::Event));
        assert!(!reference_pairing_allowed(StreamVariant::Event, StreamVariant::IngressTriggered));
    }
}
