//! The compiler: lowers a validated configuration object graph to hardware
//! tables (spec §4.4). Split into the four concerns the spec itself names —
//! message-buffer allocation, FSC command generation, gather/scatter/lookup
//! index assignment, and table emission — kept as separate modules since
//! each is independently testable against its own slice of the spec.

pub mod fsc;
pub mod indices;
pub mod msgbuf_alloc;
pub mod tables;
