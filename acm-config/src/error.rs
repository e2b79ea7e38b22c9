//! Closed error taxonomy for the ACM bypass configuration library.
//!
//! Every variant keeps the stable numeric code the original C library
//! returned as a negative `int`, so a caller that used to branch on the
//! integer return value can still do so via [`AcmError::code`].

use thiserror::Error;

/// Closed set of failures the library can report. The same invariant always
/// signals the same variant; nothing here is ever wrapped in another error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AcmError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("structural invariant violated")]
    PermissionDenied,
    #[error("out of memory")]
    OutOfMemory,
    #[error("egress frame size below the 64 byte minimum")]
    EgressFrameTooSmall,
    #[error("stream has no operation")]
    OperationMissing,
    #[error("constant buffer of module exceeds 4096 bytes")]
    ConstBufferOverflow,
    #[error("too many redundant streams in module")]
    TooManyRedundantStreams,
    #[error("too many schedule events in module")]
    TooManyScheduleEvents,
    #[error("too many lookup entries in module")]
    TooManyLookupEntries,
    #[error("too many ingress (scatter) operations in module")]
    TooManyIngressOps,
    #[error("too many egress (gather) operations in module")]
    TooManyEgressOps,
    #[error("schedule period incompatible with module cycle")]
    PeriodIncompatible,
    #[error("no data could be read from the device interface")]
    SysfsNoData,
    #[error("invalid module cycle")]
    BadModuleCycle,
    #[error("invalid schedule time")]
    BadScheduleTime,
    #[error("problem creating a schedule entry")]
    ScheduleCreation,
    #[error("internal library error")]
    Internal,
    #[error("two referenced streams were added to different configurations")]
    DifferentConfig,
    #[error("stream is not part of a configuration")]
    StreamNotInConfig,
    #[error("too many message buffers in configuration")]
    TooManyMessageBuffers,
    #[error("no free hardware schedule table to apply the schedule to")]
    NoFreeScheduleTable,
    #[error("forward operation offset exceeds the truncation window")]
    ForwardOffset,
    #[error("frame payload size exceeds the maximum")]
    PayloadTooLarge,
    #[error("message buffer name not found")]
    BufferNameNotFound,
    #[error("configuration item missing from the config file")]
    ConfigItemMissing,
    #[error("configuration value exceeds available resources")]
    ConfigValueOverflow,
    #[error("redundant pair added to the same module")]
    RedundantSameModule,
    #[error("too many insert operations in stream")]
    TooManyInsertOps,
    /// Device I/O failed; the wrapped value is the negated `errno` the
    /// backend reported, preserved unchanged per spec §7.
    #[error("device I/O error (errno {0})")]
    DeviceIo(i32),
}

impl AcmError {
    /// The stable numeric code the original library used, preserved so a
    /// future FFI shim can reproduce the historical negative-`int` ABI
    /// without this crate knowing anything about FFI.
    pub fn code(self) -> i32 {
        match self {
            AcmError::PermissionDenied => -1,
            AcmError::OutOfMemory => -12,
            AcmError::InvalidArgument => -22,
            AcmError::EgressFrameTooSmall => -140,
            AcmError::OperationMissing => -141,
            AcmError::ConstBufferOverflow => -142,
            AcmError::TooManyRedundantStreams => -143,
            AcmError::TooManyScheduleEvents => -144,
            AcmError::TooManyLookupEntries => -145,
            AcmError::TooManyIngressOps => -146,
            AcmError::TooManyEgressOps => -147,
            AcmError::PeriodIncompatible => -148,
            AcmError::SysfsNoData => -149,
            AcmError::BadModuleCycle => -150,
            AcmError::BadScheduleTime => -151,
            AcmError::ScheduleCreation => -152,
            AcmError::Internal => -153,
            AcmError::DifferentConfig => -154,
            AcmError::StreamNotInConfig => -155,
            AcmError::TooManyMessageBuffers => -156,
            AcmError::NoFreeScheduleTable => -157,
            AcmError::ForwardOffset => -158,
            AcmError::PayloadTooLarge => -159,
            AcmError::BufferNameNotFound => -160,
            AcmError::ConfigItemMissing => -161,
            AcmError::ConfigValueOverflow => -162,
            AcmError::RedundantSameModule => -163,
            AcmError::TooManyInsertOps => -164,
            AcmError::DeviceIo(errno) => -errno,
        }
    }
}

pub type AcmResult<T> = Result<T, AcmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_the_original_negative_errno_convention() {
        assert_eq!(AcmError::EgressFrameTooSmall.code(), -140);
        assert_eq!(AcmError::TooManyInsertOps.code(), -164);
        assert_eq!(AcmError::InvalidArgument.code(), -22);
    }
}
