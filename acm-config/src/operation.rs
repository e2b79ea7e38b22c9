//! Frame-recipe operations: the elements that make up a stream's egress or
//! ingress byte recipe.

use crate::error::{AcmError, AcmResult};

pub const ACM_MAX_NAME_SIZE: usize = 55;
pub const MAX_PAYLOAD_HEADER_SIZE: usize = 1518;
pub const ACM_MIN_FRAME_SIZE: usize = 64;
pub const ACM_MAX_FRAME_SIZE: usize = 1528;
pub const MAX_TRUNC_BYTES: usize = 19;
pub const ACM_MAX_INSERT_OPERATIONS: usize = 8;
pub const ACM_MAX_CONST_BUFFER_SIZE: usize = 4096;

/// The six frame-recipe opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Insert,
    InsertConstant,
    Pad,
    Forward,
    Read,
    ForwardAll,
}

/// One element of a stream's frame recipe.
///
/// `msg_buf` and `const_buff_offset` are compiler-assigned: they start as
/// `None` and are filled in by [`crate::compiler`] during message-buffer
/// allocation and constant-buffer emission, respectively.
#[derive(Debug, Clone)]
pub struct Operation {
    pub opcode: Opcode,
    pub length: u16,
    pub offset: u16,
    pub buffer_name: Option<String>,
    pub data: Vec<u8>,
    pub generated: bool,
    pub msg_buf: Option<usize>,
    pub const_buff_offset: Option<u16>,
}

impl Operation {
    fn user(opcode: Opcode, length: u16, offset: u16, buffer_name: Option<String>, data: Vec<u8>) -> Self {
        Operation { opcode, length, offset, buffer_name, data, generated: false, msg_buf: None, const_buff_offset: None }
    }

    pub(crate) fn generated_header(opcode: Opcode, length: u16, data: Vec<u8>) -> Self {
        Operation { opcode, length, offset: 0, buffer_name: None, data, generated: true, msg_buf: None, const_buff_offset: None }
    }

    pub fn insert(length: u16, buffer_name: &str) -> AcmResult<Self> {
        validate_buffer_name(buffer_name)?;
        if !(3..=1500).contains(&length) {
            return Err(AcmError::InvalidArgument);
        }
        Ok(Self::user(Opcode::Insert, length, 0, Some(buffer_name.to_string()), Vec::new()))
    }

    pub fn insert_constant(data: &[u8]) -> AcmResult<Self> {
        if data.is_empty() || data.len() > 1500 {
            return Err(AcmError::InvalidArgument);
        }
        Ok(Self::user(Opcode::InsertConstant, data.len() as u16, 0, None, data.to_vec()))
    }

    pub fn pad(length: u16, fill_byte: u8) -> AcmResult<Self> {
        if !(1..=1500).contains(&length) {
            return Err(AcmError::InvalidArgument);
        }
        Ok(Self::user(Opcode::Pad, length, 0, None, vec![fill_byte]))
    }

    pub fn forward(offset: u16, length: u16) -> AcmResult<Self> {
        if !(2..=1508).contains(&length) || offset as usize + length as usize > ACM_MAX_FRAME_SIZE {
            return Err(AcmError::InvalidArgument);
        }
        Ok(Self::user(Opcode::Forward, length, offset, None, Vec::new()))
    }

    pub fn read(offset: u16, length: u16, buffer_name: &str) -> AcmResult<Self> {
        validate_buffer_name(buffer_name)?;
        if !(4..=1528).contains(&length) || offset as usize + length as usize > ACM_MAX_FRAME_SIZE {
            return Err(AcmError::InvalidArgument);
        }
        Ok(Self::user(Opcode::Read, length, offset, Some(buffer_name.to_string()), Vec::new()))
    }

    pub fn forward_all() -> Self {
        Self::user(Opcode::ForwardAll, 0, 0, None, Vec::new())
    }
}

pub fn validate_buffer_name(name: &str) -> AcmResult<()> {
    if name.is_empty() || name.len() > ACM_MAX_NAME_SIZE {
        return Err(AcmError::InvalidArgument);
    }
    Ok(())
}

/// Checks the buffer-name prefix convention (default `"acm_"`, configurable
/// from the delay-override file per spec §6.2).
pub fn check_buffer_prefix(name: &str, prefix: &str) -> AcmResult<()> {
    if name.starts_with(prefix) {
        Ok(())
    } else {
        Err(AcmError::InvalidArgument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_length_bounds_are_enforced() {
        assert!(Operation::insert(2, "acm_x").is_err());
        assert!(Operation::insert(1501, "acm_x").is_err());
        assert!(Operation::insert(60, "acm_x").is_ok());
    }

    #[test]
    fn forward_offset_plus_length_must_fit_in_a_frame() {
        assert!(Operation::forward(1527, 2).is_err());
        assert!(Operation::forward(1526, 2).is_ok());
    }

    #[test]
    fn buffer_name_length_is_bounded() {
        let long = "a".repeat(56);
        assert!(validate_buffer_name(&long).is_err());
        assert!(validate_buffer_name("acm_tx").is_ok());
    }
}
