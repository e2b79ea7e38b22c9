//! Ingress lookup/filter entries.

use crate::error::{AcmError, AcmResult};

pub const LOOKUP_HEADER_SIZE: usize = 16;
pub const ACM_MAX_FILTER_SIZE: usize = 112;

/// Header pattern+mask plus an optional payload filter. Bound to exactly
/// one ingress-triggered stream at creation.
#[derive(Debug, Clone)]
pub struct LookupEntry {
    pub header_pattern: [u8; LOOKUP_HEADER_SIZE],
    pub header_mask: [u8; LOOKUP_HEADER_SIZE],
    pub filter: Option<(Vec<u8>, Vec<u8>)>,
}

impl LookupEntry {
    pub fn new(
        header_pattern: [u8; LOOKUP_HEADER_SIZE],
        header_mask: [u8; LOOKUP_HEADER_SIZE],
        filter_pattern: Option<&[u8]>,
        filter_mask: Option<&[u8]>,
        filter_size: usize,
    ) -> AcmResult<Self> {
        if filter_size > ACM_MAX_FILTER_SIZE {
            return Err(AcmError::InvalidArgument);
        }
        let filter = match (filter_pattern, filter_mask, filter_size) {
            (None, None, 0) => None,
            (Some(pattern), Some(mask), size) if size > 0 && pattern.len() == size && mask.len() == size => {
                Some((pattern.to_vec(), mask.to_vec()))
            }
            _ => return Err(AcmError::InvalidArgument),
        };
        Ok(LookupEntry { header_pattern, header_mask, filter })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_pattern_and_mask_must_match_declared_size() {
        let header = [0u8; LOOKUP_HEADER_SIZE];
        assert!(LookupEntry::new(header, header, Some(&[1, 2, 3]), Some(&[1, 1]), 3).is_err());
        assert!(LookupEntry::new(header, header, Some(&[1, 2, 3]), Some(&[1, 1, 1]), 3).is_ok());
    }

    #[test]
    fn filter_is_optional() {
        let header = [0u8; LOOKUP_HEADER_SIZE];
        assert!(LookupEntry::new(header, header, None, None, 0).is_ok());
    }
}
