//! H.264 bitstream helpers
//!
//! Matroska stores AVC in AVCC form (length-prefixed NAL units, parameter
//! sets in CodecPrivate). OpenH264 wants Annex B (start-code delimited).

/// Annex B start code (4-byte version)
const ANNEX_B_START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Parsed `avcC` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcConfig {
    /// Bytes in each NAL length prefix (1, 2 or 4)
    pub nal_length_size: usize,
    /// SPS then PPS, each behind a start code
    pub parameter_sets: Vec<u8>,
}

impl AvcConfig {
    /// Parse an `avcC` record.
    ///
    /// ```text
    /// [0] version = 1   [1..4] profile/compat/level
    /// [4] 0xFC | (nal_length_size - 1)
    /// [5] 0xE0 | num_sps, then (u16 len, sps)*
    /// num_pps, then (u16 len, pps)*
    /// ```
    pub fn parse(record: &[u8]) -> Option<Self> {
        if record.len() < 7 || record[0] != 1 {
            return None;
        }

        let nal_length_size = ((record[4] & 0x03) + 1) as usize;
        if nal_length_size == 3 {
            return None;
        }

        let mut parameter_sets = Vec::with_capacity(record.len() + 16);
        let mut offset = 5;
        let num_sps = (record[offset] & 0x1F) as usize;
        offset += 1;
        offset = copy_sets(record, offset, num_sps, &mut parameter_sets)?;

        // Some muxers omit the PPS count entirely
        if offset < record.len() {
            let num_pps = record[offset] as usize;
            offset += 1;
            copy_sets(record, offset, num_pps, &mut parameter_sets)?;
        }

        Some(Self {
            nal_length_size,
            parameter_sets,
        })
    }
}

fn copy_sets(record: &[u8], mut offset: usize, count: usize, out: &mut Vec<u8>) -> Option<usize> {
    for _ in 0..count {
        let len_bytes = record.get(offset..offset + 2)?;
        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        offset += 2;
        let nal = record.get(offset..offset + len)?;
        out.extend_from_slice(&ANNEX_B_START_CODE);
        out.extend_from_slice(nal);
        offset += len;
    }
    Some(offset)
}

/// Rewrite length-prefixed NAL units as Annex B into `out`.
///
/// Stops at the first truncated unit. Returns false when nothing was
/// written.
pub fn avcc_to_annexb(data: &[u8], nal_length_size: usize, out: &mut Vec<u8>) -> bool {
    let start_len = out.len();
    if nal_length_size == 0 || nal_length_size > 4 {
        return false;
    }

    let mut offset = 0;
    while offset + nal_length_size <= data.len() {
        let nal_len = data[offset..offset + nal_length_size]
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize);
        offset += nal_length_size;

        if nal_len == 0 || offset + nal_len > data.len() {
            break;
        }

        out.extend_from_slice(&ANNEX_B_START_CODE);
        out.extend_from_slice(&data[offset..offset + nal_len]);
        offset += nal_len;
    }

    out.len() > start_len
}

/// Check if data already has Annex B start codes
pub fn is_annexb(data: &[u8]) -> bool {
    data.starts_with(&[0, 0, 0, 1]) || data.starts_with(&[0, 0, 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avcc_to_annexb() {
        // Two NALs behind 4-byte lengths
        let avcc = [0, 0, 0, 2, 0x65, 0xAA, 0, 0, 0, 1, 0x41];
        let mut out = Vec::new();
        assert!(avcc_to_annexb(&avcc, 4, &mut out));
        assert_eq!(out, vec![0, 0, 0, 1, 0x65, 0xAA, 0, 0, 0, 1, 0x41]);
    }

    #[test]
    fn test_truncated_unit_is_dropped() {
        let avcc = [0, 3, 0x65, 0xAA];
        let mut out = Vec::new();
        assert!(!avcc_to_annexb(&avcc, 2, &mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn test_parse_avcc_record() {
        let record = [
            1, 0x42, 0x00, 0x1E, 0xFF, // version, profile, compat, level, 4-byte lengths
            0xE1, 0, 3, 0x67, 0x42, 0x00, // one SPS
            1, 0, 2, 0x68, 0xCE, // one PPS
        ];
        let config = AvcConfig::parse(&record).unwrap();
        assert_eq!(config.nal_length_size, 4);
        assert_eq!(
            config.parameter_sets,
            vec![0, 0, 0, 1, 0x67, 0x42, 0x00, 0, 0, 0, 1, 0x68, 0xCE]
        );
        assert!(is_annexb(&config.parameter_sets));
    }

    #[test]
    fn test_reject_bad_records() {
        assert!(AvcConfig::parse(&[]).is_none());
        assert!(AvcConfig::parse(&[0, 0x42, 0, 0x1E, 0xFF, 0xE1, 0]).is_none());
        // SPS length runs past the end
        assert!(AvcConfig::parse(&[1, 0x42, 0, 0x1E, 0xFF, 0xE1, 0, 9, 0x67]).is_none());
    }

    #[test]
    fn test_is_annexb() {
        assert!(is_annexb(&[0x00, 0x00, 0x00, 0x01, 0x67]));
        assert!(is_annexb(&[0x00, 0x00, 0x01, 0x67]));
        assert!(!is_annexb(&[0x00, 0x00, 0x00, 0x05, 0x67]));
    }
}
