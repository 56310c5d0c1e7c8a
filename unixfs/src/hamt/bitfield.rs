use bytes::Bytes;

// Bitfields are stored big endian: slot 0 is the lowest bit of the last byte.

/// Builds the bitfield for a table of `fanout` slots with the given slots set.
pub fn bitfield(indices: impl IntoIterator<Item = usize>, fanout: u64) -> Bytes {
    let len = (fanout as usize).div_ceil(8);
    let mut out = vec![0u8; len];

    for index in indices {
        out[len - 1 - index / 8] |= 1 << (index % 8);
    }

    out.into()
}

/// Whether slot `index` is set. Indices outside of the bitfield are unset.
pub fn is_set(bitfield: &[u8], index: usize) -> bool {
    let byte = index / 8;
    if byte >= bitfield.len() {
        return false;
    }

    bitfield[bitfield.len() - 1 - byte] & (1 << (index % 8)) != 0
}

/// Number of set slots.
pub fn popcount(bitfield: &[u8]) -> usize {
    bitfield.iter().map(|b| b.count_ones() as usize).sum()
}
