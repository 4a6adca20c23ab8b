//! Byte shuffle filter
//!
//! For `n` items of `item_size` bytes, the shuffled buffer holds the first
//! byte of every item, then the second byte of every item, and so on. Bytes
//! past the last whole item are copied verbatim at the end. Grouping bytes of
//! equal significance lets the general-purpose compressors find the runs that
//! neighbouring samples share.

/// Shuffle `data` with the given item size. Item sizes of 0 or 1 return an
/// unmodified copy.
pub fn shuffle(data: &[u8], item_size: usize) -> Vec<u8> {
    if item_size <= 1 {
        return data.to_vec();
    }
    let count = data.len() / item_size;
    if count == 0 {
        return data.to_vec();
    }
    let whole = count * item_size;
    let mut out = vec![0u8; data.len()];
    for byte in 0..item_size {
        let lane = &mut out[byte * count..(byte + 1) * count];
        for (dst, item) in lane.iter_mut().zip(data[..whole].chunks_exact(item_size)) {
            *dst = item[byte];
        }
    }
    out[whole..].copy_from_slice(&data[whole..]);
    out
}

/// Exact inverse of [`shuffle`].
pub fn unshuffle(data: &[u8], item_size: usize) -> Vec<u8> {
    if item_size <= 1 {
        return data.to_vec();
    }
    let count = data.len() / item_size;
    if count == 0 {
        return data.to_vec();
    }
    let whole = count * item_size;
    let mut out = vec![0u8; data.len()];
    for byte in 0..item_size {
        let lane = &data[byte * count..(byte + 1) * count];
        for (src, item) in lane.iter().zip(out[..whole].chunks_exact_mut(item_size)) {
            item[byte] = *src;
        }
    }
    out[whole..].copy_from_slice(&data[whole..]);
    out
}
