//! Little-endian byte-level encoding helpers for shared-region wire formats.
//!
//! Regions are serialized with explicit `to_le_bytes`/`from_le_bytes` at
//! computed offsets. Append helpers grow a `Vec<u8>`; read helpers advance
//! a cursor and return `None` on truncation so callers surface a single
//! decode error instead of panicking.

/// Append a `u8`.
pub fn append_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

/// Append a `u16` in little-endian order.
pub fn append_u16_le(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append a `u32` in little-endian order.
pub fn append_u32_le(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append a `u64` in little-endian order.
pub fn append_u64_le(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append a length-prefixed byte string (`u32` length + bytes).
pub fn append_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    append_u32_le(buf, u32::try_from(bytes.len()).unwrap_or(u32::MAX));
    buf.extend_from_slice(bytes);
}

/// Append a length-prefixed UTF-8 string.
pub fn append_str(buf: &mut Vec<u8>, s: &str) {
    append_bytes(buf, s.as_bytes());
}

/// Read a `u8` at `*cursor`, advancing it.
#[must_use]
pub fn read_u8(buf: &[u8], cursor: &mut usize) -> Option<u8> {
    let v = *buf.get(*cursor)?;
    *cursor += 1;
    Some(v)
}

/// Read a little-endian `u16` at `*cursor`, advancing it.
#[must_use]
pub fn read_u16_le(buf: &[u8], cursor: &mut usize) -> Option<u16> {
    let bytes: [u8; 2] = buf.get(*cursor..*cursor + 2)?.try_into().ok()?;
    *cursor += 2;
    Some(u16::from_le_bytes(bytes))
}

/// Read a little-endian `u32` at `*cursor`, advancing it.
#[must_use]
pub fn read_u32_le(buf: &[u8], cursor: &mut usize) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(*cursor..*cursor + 4)?.try_into().ok()?;
    *cursor += 4;
    Some(u32::from_le_bytes(bytes))
}

/// Read a little-endian `u64` at `*cursor`, advancing it.
#[must_use]
pub fn read_u64_le(buf: &[u8], cursor: &mut usize) -> Option<u64> {
    let bytes: [u8; 8] = buf.get(*cursor..*cursor + 8)?.try_into().ok()?;
    *cursor += 8;
    Some(u64::from_le_bytes(bytes))
}

/// Read a length-prefixed byte string written by [`append_bytes`].
#[must_use]
pub fn read_bytes<'a>(buf: &'a [u8], cursor: &mut usize) -> Option<&'a [u8]> {
    let len = read_u32_le(buf, cursor)? as usize;
    let bytes = buf.get(*cursor..*cursor + len)?;
    *cursor += len;
    Some(bytes)
}

/// Read a length-prefixed UTF-8 string written by [`append_str`].
#[must_use]
pub fn read_str<'a>(buf: &'a [u8], cursor: &mut usize) -> Option<&'a str> {
    std::str::from_utf8(read_bytes(buf, cursor)?).ok()
}

/// Write a little-endian `u32` at a fixed offset into an existing buffer.
///
/// Callers guarantee `offset + 4 <= buf.len()`; fixed-layout headers are
/// sized up front.
pub fn write_u32_le_at(buf: &mut [u8], offset: usize, v: u32) {
    buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
}

/// Write a little-endian `u64` at a fixed offset into an existing buffer.
pub fn write_u64_le_at(buf: &mut [u8], offset: usize, v: u64) {
    buf[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
}

/// Read a little-endian `u32` at a fixed offset. `None` on truncation.
#[must_use]
pub fn read_u32_le_at(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Read a little-endian `u64` at a fixed offset. `None` on truncation.
#[must_use]
pub fn read_u64_le_at(buf: &[u8], offset: usize) -> Option<u64> {
    let bytes: [u8; 8] = buf.get(offset..offset + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}
