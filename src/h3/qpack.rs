//! A static-table QPACK codec (RFC 9204).
//!
//! The CONNECT exchange never needs a dynamic table: this codec encodes
//! against the 99-entry static table only and rejects header blocks that
//! reference a dynamic table or carry Huffman-coded strings. That matches a
//! peer that was offered neither `QPACK_MAX_TABLE_CAPACITY` nor
//! `QPACK_BLOCKED_STREAMS` in SETTINGS.

use thiserror::Error;

/// One name-value pair of a header block. Pseudo-headers keep their leading
/// colon in `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl HeaderField {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn is_pseudo(&self) -> bool {
        self.name.first() == Some(&b':')
    }
}

#[derive(Debug, Error)]
pub enum QpackError {
    #[error("truncated header block")]
    Truncated,

    #[error("static table index {0} out of range")]
    InvalidIndex(u64),

    #[error("header block references a dynamic table")]
    DynamicTable,

    #[error("huffman-coded string")]
    Huffman,
}

// Prefix integers (RFC 9204 section 4.1.1): a value either fits in the low
// `prefix` bits of the first byte, or those bits are saturated and the
// remainder follows in 7-bit little-endian groups.

fn encode_prefix_int(buf: &mut Vec<u8>, mut value: u64, prefix: u8, pattern: u8) {
    let max = (1u64 << prefix) - 1;
    if value < max {
        buf.push(pattern | value as u8);
        return;
    }
    buf.push(pattern | max as u8);
    value -= max;
    while value >= 0x80 {
        buf.push(0x80 | (value & 0x7f) as u8);
        value >>= 7;
    }
    buf.push(value as u8);
}

fn decode_prefix_int(buf: &mut &[u8], prefix: u8) -> Result<u64, QpackError> {
    let (&first, rest) = buf.split_first().ok_or(QpackError::Truncated)?;
    *buf = rest;
    let max = (1u64 << prefix) - 1;
    let mut value = u64::from(first) & max;
    if value < max {
        return Ok(value);
    }
    let mut shift = 0u32;
    loop {
        let (&byte, rest) = buf.split_first().ok_or(QpackError::Truncated)?;
        *buf = rest;
        value = value
            .checked_add(u64::from(byte & 0x7f) << shift)
            .ok_or(QpackError::Truncated)?;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 56 {
            return Err(QpackError::Truncated);
        }
    }
}

fn decode_string(buf: &mut &[u8], prefix: u8, huffman_bit: u8) -> Result<Vec<u8>, QpackError> {
    let huffman = buf.first().ok_or(QpackError::Truncated)? & huffman_bit != 0;
    let len = decode_prefix_int(buf, prefix)? as usize;
    if huffman {
        return Err(QpackError::Huffman);
    }
    if buf.len() < len {
        return Err(QpackError::Truncated);
    }
    let (string, rest) = buf.split_at(len);
    *buf = rest;
    Ok(string.to_vec())
}

fn static_entry(index: u64) -> Result<&'static (&'static [u8], &'static [u8]), QpackError> {
    STATIC_TABLE
        .get(index as usize)
        .ok_or(QpackError::InvalidIndex(index))
}

/// Encode `fields` as a QPACK header block into `buf`.
///
/// Emits the zeroed Required Insert Count / Delta Base prefix, then the most
/// compact static-table representation of each field. Strings are never
/// Huffman-coded.
pub fn encode(fields: &[HeaderField], buf: &mut Vec<u8>) {
    // Required Insert Count = 0, Delta Base = 0: no dynamic references.
    buf.push(0x00);
    buf.push(0x00);

    for field in fields {
        let full = STATIC_TABLE
            .iter()
            .position(|(name, value)| *name == field.name && *value == field.value);
        if let Some(index) = full {
            // Indexed field line, static table: 1 1 <6-bit index>.
            encode_prefix_int(buf, index as u64, 6, 0xc0);
            continue;
        }

        let name = STATIC_TABLE.iter().position(|(name, _)| *name == field.name);
        if let Some(index) = name {
            // Literal with static name reference: 0 1 N=0 1 <4-bit index>.
            encode_prefix_int(buf, index as u64, 4, 0x50);
        } else {
            // Literal with literal name: 0 0 1 N=0 H=0 <3-bit length>.
            encode_prefix_int(buf, field.name.len() as u64, 3, 0x20);
            buf.extend_from_slice(&field.name);
        }
        // Value: H=0 <7-bit length>.
        encode_prefix_int(buf, field.value.len() as u64, 7, 0x00);
        buf.extend_from_slice(&field.value);
    }
}

/// Decode a QPACK header block into its fields.
pub fn decode(block: &[u8]) -> Result<Vec<HeaderField>, QpackError> {
    let mut buf = block;

    let required_insert_count = decode_prefix_int(&mut buf, 8)?;
    if required_insert_count != 0 {
        return Err(QpackError::DynamicTable);
    }
    decode_prefix_int(&mut buf, 7)?; // delta base; meaningless with RIC 0

    let mut fields = Vec::new();
    while let Some(&first) = buf.first() {
        if first & 0x80 != 0 {
            // Indexed field line: 1 T <6-bit index>.
            if first & 0x40 == 0 {
                return Err(QpackError::DynamicTable);
            }
            let index = decode_prefix_int(&mut buf, 6)?;
            let (name, value) = static_entry(index)?;
            fields.push(HeaderField::new(*name, *value));
        } else if first & 0x40 != 0 {
            // Literal with name reference: 0 1 N T <4-bit index>.
            if first & 0x10 == 0 {
                return Err(QpackError::DynamicTable);
            }
            let index = decode_prefix_int(&mut buf, 4)?;
            let (name, _) = static_entry(index)?;
            let value = decode_string(&mut buf, 7, 0x80)?;
            fields.push(HeaderField::new(*name, value));
        } else if first & 0x20 != 0 {
            // Literal with literal name: 0 0 1 N H <3-bit length>.
            let name = decode_string(&mut buf, 3, 0x08)?;
            let value = decode_string(&mut buf, 7, 0x80)?;
            fields.push(HeaderField { name, value });
        } else {
            // Post-base forms only make sense with a dynamic table.
            return Err(QpackError::DynamicTable);
        }
    }
    Ok(fields)
}

/// The QPACK static table (RFC 9204 appendix A).
static STATIC_TABLE: [(&[u8], &[u8]); 99] = [
    (b":authority", b""),
    (b":path", b"/"),
    (b"age", b"0"),
    (b"content-disposition", b""),
    (b"content-length", b"0"),
    (b"cookie", b""),
    (b"date", b""),
    (b"etag", b""),
    (b"if-modified-since", b""),
    (b"if-none-match", b""),
    (b"last-modified", b""),
    (b"link", b""),
    (b"location", b""),
    (b"referer", b""),
    (b"set-cookie", b""),
    (b":method", b"CONNECT"),
    (b":method", b"DELETE"),
    (b":method", b"GET"),
    (b":method", b"HEAD"),
    (b":method", b"OPTIONS"),
    (b":method", b"POST"),
    (b":method", b"PUT"),
    (b":scheme", b"http"),
    (b":scheme", b"https"),
    (b":status", b"103"),
    (b":status", b"200"),
    (b":status", b"304"),
    (b":status", b"404"),
    (b":status", b"503"),
    (b"accept", b"*/*"),
    (b"accept", b"application/dns-message"),
    (b"accept-encoding", b"gzip, deflate, br"),
    (b"accept-ranges", b"bytes"),
    (b"access-control-allow-headers", b"cache-control"),
    (b"access-control-allow-headers", b"content-type"),
    (b"access-control-allow-origin", b"*"),
    (b"cache-control", b"max-age=0"),
    (b"cache-control", b"max-age=2592000"),
    (b"cache-control", b"max-age=604800"),
    (b"cache-control", b"no-cache"),
    (b"cache-control", b"no-store"),
    (b"cache-control", b"public, max-age=31536000"),
    (b"content-encoding", b"br"),
    (b"content-encoding", b"gzip"),
    (b"content-type", b"application/dns-message"),
    (b"content-type", b"application/javascript"),
    (b"content-type", b"application/json"),
    (b"content-type", b"application/x-www-form-urlencoded"),
    (b"content-type", b"image/gif"),
    (b"content-type", b"image/jpeg"),
    (b"content-type", b"image/png"),
    (b"content-type", b"text/css"),
    (b"content-type", b"text/html; charset=utf-8"),
    (b"content-type", b"text/plain"),
    (b"content-type", b"text/plain;charset=utf-8"),
    (b"range", b"bytes=0-"),
    (b"strict-transport-security", b"max-age=31536000"),
    (b"strict-transport-security", b"max-age=31536000; includesubdomains"),
    (b"strict-transport-security", b"max-age=31536000; includesubdomains; preload"),
    (b"vary", b"accept-encoding"),
    (b"vary", b"origin"),
    (b"x-content-type-options", b"nosniff"),
    (b"x-xss-protection", b"1; mode=block"),
    (b":status", b"100"),
    (b":status", b"204"),
    (b":status", b"206"),
    (b":status", b"302"),
    (b":status", b"400"),
    (b":status", b"403"),
    (b":status", b"421"),
    (b":status", b"425"),
    (b":status", b"500"),
    (b"accept-language", b""),
    (b"access-control-allow-credentials", b"FALSE"),
    (b"access-control-allow-credentials", b"TRUE"),
    (b"access-control-allow-headers", b"*"),
    (b"access-control-allow-methods", b"get"),
    (b"access-control-allow-methods", b"get, post, options"),
    (b"access-control-allow-methods", b"options"),
    (b"access-control-expose-headers", b"content-length"),
    (b"access-control-request-headers", b"content-type"),
    (b"access-control-request-method", b"get"),
    (b"access-control-request-method", b"post"),
    (b"alt-svc", b"clear"),
    (b"authorization", b""),
    (
        b"content-security-policy",
        b"script-src 'none'; object-src 'none'; base-uri 'none'",
    ),
    (b"early-data", b"1"),
    (b"expect-ct", b""),
    (b"forwarded", b""),
    (b"if-range", b""),
    (b"origin", b""),
    (b"purpose", b"prefetch"),
    (b"server", b""),
    (b"timing-allow-origin", b"*"),
    (b"upgrade-insecure-requests", b"1"),
    (b"user-agent", b""),
    (b"x-forwarded-for", b""),
    (b"x-frame-options", b"deny"),
    (b"x-frame-options", b"sameorigin"),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(fields: Vec<HeaderField>) {
        let mut block = Vec::new();
        encode(&fields, &mut block);
        assert_eq!(decode(&block).unwrap(), fields);
    }

    #[test]
    fn prefix_int_round_trip() {
        for &(value, prefix, pattern) in &[
            (0u64, 6, 0xc0u8),
            (5, 6, 0xc0),
            (62, 6, 0xc0),
            (63, 6, 0xc0),
            (64, 6, 0xc0),
            (1000, 6, 0xc0),
            (15, 4, 0x50),
            (16, 4, 0x50),
            (255, 4, 0x50),
            (127, 7, 0x00),
            (128, 7, 0x00),
            (10000, 7, 0x00),
        ] {
            let mut buf = Vec::new();
            encode_prefix_int(&mut buf, value, prefix, pattern);
            let mut slice = &buf[..];
            assert_eq!(decode_prefix_int(&mut slice, prefix).unwrap(), value);
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn indexed_field() {
        // :method CONNECT is a full static match.
        round_trip(vec![HeaderField::new(":method", "CONNECT")]);
    }

    #[test]
    fn name_reference_field() {
        // :path is in the static table; /chat is not.
        round_trip(vec![HeaderField::new(":path", "/chat")]);
    }

    #[test]
    fn literal_field() {
        round_trip(vec![HeaderField::new(
            "sec-webtransport-http3-draft",
            "draft02",
        )]);
    }

    #[test]
    fn connect_request_block() {
        round_trip(vec![
            HeaderField::new(":method", "CONNECT"),
            HeaderField::new(":scheme", "https"),
            HeaderField::new(":authority", "example.com"),
            HeaderField::new(":path", "/chat"),
            HeaderField::new(":protocol", "webtransport"),
            HeaderField::new("origin", "https://example.com"),
        ]);
    }

    #[test]
    fn empty_value() {
        round_trip(vec![HeaderField::new(":authority", "")]);
    }

    #[test]
    fn pseudo_header_predicate() {
        assert!(HeaderField::new(":status", "200").is_pseudo());
        assert!(!HeaderField::new("origin", "https://example.com").is_pseudo());
    }

    #[test]
    fn huffman_string_rejected() {
        // Name reference to :path (index 1), value with the H bit set.
        let block = [0x00, 0x00, 0x51, 0x81, 0xff];
        assert!(matches!(decode(&block), Err(QpackError::Huffman)));
    }

    #[test]
    fn dynamic_references_rejected() {
        // Indexed field line with T=0.
        assert!(matches!(
            decode(&[0x00, 0x00, 0x80]),
            Err(QpackError::DynamicTable)
        ));
        // Non-zero Required Insert Count.
        assert!(matches!(
            decode(&[0x01, 0x00, 0xc1]),
            Err(QpackError::DynamicTable)
        ));
    }

    #[test]
    fn truncated_block_rejected() {
        let mut block = Vec::new();
        encode(
            &[HeaderField::new(":authority", "example.com")],
            &mut block,
        );
        block.truncate(block.len() - 3);
        assert!(matches!(decode(&block), Err(QpackError::Truncated)));
    }

    #[test]
    fn static_table_has_99_entries() {
        assert_eq!(STATIC_TABLE.len(), 99);
    }
}
