//! Classical netstring framing: `ascii_decimal_len ‖ ":" ‖ payload ‖ ","`.
//!
//! Both the channel envelopes (`msgC`, `msgE`) and the mailbox envelope
//! (`msgB`) carry exactly one leading netstring followed by a binary
//! trailer, so the parser here returns `(payload, trailer)`.

/// An error produced while parsing a netstring.
#[derive(Debug, thiserror::Error)]
pub enum NetstringError {
    #[error("missing netstring length header")]
    MissingHeader,

    #[error("netstring length overflows the buffer")]
    Truncated,

    #[error("netstring missing trailing comma")]
    MissingComma,
}

/// Encode a payload as a netstring.
pub fn netstring(payload: &[u8]) -> Vec<u8> {
    let header = format!("{}:", payload.len());
    let mut out = Vec::with_capacity(header.len() + payload.len() + 1);
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out.push(b',');
    out
}

/// Parse one leading netstring; return its payload and the remaining bytes.
pub fn split_netstring_and_trailer(
    data: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), NetstringError> {
    let colon = data
        .iter()
        .position(|b| *b == b':')
        .ok_or(NetstringError::MissingHeader)?;
    if colon == 0 || !data[..colon].iter().all(u8::is_ascii_digit) {
        return Err(NetstringError::MissingHeader);
    }
    // At most 20 digits fit a u64; anything longer is garbage, not a length.
    if colon > 20 {
        return Err(NetstringError::MissingHeader);
    }
    let len: usize = std::str::from_utf8(&data[..colon])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(NetstringError::MissingHeader)?;

    let payload_start = colon + 1;
    let payload_end = payload_start
        .checked_add(len)
        .ok_or(NetstringError::Truncated)?;
    // The comma must sit at payload_end.
    if payload_end >= data.len() {
        return Err(NetstringError::Truncated);
    }
    if data[payload_end] != b',' {
        return Err(NetstringError::MissingComma);
    }
    Ok((
        data[payload_start..payload_end].to_vec(),
        data[payload_end + 1..].to_vec(),
    ))
}
