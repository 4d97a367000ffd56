/// Decode an RFC 2047 header value (e.g. `=?UTF-8?B?...?=`) as found in an ENVELOPE.
pub fn decode_header_value(raw: &[u8]) -> String {
    // mailparse expects a full "Key: value" header line
    let mut line = b"X: ".to_vec();
    line.extend_from_slice(raw);
    line.extend_from_slice(b"\r\n");

    match mailparse::parse_header(&line) {
        Ok((h, _idx)) => h.get_value(),
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}

/// Join the mailbox and host parts of an envelope address.
pub fn address_from_parts(mailbox: Option<&[u8]>, host: Option<&[u8]>) -> Option<String> {
    let mailbox = String::from_utf8_lossy(mailbox?).trim().to_string();
    if mailbox.is_empty() {
        return None;
    }
    match host.map(|h| String::from_utf8_lossy(h).trim().to_string()) {
        Some(host) if !host.is_empty() => Some(format!("{mailbox}@{host}")),
        _ => Some(mailbox),
    }
}
