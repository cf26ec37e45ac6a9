//! Telephony BCD and label helpers shared by the decoders

/// Decode packed BCD digits, low nibble first
///
/// Nibbles above 9 (including the 0xF filler) are skipped.
pub fn decode_bcd(data: &[u8]) -> String {
    let mut digits = String::with_capacity(data.len() * 2);
    for byte in data {
        for nibble in [byte & 0x0F, byte >> 4] {
            if nibble <= 9 {
                digits.push(char::from(b'0' + nibble));
            }
        }
    }
    digits
}

/// Decode a DNS-style label sequence (`\x03ims\x03mnc...`) into dotted form
pub fn decode_labels(data: &[u8]) -> String {
    let mut labels: Vec<String> = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let len = usize::from(data[offset]);
        if len == 0 || offset + 1 + len > data.len() {
            break;
        }
        labels.push(String::from_utf8_lossy(&data[offset + 1..offset + 1 + len]).into_owned());
        offset += 1 + len;
    }

    labels.join(".")
}

/// MCC/MNC from a 3-octet PLMN identity, e.g. `"310-410"`
///
/// A filler MNC digit (0xF) gives a two-digit MNC.
pub fn decode_plmn(data: &[u8]) -> Option<String> {
    if data.len() < 3 {
        return None;
    }
    let digit = |n: u8| (n <= 9).then(|| char::from(b'0' + n));

    let mcc: String = [data[0] & 0x0F, data[0] >> 4, data[1] & 0x0F]
        .into_iter()
        .map(digit)
        .collect::<Option<String>>()?;
    let mnc: String = [data[2] & 0x0F, data[2] >> 4, data[1] >> 4]
        .into_iter()
        .filter_map(digit)
        .collect();

    if mnc.len() < 2 {
        return None;
    }
    Some(format!("{}-{}", mcc, mnc))
}
