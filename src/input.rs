//! Loading of captured MPSSE command streams from text.
//!
//! Captures are either plain hex dumps, whitespace-separated two-digit
//! tokens, or usbmon text logs from which the bulk-OUT payloads are taken.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Malformed hex token {token:?} on line {line}")]
    MalformedToken { line: usize, token: String },
    #[error("Input buffer overflow: more than {capacity} bytes")]
    Overflow { capacity: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Parse a single token which must be exactly two hex digits.
fn parse_token(token: &str, line: usize) -> Result<u8> {
    let malformed = || Error::MalformedToken { line, token: token.to_string() };
    if token.len() != 2 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(malformed());
    }
    u8::from_str_radix(token, 16).map_err(|_| malformed())
}

fn push(bytes: &mut Vec<u8>, byte: u8, capacity: usize) -> Result<()> {
    if bytes.len() == capacity {
        return Err(Error::Overflow { capacity });
    }
    bytes.push(byte);
    Ok(())
}

/// Parse whitespace-separated hex bytes, holding at most `capacity` bytes.
pub fn parse_hex(text: &str, capacity: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        for token in line.split_whitespace() {
            push(&mut bytes, parse_token(token, idx + 1)?, capacity)?;
        }
    }
    log::debug!("Parsed {} bytes of hex input", bytes.len());
    Ok(bytes)
}

/// Extract the payloads of all bulk-OUT submissions from a usbmon text log.
///
/// Each line is `bus.dev.ep type xfer length [data...]`; submissions
/// (`S`) of bulk-OUT transfers (`Bo`) carry the MPSSE commands sent to
/// the adapter. All other lines are skipped.
pub fn parse_usbmon(text: &str, capacity: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut transfers = 0;
    for (idx, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields[..] {
            [_, "S", "Bo", _, ref data @ ..] => {
                transfers += 1;
                for token in data {
                    push(&mut bytes, parse_token(token, idx + 1)?, capacity)?;
                }
            },
            _ => log::trace!("Skipping usbmon line {}", idx + 1),
        }
    }
    log::debug!("Extracted {} bytes from {} bulk-OUT transfers", bytes.len(), transfers);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("4b 07 80\n\t87  ab\n", 16).unwrap(), vec![0x4B, 0x07, 0x80, 0x87, 0xAB]);
        assert!(parse_hex("", 16).unwrap().is_empty());
        assert_eq!(parse_hex("8A", 16).unwrap(), vec![0x8A]);
    }

    #[test]
    fn test_parse_hex_malformed() {
        match parse_hex("4b 07\n80 7 87", 16) {
            Err(Error::MalformedToken { line, token }) => {
                assert_eq!(line, 2);
                assert_eq!(token, "7");
            },
            _ => panic!("expected malformed token"),
        }
        assert!(parse_hex("4b0780", 16).is_err());
        assert!(parse_hex("zz", 16).is_err());
        assert!(parse_hex("+1", 16).is_err());
    }

    #[test]
    fn test_parse_hex_overflow() {
        assert!(parse_hex("01 02 03", 3).is_ok());
        assert!(matches!(parse_hex("01 02 03 04", 3), Err(Error::Overflow { capacity: 3 })));
    }

    #[test]
    fn test_parse_usbmon() {
        let log = "\
1.005.002 S Bo 0003 4b 07 80
1.005.002 C Bo 0003 OK
1.005.001 S Bi 0200
1.005.001 C Bi 0002 OK
                    32 60
2.001.000 S Co 0000 40 00 0000 0000 0000
1.005.002 S Bo 0001 87
";
        assert_eq!(parse_usbmon(log, 16).unwrap(), vec![0x4B, 0x07, 0x80, 0x87]);
    }
}
