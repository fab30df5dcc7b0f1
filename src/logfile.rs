//! 8.3 log file names: `LOG<tag><NNNN>.TXT`, one tag letter per channel.

pub const LOG_EXTENSION: &[u8] = b"TXT";

/// Format log filename: "LOGA0001.TXT" etc. Wraps around at 9999.
pub fn format_log_filename(tag: u8, num: u16) -> [u8; 12] {
    let mut name = *b"LOG?0000.TXT";
    name[3] = tag;
    // Wrap around: 0→1, 10000→1, etc.
    let n = match num % 10000 {
        0 => 1,
        v => v,
    };
    name[4] = b'0' + (n / 1000 % 10) as u8;
    name[5] = b'0' + (n / 100 % 10) as u8;
    name[6] = b'0' + (n / 10 % 10) as u8;
    name[7] = b'0' + (n % 10) as u8;
    name
}

/// Number of an existing log file for `tag`, given the directory entry's
/// base name and extension.
pub fn parse_log_number(base_name: &[u8], extension: &[u8], tag: u8) -> Option<u16> {
    match base_name {
        [b'L', b'O', b'G', t, digits @ ..] if *t == tag && extension == LOG_EXTENSION => {
            parse_4digit_ascii(digits)
        }
        _ => None,
    }
}

/// Parse exactly 4 ASCII digits into u16
fn parse_4digit_ascii(digits: &[u8]) -> Option<u16> {
    if digits.len() != 4 {
        return None;
    }
    let mut result: u16 = 0;
    for &d in digits {
        if !d.is_ascii_digit() {
            return None;
        }
        result = result * 10 + u16::from(d - b'0');
    }
    Some(result)
}
