//! Text conversion between host strings and single-byte device character codes.

/// Longest answer written to the device.
pub const MAX_ANSWER_CHARS: usize = 240;

/// Longest reasoning text written to the device.
pub const MAX_REASONING_CHARS: usize = 200;

/// Longest error text written to the device.
pub const MAX_ERROR_CHARS: usize = 200;

/// Longest line the device lets the user compose.
pub const MAX_INPUT_CHARS: usize = 245;

/// Closest ASCII spelling for characters the device cannot show.
fn transliterate(c: char) -> Option<&'static str> {
    let ascii = match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => "a",
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => "A",
        'æ' => "ae",
        'Æ' => "AE",
        'é' | 'è' | 'ê' | 'ë' => "e",
        'É' | 'È' | 'Ê' | 'Ë' => "E",
        'í' | 'ì' | 'î' | 'ï' => "i",
        'Í' | 'Ì' | 'Î' | 'Ï' => "I",
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' => "o",
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' | 'Ø' => "O",
        'ú' | 'ù' | 'û' | 'ü' => "u",
        'Ú' | 'Ù' | 'Û' | 'Ü' => "U",
        'ý' | 'ÿ' => "y",
        'Ý' => "Y",
        'ç' => "c",
        'Ç' => "C",
        'ñ' => "n",
        'Ñ' => "N",
        'ß' => "ss",
        '—' | '–' | '‐' | '−' => "-",
        '…' => "...",
        '«' | '»' | '“' | '”' | '„' => "\"",
        '‘' | '’' | '′' | '‚' => "'",
        '€' => "EUR",
        '£' => "GBP",
        '¥' => "YEN",
        '©' => "(C)",
        '®' => "(R)",
        '™' => "(TM)",
        '°' => " deg",
        '±' => "+/-",
        '×' => "x",
        '÷' => "/",
        '¼' => "1/4",
        '½' => "1/2",
        '¾' => "3/4",
        '•' | '·' => "*",
        '→' => "->",
        '←' => "<-",
        '↑' => "^",
        '↓' => "v",
        '\u{a0}' => " ",
        _ => return None,
    };
    Some(ascii)
}

/// Reduce arbitrary text to single-line printable ASCII.
///
/// Line breaks and tabs become spaces, runs of spaces collapse to one, known
/// characters are transliterated and anything else becomes `?`.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' | '\r' | '\t' => out.push(' '),
            ' '..='~' => out.push(c),
            c if c.is_control() => {}
            c => match transliterate(c) {
                Some(ascii) => out.push_str(ascii),
                None => out.push('?'),
            },
        }
    }

    let mut collapsed = String::with_capacity(out.len());
    let mut previous_space = false;
    for c in out.chars() {
        if c == ' ' {
            if !previous_space {
                collapsed.push(c);
            }
            previous_space = true;
        } else {
            collapsed.push(c);
            previous_space = false;
        }
    }
    collapsed.trim().to_string()
}

/// Sanitize, uppercase and cap text bound for the device screen.
pub fn to_device_text(text: &str, max_chars: usize) -> String {
    let upper = sanitize(text).to_uppercase();
    upper.chars().take(max_chars).collect()
}

/// Cap text at `max_chars`, marking the cut with `...`.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Encode text as device bytes; anything outside ASCII becomes `?`.
pub fn encode_device_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

/// Decode bytes read from the device.
///
/// Printable ASCII passes through, shifted letters ($C1-$DA) fold to A-Z, and
/// everything else (including the $FF junk byte) is dropped.
pub fn decode_device_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter_map(|&b| match b {
            0x20..=0x7e => Some(b as char),
            0xc1..=0xda => Some((b - 0x80) as char),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_flattens_lines_and_spaces() {
        assert_eq!(sanitize("Hello\n\nworld   again\r\n"), "Hello world again");
    }

    #[test]
    fn test_sanitize_transliterates() {
        assert_eq!(sanitize("Café — “naïve” 5°"), "Cafe - \"naive\" 5 deg");
        assert_eq!(sanitize("snow ☃ man"), "snow ? man");
    }

    #[test]
    fn test_to_device_text_uppercases_and_caps() {
        let text = to_device_text("déjà vu", 4);
        assert_eq!(text, "DEJA");
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        let long = "x".repeat(250);
        let cut = truncate_with_ellipsis(&long, 200);
        assert_eq!(cut.len(), 200);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_decode_drops_junk() {
        assert_eq!(decode_device_bytes(&[b'H', 0xff, b'I', 0x0d, 0xc1]), "HIA");
    }

    #[test]
    fn test_encode_replaces_non_ascii() {
        assert_eq!(encode_device_bytes("ok€"), b"ok?".to_vec());
    }
}
