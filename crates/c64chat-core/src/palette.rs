use serde::{Deserialize, Serialize};

/// The sixteen colours of the VIC-II, in hardware code order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum C64Color {
    Black,
    White,
    Red,
    Cyan,
    Purple,
    Green,
    Blue,
    Yellow,
    Orange,
    Brown,
    LightRed,
    DarkGrey,
    Grey,
    LightGreen,
    LightBlue,
    LightGrey,
}

const COLORS: [(&str, C64Color); 16] = [
    ("black", C64Color::Black),
    ("white", C64Color::White),
    ("red", C64Color::Red),
    ("cyan", C64Color::Cyan),
    ("purple", C64Color::Purple),
    ("green", C64Color::Green),
    ("blue", C64Color::Blue),
    ("yellow", C64Color::Yellow),
    ("orange", C64Color::Orange),
    ("brown", C64Color::Brown),
    ("lightred", C64Color::LightRed),
    ("darkgrey", C64Color::DarkGrey),
    ("grey", C64Color::Grey),
    ("lightgreen", C64Color::LightGreen),
    ("lightblue", C64Color::LightBlue),
    ("lightgrey", C64Color::LightGrey),
];

impl C64Color {
    /// Hardware colour code, 0-15.
    pub fn code(self) -> u8 {
        COLORS
            .iter()
            .position(|(_, c)| *c == self)
            .unwrap_or_default() as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        COLORS.get(code as usize).map(|(_, c)| *c)
    }

    /// Exact, case-sensitive lookup in the colour table.
    pub fn from_name(name: &str) -> Option<Self> {
        COLORS.iter().find(|(n, _)| *n == name).map(|(_, c)| *c)
    }

    pub fn name(self) -> &'static str {
        COLORS[self.code() as usize].0
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        COLORS.iter().map(|(n, _)| *n)
    }

    /// Approximate RGB value (Pepto palette).
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            C64Color::Black => (0x00, 0x00, 0x00),
            C64Color::White => (0xff, 0xff, 0xff),
            C64Color::Red => (0x68, 0x37, 0x2b),
            C64Color::Cyan => (0x70, 0xa4, 0xb2),
            C64Color::Purple => (0x6f, 0x3d, 0x86),
            C64Color::Green => (0x58, 0x8d, 0x43),
            C64Color::Blue => (0x35, 0x28, 0x79),
            C64Color::Yellow => (0xb8, 0xc7, 0x6f),
            C64Color::Orange => (0x6f, 0x4f, 0x25),
            C64Color::Brown => (0x43, 0x39, 0x00),
            C64Color::LightRed => (0x9a, 0x67, 0x59),
            C64Color::DarkGrey => (0x44, 0x44, 0x44),
            C64Color::Grey => (0x6c, 0x6c, 0x6c),
            C64Color::LightGreen => (0x9a, 0xd2, 0x84),
            C64Color::LightBlue => (0x6c, 0x5e, 0xb5),
            C64Color::LightGrey => (0x95, 0x95, 0x95),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_hardware_order() {
        assert_eq!(C64Color::Black.code(), 0);
        assert_eq!(C64Color::Red.code(), 2);
        assert_eq!(C64Color::LightGrey.code(), 15);
        assert_eq!(C64Color::from_code(14), Some(C64Color::LightBlue));
        assert_eq!(C64Color::from_code(16), None);
    }

    #[test]
    fn test_name_lookup_is_exact() {
        assert_eq!(C64Color::from_name("red"), Some(C64Color::Red));
        assert_eq!(C64Color::from_name("Red"), None);
        assert_eq!(C64Color::from_name("mauve"), None);
        assert_eq!(C64Color::LightGreen.name(), "lightgreen");
    }
}
