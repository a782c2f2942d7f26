/// A named key's byte-producing shape. The base-key table is data (this
/// enum plus the `NAMED_KEYS` slice below), not a chain of branches, so
/// `/help` generation and future key additions stay mechanical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// A fixed byte sequence with no modifier parameterization.
    Bytes(&'static [u8]),
    /// Arrow/Home/End family: unmodified is `ESC [ <letter>`; modified is
    /// `ESC [ 1 ; <param> <letter>`.
    CsiLetter(u8),
    /// Tilde family (`/d`, page up/down, insert): unmodified is
    /// `ESC [ <n> ~`; modified is `ESC [ <n> ; <param> ~`.
    Tilde(u8),
    /// Function keys F1-F12. F1-F4 are SS3 (`ESC O <letter>`) unmodified
    /// and CSI-parameterized when modified; F5-F12 are tilde-style.
    Function(u8),
}

pub const NAMED_KEYS: &[(&str, KeyAction)] = &[
    ("/enter", KeyAction::Bytes(b"\r")),
    ("/esc", KeyAction::Bytes(b"\x1b")),
    ("/t", KeyAction::Bytes(b"\t")),
    ("/b", KeyAction::Bytes(b"\x7f")),
    ("/d", KeyAction::Tilde(3)),
    ("/up", KeyAction::CsiLetter(b'A')),
    ("/down", KeyAction::CsiLetter(b'B')),
    ("/right", KeyAction::CsiLetter(b'C')),
    ("/left", KeyAction::CsiLetter(b'D')),
    ("/home", KeyAction::CsiLetter(b'H')),
    ("/end", KeyAction::CsiLetter(b'F')),
    ("/pageup", KeyAction::Tilde(5)),
    ("/pagedown", KeyAction::Tilde(6)),
    ("/insert", KeyAction::Tilde(2)),
    ("/f1", KeyAction::Function(1)),
    ("/f2", KeyAction::Function(2)),
    ("/f3", KeyAction::Function(3)),
    ("/f4", KeyAction::Function(4)),
    ("/f5", KeyAction::Function(5)),
    ("/f6", KeyAction::Function(6)),
    ("/f7", KeyAction::Function(7)),
    ("/f8", KeyAction::Function(8)),
    ("/f9", KeyAction::Function(9)),
    ("/f10", KeyAction::Function(10)),
    ("/f11", KeyAction::Function(11)),
    ("/f12", KeyAction::Function(12)),
];

pub fn lookup(token: &str) -> Option<KeyAction> {
    NAMED_KEYS
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, action)| *action)
}

/// SS3 letters for F1-F4, in order.
const SS3_LETTERS: [u8; 4] = [b'P', b'Q', b'R', b'S'];

/// CSI tilde codes for F5-F12, in order.
const TILDE_CODES: [u8; 8] = [15, 17, 18, 19, 20, 21, 23, 24];

/// Encode a function key's unmodified byte sequence.
pub fn function_bytes(n: u8) -> Vec<u8> {
    if (1..=4).contains(&n) {
        vec![0x1b, b'O', SS3_LETTERS[(n - 1) as usize]]
    } else {
        let code = TILDE_CODES[(n - 5) as usize];
        format!("\x1b[{code}~").into_bytes()
    }
}

/// Encode a function key's modifier-parameterized byte sequence.
pub fn function_bytes_modified(n: u8, param: u8) -> Vec<u8> {
    if (1..=4).contains(&n) {
        let letter = SS3_LETTERS[(n - 1) as usize] as char;
        format!("\x1b[1;{param}{letter}").into_bytes()
    } else {
        let code = TILDE_CODES[(n - 5) as usize];
        format!("\x1b[{code};{param}~").into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_named_keys() {
        assert_eq!(lookup("/enter"), Some(KeyAction::Bytes(b"\r")));
        assert_eq!(lookup("/up"), Some(KeyAction::CsiLetter(b'A')));
        assert_eq!(lookup("/f1"), Some(KeyAction::Function(1)));
    }

    #[test]
    fn lookup_misses_unknown_tokens() {
        assert_eq!(lookup("/nope"), None);
        assert_eq!(lookup("hello"), None);
    }

    #[test]
    fn f1_is_ss3_unmodified() {
        assert_eq!(function_bytes(1), b"\x1bOP");
    }

    #[test]
    fn f5_is_tilde_unmodified() {
        assert_eq!(function_bytes(5), b"\x1b[15~");
    }

    #[test]
    fn f1_modified_uses_csi_form() {
        assert_eq!(function_bytes_modified(1, 5), b"\x1b[1;5P");
    }
}
