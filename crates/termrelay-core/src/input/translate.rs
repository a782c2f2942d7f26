//! Translates a chat message into PTY keystrokes.
//!
//! Tokens are whitespace-separated and processed left to right. Modifier
//! tokens (`/c`, `/a`, `/s`) accumulate onto the next non-modifier token;
//! combining them is order-independent since they only ever contribute bits
//! to a mask that is applied once, at the end. Unrecognized combinations
//! fall back to dropping the modifier and emitting the base token's bytes.

use super::tokens::{self, KeyAction};

const MOD_CTRL: u8 = 0b001;
const MOD_ALT: u8 = 0b010;
const MOD_SHIFT: u8 = 0b100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateOutcome {
    /// `/quit` was seen: the caller should begin an orderly shutdown
    /// without forwarding anything to the child.
    Quit,
    /// `/help` was seen: the caller should reply with a canned usage
    /// message instead of forwarding anything to the child.
    Help,
    /// Bytes to write to the PTY master. Each inner `Vec` is one atomic
    /// write; a trailing `\r` injection (when enabled) is its own entry so
    /// it lands as a separate write from the translated token bytes.
    Keystrokes { writes: Vec<Vec<u8>> },
}

/// Translate a chat message into PTY writes. `inject_enter` controls
/// whether a trailing `\r` is appended as a separate write after the
/// translated bytes.
pub fn translate(message: &str, inject_enter: bool) -> TranslateOutcome {
    let trimmed = message.trim();
    if trimmed == "/quit" {
        return TranslateOutcome::Quit;
    }
    if trimmed == "/help" {
        return TranslateOutcome::Help;
    }

    let mut out = Vec::new();
    let mut pending_mods: u8 = 0;

    for token in message.split_whitespace() {
        match token {
            "/c" => pending_mods |= MOD_CTRL,
            "/a" => pending_mods |= MOD_ALT,
            "/s" => pending_mods |= MOD_SHIFT,
            _ => {
                out.extend(apply(token, pending_mods));
                pending_mods = 0;
            }
        }
    }

    let mut writes = vec![out];
    if inject_enter {
        writes.push(b"\r".to_vec());
    }
    TranslateOutcome::Keystrokes { writes }
}

/// xterm modifier parameter: 1 + shift(1) + alt(2) + ctrl(4).
fn modifier_param(mods: u8) -> u8 {
    1 + (mods & MOD_SHIFT != 0) as u8
        + 2 * (mods & MOD_ALT != 0) as u8
        + 4 * (mods & MOD_CTRL != 0) as u8
}

fn apply(token: &str, mods: u8) -> Vec<u8> {
    if let Some(action) = tokens::lookup(token) {
        return apply_to_named_key(action, mods);
    }
    apply_to_literal(token, mods)
}

fn apply_to_named_key(action: KeyAction, mods: u8) -> Vec<u8> {
    if mods == 0 {
        return match action {
            KeyAction::Bytes(b) => b.to_vec(),
            KeyAction::CsiLetter(letter) => format!("\x1b[{}", letter as char).into_bytes(),
            KeyAction::Tilde(n) => format!("\x1b[{n}~").into_bytes(),
            KeyAction::Function(n) => tokens::function_bytes(n),
        };
    }

    let param = modifier_param(mods);
    match action {
        // Fixed keys (Enter, Esc, Tab, Backspace, Delete) have no
        // parameterized form; best-effort drop of the modifier. Alt still
        // applies as an ESC prefix, matching "Alt + X is ESC followed by
        // X's bytes".
        KeyAction::Bytes(b) => {
            if mods == MOD_ALT {
                let mut bytes = vec![0x1b];
                bytes.extend_from_slice(b);
                bytes
            } else {
                b.to_vec()
            }
        }
        KeyAction::CsiLetter(letter) => format!("\x1b[1;{param}{}", letter as char).into_bytes(),
        KeyAction::Tilde(n) => format!("\x1b[{n};{param}~").into_bytes(),
        KeyAction::Function(n) => tokens::function_bytes_modified(n, param),
    }
}

fn apply_to_literal(token: &str, mods: u8) -> Vec<u8> {
    if mods == 0 {
        return token.as_bytes().to_vec();
    }

    // Control and Shift only have defined meaning for a single ASCII
    // letter. Anything else is an unknown combination: drop the modifier,
    // emit the literal, but Alt (which applies generically) still prefixes
    // ESC.
    let mut chars = token.chars();
    let (Some(ch), None) = (chars.next(), chars.next()) else {
        return alt_prefix_if_set(token.as_bytes().to_vec(), mods);
    };

    if !ch.is_ascii_alphabetic() {
        return alt_prefix_if_set(token.as_bytes().to_vec(), mods);
    }

    let base: u8 = if mods & MOD_CTRL != 0 {
        (ch.to_ascii_uppercase() as u8) & 0x1f
    } else if mods & MOD_SHIFT != 0 {
        ch.to_ascii_uppercase() as u8
    } else {
        ch as u8
    };

    alt_prefix_if_set(vec![base], mods)
}

fn alt_prefix_if_set(bytes: Vec<u8>, mods: u8) -> Vec<u8> {
    if mods & MOD_ALT != 0 {
        let mut out = vec![0x1b];
        out.extend(bytes);
        out
    } else {
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writes(outcome: TranslateOutcome) -> Vec<Vec<u8>> {
        match outcome {
            TranslateOutcome::Keystrokes { writes } => writes,
            other => panic!("expected Keystrokes, got {other:?}"),
        }
    }

    #[test]
    fn quit_bypasses_tokenization() {
        assert_eq!(translate("/quit", false), TranslateOutcome::Quit);
    }

    #[test]
    fn help_bypasses_tokenization() {
        assert_eq!(translate("/help", true), TranslateOutcome::Help);
    }

    #[test]
    fn literal_text_passes_through() {
        let w = writes(translate("hello", false));
        assert_eq!(w, vec![b"hello".to_vec()]);
    }

    #[test]
    fn enter_injection_is_separate_write() {
        let w = writes(translate("hello", true));
        assert_eq!(w, vec![b"hello".to_vec(), b"\r".to_vec()]);
    }

    #[test]
    fn named_key_maps_to_bytes() {
        let w = writes(translate("/up", false));
        assert_eq!(w[0], b"\x1b[A");
    }

    #[test]
    fn control_letter_maps_to_control_code() {
        let w = writes(translate("/c a", false));
        assert_eq!(w[0], vec![0x01]);
    }

    #[test]
    fn modifier_stacking_is_order_independent() {
        let a = writes(translate("/c /s a", false));
        let b = writes(translate("/s /c a", false));
        assert_eq!(a, b);
    }

    #[test]
    fn alt_prefixes_esc_to_base_bytes() {
        let w = writes(translate("/a x", false));
        assert_eq!(w[0], vec![0x1b, b'x']);
    }

    #[test]
    fn shift_uppercases_letter() {
        let w = writes(translate("/s a", false));
        assert_eq!(w[0], vec![b'A']);
    }

    #[test]
    fn ctrl_on_modified_arrow_emits_csi_param() {
        let w = writes(translate("/c /up", false));
        assert_eq!(w[0], b"\x1b[1;5A");
    }

    #[test]
    fn unknown_combination_drops_modifier_keeps_base() {
        // Shift on a multi-char literal: no defined meaning, modifier
        // dropped, text passes through unchanged.
        let w = writes(translate("/s hello", false));
        assert_eq!(w[0], b"hello");
    }

    #[test]
    fn multiple_tokens_concatenate_into_one_atomic_write() {
        let w = writes(translate("hi /enter there", false));
        assert_eq!(w.len(), 1);
        assert_eq!(w[0], b"hi\rthere");
    }
}
