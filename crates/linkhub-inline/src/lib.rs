//! Translator from in-band IRC formatting control codes into a balanced
//! nested markup string.
//!
//! The supported codes are bold (`0x02`), italic (`0x1D`), underline
//! (`0x1F`), strikethrough (`0x1E`), monospace (`0x11`), a two-component
//! color sequence (`0x03`), and a full reset (`0x0F`). Toggling a mode off
//! while another mode opened after it is still active closes and reopens
//! the intervening modes so every emitted tag stays properly nested.

use std::collections::HashSet;

const BOLD: u8 = 0x02;
const ITALIC: u8 = 0x1D;
const STRIKE: u8 = 0x1E;
const UNDERLINE: u8 = 0x1F;
const MONOSPACE: u8 = 0x11;
const COLOR: u8 = 0x03;
const RESET: u8 = 0x0F;

const NAMED_COLORS: [&str; 16] = [
    "white",
    "black",
    "blue",
    "green",
    "red",
    "brown",
    "magenta",
    "orange",
    "yellow",
    "light green",
    "cyan",
    "light cyan",
    "light blue",
    "ping",
    "grey",
    "light grey",
];

const HEX_COLORS: [&str; 83] = [
    "#470000", "#472100", "#474700", "#324700", "#004700", "#00472c", "#004747", "#002747",
    "#000047", "#2e0047", "#470047", "#47002a", "#740000", "#743a00", "#747400", "#517400",
    "#007400", "#007449", "#007474", "#004074", "#000074", "#4b0074", "#740074", "#740045",
    "#b50000", "#b56300", "#b5b500", "#7db500", "#00b500", "#00b571", "#00b5b5", "#0063b5",
    "#0000b5", "#7500b5", "#b500b5", "#b5006b", "#ff0000", "#ff8c00", "#ffff00", "#b2ff00",
    "#00ff00", "#00ffa8", "#00ffff", "#008cff", "#0000ff", "#a500ff", "#ff00ff", "#ff0098",
    "#ff5959", "#ffb459", "#ffff71", "#cfff60", "#6fff6f", "#65ffc9", "#6dffff", "#59b4ff",
    "#5959ff", "#c459ff", "#ff66ff", "#ff59bc", "#ff9c9c", "#ffd39c", "#ffff9c", "#e2ff9c",
    "#9cff9c", "#9cffdb", "#9cffff", "#9cd3ff", "#9c9cff", "#dc9cff", "#ff9cff", "#ff94d3",
    "#000000", "#131313", "#282828", "#363636", "#4d4d4d", "#656565", "#818181", "#9f9f9f",
    "#bcbcbc", "#e2e2e2", "#ffffff",
];

fn mode_tag(code: u8) -> Option<&'static str> {
    match code {
        BOLD => Some("b"),
        ITALIC => Some("i"),
        STRIKE => Some("s"),
        UNDERLINE => Some("u"),
        MONOSPACE => Some("tt"),
        COLOR => Some("span"),
        _ => None,
    }
}

/// Resolve a palette index to its color name. Out-of-range indices, including
/// negative ones, fall back to `"grey"`.
fn color_name(index: i32) -> &'static str {
    if index < 0 {
        return "grey";
    }
    let index = index as usize;
    if index < NAMED_COLORS.len() {
        NAMED_COLORS[index]
    } else if index - NAMED_COLORS.len() < HEX_COLORS.len() {
        HEX_COLORS[index - NAMED_COLORS.len()]
    } else {
        "grey"
    }
}

fn color_span_open(fg: i32, bg: i32) -> String {
    let mut tag = String::from("<span");
    if fg >= 0 {
        tag.push_str(&format!(" fgcolor=\"{}\"", color_name(fg)));
    }
    if bg >= 0 {
        tag.push_str(&format!(" bgcolor=\"{}\"", color_name(bg)));
    }
    tag.push('>');
    tag
}

#[derive(Default)]
struct Translator {
    out: String,
    active: HashSet<u8>,
    stack: Vec<u8>,
    redo: Vec<u8>,
    fg: i32,
    bg: i32,
    color_state: u8,
    color_digits: u8,
    fg_reset: bool,
    bg_reset: bool,
}

impl Translator {
    fn new() -> Self {
        Translator {
            fg: -1,
            bg: -1,
            ..Default::default()
        }
    }

    fn open(&mut self, mode: u8) {
        if mode == COLOR {
            self.out.push_str(&color_span_open(self.fg, self.bg));
        } else {
            self.out
                .push_str(&format!("<{}>", mode_tag(mode).expect("known mode")));
        }
    }

    fn close(&mut self, mode: u8) {
        self.out
            .push_str(&format!("</{}>", mode_tag(mode).expect("known mode")));
    }

    fn set_mode(&mut self, mode: u8) {
        if self.active.contains(&mode) {
            return;
        }
        self.active.insert(mode);
        self.open(mode);
        self.stack.push(mode);
    }

    fn unset_mode(&mut self, mode: u8) {
        if !self.active.contains(&mode) {
            return;
        }
        self.active.remove(&mode);
        loop {
            let top = *self.stack.last().expect("active mode must be on stack");
            self.close(top);
            self.stack.pop();
            if top != mode {
                self.redo.push(top);
                continue;
            }
            while let Some(redo_mode) = self.redo.pop() {
                self.open(redo_mode);
                self.stack.push(redo_mode);
            }
            break;
        }
    }

    fn unset_all(&mut self) {
        while let Some(mode) = self.stack.pop() {
            self.close(mode);
        }
        self.active.clear();
        self.redo.clear();
    }

    fn toggle_mode(&mut self, mode: u8) {
        if self.active.contains(&mode) {
            self.unset_mode(mode);
        } else {
            self.set_mode(mode);
        }
    }

    fn set_color(&mut self) {
        self.unset_mode(COLOR);
        self.open(COLOR);
        self.active.insert(COLOR);
        self.stack.push(COLOR);
    }

    fn unset_color(&mut self) {
        self.fg = -1;
        self.bg = -1;
        self.unset_mode(COLOR);
    }

    fn feed(&mut self, ch: char) {
        if self.color_state == 1 {
            self.feed_fg_digit(ch);
            return;
        }
        if self.color_state == 2 {
            self.feed_bg_digit(ch);
            return;
        }

        match ch {
            '\u{0F}' => self.unset_all(),
            '\u{03}' => {
                self.color_state = 1;
                self.color_digits = 0;
                self.fg_reset = true;
                self.bg_reset = true;
            }
            c if (c as u32) < 0x20 => {
                let code = c as u8;
                if mode_tag(code).is_none() {
                    self.out.push(c);
                } else {
                    self.toggle_mode(code);
                }
            }
            c => self.out.push(c),
        }
    }

    fn feed_fg_digit(&mut self, ch: char) {
        if ch == ',' {
            if self.fg_reset {
                self.color_state = 0;
                self.unset_color();
                self.out.push(ch);
            } else {
                self.color_digits = 0;
                self.color_state = 2;
            }
            return;
        }

        let Some(digit) = ascii_digit(ch) else {
            self.color_digits = 0;
            self.color_state = 0;
            if self.fg_reset {
                self.unset_color();
            } else {
                self.set_color();
            }
            self.out.push(ch);
            return;
        };
        if self.color_digits >= 2 {
            self.color_digits = 0;
            self.color_state = 0;
            if self.fg_reset {
                self.unset_color();
            } else {
                self.set_color();
            }
            self.out.push(ch);
            return;
        }

        if self.fg < 0 || self.fg_reset {
            self.fg = 0;
            self.fg_reset = false;
        }
        self.fg = self.fg * 10 + digit;
        self.color_digits += 1;
    }

    fn feed_bg_digit(&mut self, ch: char) {
        let Some(digit) = ascii_digit(ch) else {
            self.color_digits = 0;
            self.color_state = 0;
            self.set_color();
            self.out.push(ch);
            return;
        };
        if self.color_digits >= 2 {
            self.color_digits = 0;
            self.color_state = 0;
            self.set_color();
            self.out.push(ch);
            return;
        }

        if self.bg < 0 || self.bg_reset {
            self.bg = 0;
            self.bg_reset = false;
        }
        self.bg = self.bg * 10 + digit;
        self.color_digits += 1;
    }
}

fn ascii_digit(ch: char) -> Option<i32> {
    ch.to_digit(10).map(|d| d as i32)
}

/// Translate `input` into balanced nested markup, closing any modes left
/// open at the end of the string.
pub fn translate(input: &str) -> String {
    let mut t = Translator::new();
    for ch in input.chars() {
        t.feed(ch);
    }
    t.unset_all();
    t.out
}

/// The `0x0F` reset byte, exposed for callers that need to recognize it
/// without depending on the rest of this crate's internals.
pub const RESET_BYTE: u8 = RESET;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(translate("hello world"), "hello world");
    }

    #[test]
    fn simple_bold_toggle() {
        assert_eq!(translate("pre\x02bold\x02post"), "pre<b>bold</b>post");
    }

    #[test]
    fn nested_close_reopen() {
        assert_eq!(
            translate("a\x02b\x1Dc\x02d\x1De"),
            "a<b>b<i>c</i></b><i>d</i>e"
        );
    }

    #[test]
    fn unterminated_modes_close_at_end() {
        assert_eq!(translate("\x02\x1Dhi"), "<b><i>hi</i></b>");
    }

    #[test]
    fn reset_closes_everything() {
        assert_eq!(
            translate("\x02\x1Dhi\x0Fafter"),
            "<b><i>hi</i></b>after"
        );
    }

    #[test]
    fn underline_and_strike_and_monospace_tags() {
        assert_eq!(translate("\x1fu\x1f"), "<u>u</u>");
        assert_eq!(translate("\x1es\x1e"), "<s>s</s>");
        assert_eq!(translate("\x11m\x11"), "<tt>m</tt>");
    }

    #[test]
    fn color_named_indices() {
        assert_eq!(translate("\x0304red\x03"), "<span fgcolor=\"red\">red</span>");
        assert_eq!(
            translate("\x034,1both\x03"),
            "<span fgcolor=\"red\" bgcolor=\"black\">both</span>"
        );
    }

    #[test]
    fn color_hex_and_out_of_range() {
        assert_eq!(
            translate("\x0316x\x03"),
            "<span fgcolor=\"#470000\">x</span>"
        );
        // Two decimal digits cap the parsed index at 99, one past the last
        // defined hex entry (16..=98): the only reachable out-of-range value.
        assert_eq!(translate("\x0399x\x03"), "<span fgcolor=\"grey\">x</span>");
    }

    #[test]
    fn lone_color_terminator_with_no_digits_is_noop() {
        // No active color, and no digits follow: the 0x03 is absorbed and
        // the following letter is flushed literally.
        assert_eq!(translate("\x03x"), "x");
    }

    #[test]
    fn color_nested_inside_bold_reopens_after_bold_closes() {
        // Bold opens, then color opens inside it, then bold toggles off:
        // color must close and reopen around the still-open text, leaving
        // bold closed first in wire order but properly nested.
        let out = translate("\x02b\x034c\x02d");
        assert_eq!(
            out,
            "<b>b<span fgcolor=\"green\">c</span></b><span fgcolor=\"green\">d</span>"
        );
    }
}
