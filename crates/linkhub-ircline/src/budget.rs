//! Outbound length budgeting.
//!
//! The wire-side `PRIVMSG <target> :<text>` line must fit in the IRC
//! server's 510-byte line limit once it has re-prefixed the line with our
//! own full hostmask for retransmission to other clients. We don't know our
//! *real* mask (we never receive our own `JOIN`), so we guess it from the
//! configured nick/user and whatever hostname the server's welcome NOTICE
//! revealed, falling back to a conservative padding estimate.

const MAX_IRC_LINE: usize = 510;

/// `nick!~user@host`, or `nick!~user@` + a 50-byte placeholder if the host
/// hasn't been discovered yet.
pub fn guess_mask(nick: &str, user: &str, hostname: Option<&str>) -> String {
    match hostname {
        Some(host) if !host.is_empty() => format!("{nick}!~{user}@{host}"),
        _ => format!("{nick}!~{user}@{}", "x".repeat(50)),
    }
}

pub fn mask_len(nick: &str, user: &str, hostname: Option<&str>) -> usize {
    guess_mask(nick, user, hostname).len()
}

/// Maximum length, in bytes, of a single wire-encoded `PRIVMSG ... :...`
/// command line, leaving room for the server's `:<mask> ` retransmission
/// prefix.
pub fn command_budget(mask_len: usize) -> usize {
    MAX_IRC_LINE.saturating_sub(mask_len).saturating_sub(2)
}

/// Split `text` into a sequence of chunks such that `PRIVMSG <target> :<chunk>`
/// never exceeds `budget` bytes, and the concatenation of the chunks equals
/// `text`. Splits on byte boundaries; callers passing non-ASCII text that
/// would split a multi-byte UTF-8 sequence get the nearest earlier
/// char boundary instead, trading a slightly shorter chunk for validity.
pub fn split_for_target(target: &str, text: &str, budget: usize) -> Vec<String> {
    let prefix_len = format!("PRIVMSG {target} :").len();
    let max_text_len = budget.saturating_sub(prefix_len);
    if max_text_len == 0 || text.len() <= max_text_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let mut cut = max_text_len.min(remaining.len());
        while cut > 0 && !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // A single char exceeds the budget (shouldn't happen for any
            // real alphabet at this budget size); emit it whole rather
            // than loop forever.
            cut = remaining.chars().next().map(char::len_utf8).unwrap_or(1);
        }
        chunks.push(remaining[..cut].to_string());
        remaining = &remaining[cut..];
    }
    chunks
}

/// Format the outbound wire lines for a `PRIVMSG <target> :<text>`, split to
/// respect `budget`.
pub fn format_privmsg_lines(target: &str, text: &str, budget: usize) -> Vec<String> {
    split_for_target(target, text, budget)
        .into_iter()
        .map(|chunk| format!("PRIVMSG {target} :{chunk}"))
        .collect()
}

/// `PONG` reply for an inbound `PING :<token>`.
pub fn pong_reply(token: &str) -> String {
    format!("PONG :{token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_with_known_host() {
        assert_eq!(guess_mask("nick", "user", Some("host")), "nick!~user@host");
        assert_eq!(mask_len("nick", "user", Some("host")), 15);
    }

    #[test]
    fn mask_with_unknown_host_pads_fifty() {
        let mask = guess_mask("nick", "user", None);
        assert_eq!(mask, format!("nick!~user@{}", "x".repeat(50)));
    }

    #[test]
    fn long_message_splits_at_the_byte_budget() {
        // self-mask length 15 -> budget 510 - 15 - 2 = 493
        let budget = command_budget(15);
        assert_eq!(budget, 493);

        let text: String = "x".repeat(600);
        let lines = format_privmsg_lines("#ch", &text, budget);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 493);

        let rejoined: String = lines
            .iter()
            .map(|l| l.strip_prefix("PRIVMSG #ch :").unwrap())
            .collect();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn no_split_under_budget() {
        let budget = command_budget(15);
        let lines = format_privmsg_lines("#ch", "short", budget);
        assert_eq!(lines, vec!["PRIVMSG #ch :short".to_string()]);
    }

    #[test]
    fn pong_echoes_token() {
        assert_eq!(pong_reply("hub.example"), "PONG :hub.example");
    }
}
