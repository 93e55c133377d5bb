use std::collections::BTreeMap;

/// One parsed IRC line: optional `@tag=value;...` prefix, optional `:source`,
/// a verb (a command word or three-digit numeric), and trailing parameters.
///
/// A parameter whose own text begins with `:` consumes the remainder of the
/// line as a single trailing parameter with that leading colon stripped —
/// this is how PRIVMSG/NOTICE/topic text carries embedded spaces.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IrcLine {
    pub tags: BTreeMap<String, String>,
    pub source: Option<String>,
    pub verb: String,
    pub params: Vec<String>,
}

impl IrcLine {
    /// Parse one logical line. Callers strip the trailing `\r`/`\n` before
    /// calling this — the wire-level framing that delivers a "logical
    /// line" is `linkhub-link`'s job in text mode, or a bufio-style
    /// line reader over the raw upstream TCP stream.
    pub fn parse(line: &str) -> Self {
        let mut rest = line;
        let mut tags = BTreeMap::new();

        if let Some(tag_body) = rest.strip_prefix('@') {
            let (tag_str, remainder) = split_first_field(tag_body);
            for pair in tag_str.split(';') {
                if pair.is_empty() {
                    continue;
                }
                match pair.split_once('=') {
                    Some((k, v)) => {
                        tags.insert(k.to_string(), v.to_string());
                    }
                    None => {
                        tags.insert(pair.to_string(), String::new());
                    }
                }
            }
            rest = remainder;
        }

        let source = if let Some(src_body) = rest.strip_prefix(':') {
            let (src, remainder) = split_first_field(src_body);
            rest = remainder;
            Some(src.to_string())
        } else {
            None
        };

        let (verb, remainder) = split_first_field(rest);
        let verb = verb.to_string();
        rest = remainder;

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            let (field, remainder) = split_first_field(rest);
            params.push(field.to_string());
            rest = remainder;
        }

        IrcLine {
            tags,
            source,
            verb,
            params,
        }
    }

    /// The `@time=` IRCv3 server-time tag, if present and parseable as
    /// RFC3339, as a unix-seconds timestamp.
    pub fn tag_time(&self) -> Option<i64> {
        let raw = self.tags.get("time")?;
        chrono::DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.timestamp())
    }

    /// Bare nickname from `source`, stripping the `!user@host` suffix if
    /// present. Returns an empty string if there is no source.
    pub fn source_nick(&self) -> &str {
        match &self.source {
            Some(s) => nick_from_mask(s),
            None => "",
        }
    }

    pub fn param(&self, idx: usize) -> &str {
        self.params.get(idx).map(String::as_str).unwrap_or("")
    }
}

/// Strip the `!user@host` portion of a mask, if present.
pub fn nick_from_mask(mask: &str) -> &str {
    match mask.find('!') {
        Some(idx) => &mask[..idx],
        None => mask,
    }
}

/// Split off the first whitespace-delimited field and return it along with
/// whatever follows (with any single delimiting space consumed, leading
/// spaces in the remainder left for the caller to trim).
fn split_first_field(s: &str) -> (&str, &str) {
    match s.find(' ') {
        Some(idx) => (&s[..idx], &s[idx + 1..]),
        None => (s, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_privmsg() {
        let line = IrcLine::parse(":nick!u@h PRIVMSG #room :hello world");
        assert_eq!(line.source.as_deref(), Some("nick!u@h"));
        assert_eq!(line.verb, "PRIVMSG");
        assert_eq!(line.params, vec!["#room", "hello world"]);
    }

    #[test]
    fn parses_tags_and_time() {
        let line = IrcLine::parse("@time=2023-11-14T22:13:00.000Z;msgid=abc :srv NOTICE * :hi");
        assert_eq!(line.tags.get("msgid").map(String::as_str), Some("abc"));
        let expected = chrono::DateTime::parse_from_rfc3339("2023-11-14T22:13:00.000Z")
            .unwrap()
            .timestamp();
        assert_eq!(line.tag_time(), Some(expected));
    }

    #[test]
    fn parses_numeric_verb_with_many_params() {
        let line = IrcLine::parse(":srv 353 me = #room :@op +voice plain");
        assert_eq!(line.verb, "353");
        assert_eq!(line.params, vec!["me", "=", "#room", "@op +voice plain"]);
    }

    #[test]
    fn parses_ping_with_no_source() {
        let line = IrcLine::parse("PING :hub.example");
        assert!(line.source.is_none());
        assert_eq!(line.verb, "PING");
        assert_eq!(line.params, vec!["hub.example"]);
    }

    #[test]
    fn source_nick_strips_mask() {
        let line = IrcLine::parse(":nick!u@h JOIN #room");
        assert_eq!(line.source_nick(), "nick");
    }

    #[test]
    fn source_nick_passes_through_bare_source() {
        let line = IrcLine::parse(":irc.server 001 me :Welcome");
        assert_eq!(line.source_nick(), "irc.server");
    }
}
