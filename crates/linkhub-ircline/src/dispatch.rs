use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use tracing::trace;

use crate::line::{IrcLine, nick_from_mask};

/// A single IRC channel's tracked membership. `end_of_names` is the
/// "ready for a fresh snapshot" flag: true means the next batch of 353
/// tokens replaces the list rather than appending to it.
#[derive(Debug, Clone, Default)]
pub struct Channel {
    pub members: Vec<String>,
    pub end_of_names: bool,
}

impl Channel {
    fn fresh() -> Self {
        Channel {
            members: Vec::new(),
            end_of_names: true,
        }
    }
}

/// Mutable state threaded through repeated calls to [`classify`]: membership
/// snapshots per channel and the self-hostname discovered from the server's
/// welcome NOTICE.
#[derive(Debug, Default)]
pub struct ParserState {
    pub channels: HashMap<String, Channel>,
    pub self_hostname: Option<String>,
}

impl ParserState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channels (by lowercased name) whose membership includes `nick`.
    pub fn channels_containing(&self, nick: &str) -> Vec<String> {
        self.channels
            .iter()
            .filter(|(_, c)| c.members.iter().any(|m| m.eq_ignore_ascii_case(nick)))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn remove_member(&mut self, channel: &str, nick: &str) {
        if let Some(c) = self.channels.get_mut(channel) {
            c.members.retain(|m| !m.eq_ignore_ascii_case(nick));
        }
    }

    fn rename_member(&mut self, channel: &str, old: &str, new: &str) {
        if let Some(c) = self.channels.get_mut(channel) {
            for m in c.members.iter_mut() {
                if m.eq_ignore_ascii_case(old) {
                    *m = new.to_string();
                }
            }
        }
    }
}

/// A WHOIS-cluster reply or a help numeric (704/705/706), carried as raw
/// text for display — their payload shapes vary too much per-numeric to be
/// worth individually modeling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbientLine {
    pub numeric_or_verb: String,
    pub text: String,
}

/// The result of classifying one parsed [`IrcLine`].
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// PRIVMSG/NOTICE addressed to a channel or nick.
    Privmsg {
        from: String,
        to: String,
        text: String,
    },
    /// A PING that must be answered with `PONG :<token>`.
    Ping { token: String },
    Join {
        from: String,
        channel: String,
    },
    Part {
        from: String,
        channel: String,
        reason: Option<String>,
    },
    /// `channels` lists every channel (lowercased) whose membership
    /// included the quitting nick, so the Hub can fan the quit out to
    /// each one plus any matching private conversation.
    Quit {
        from: String,
        reason: Option<String>,
        channels: Vec<String>,
    },
    NickChange {
        old: String,
        new: String,
        channels: Vec<String>,
    },
    Mode {
        from: String,
        target: String,
        modestring: String,
        params: Vec<String>,
    },
    /// 332
    Topic { channel: String, topic: String },
    /// 333
    TopicSetBy {
        channel: String,
        setter: String,
        when: i64,
    },
    /// 366 (or 315 for a WHO listing, see note below): membership snapshot
    /// complete for `channel`.
    NamesEnd {
        channel: String,
        members: Vec<String>,
    },
    WhoisLine(AmbientLine),
    HelpLine(AmbientLine),
    /// Self-hostname discovered; no event needs to reach a child, this is
    /// purely a state update the caller may log.
    HostnameDiscovered(String),
    /// Anything unhandled, routed to `last_client` wrapped as a Message
    /// whose `to` is `"*"`.
    Ambient { text: String },
    /// 354 (WHOX) and plain 315 (end of WHO, when not also ending a NAMES
    /// batch) are explicit no-ops, kept explicit so they don't fall into the
    /// ambient bucket and spam `last_client`.
    Ignored,
}

/// Classify one parsed line, updating `state`'s membership tracking as a
/// side effect.
pub fn classify(line: &IrcLine, state: &mut ParserState) -> DispatchEvent {
    match line.verb.as_str() {
        "PING" => DispatchEvent::Ping {
            token: line.param(0).to_string(),
        },
        "PRIVMSG" | "NOTICE" => classify_privmsg(line, state),
        "JOIN" => DispatchEvent::Join {
            from: line.source.clone().unwrap_or_default(),
            channel: line.param(0).to_string(),
        },
        "PART" => {
            let reason = line.params.get(1).cloned();
            DispatchEvent::Part {
                from: line.source.clone().unwrap_or_default(),
                channel: line.param(0).to_string(),
                reason,
            }
        }
        "QUIT" => {
            let nick = line.source_nick().to_string();
            let channels = state.channels_containing(&nick);
            for ch in &channels {
                state.remove_member(ch, &nick);
            }
            DispatchEvent::Quit {
                from: line.source.clone().unwrap_or_default(),
                reason: line.params.first().cloned(),
                channels,
            }
        }
        "NICK" => {
            let old = line.source_nick().to_string();
            let new = line.param(0).to_string();
            let channels = state.channels_containing(&old);
            for ch in &channels {
                state.rename_member(ch, &old, &new);
            }
            DispatchEvent::NickChange { old, new, channels }
        }
        "MODE" => DispatchEvent::Mode {
            from: line.source.clone().unwrap_or_default(),
            target: line.param(0).to_string(),
            modestring: line.param(1).to_string(),
            params: line.params.get(2..).map(<[String]>::to_vec).unwrap_or_default(),
        },
        "332" => DispatchEvent::Topic {
            channel: line.param(1).to_string(),
            topic: line.param(2).replace(" | ", "\n  "),
        },
        "333" => {
            let when = line.param(3).parse::<i64>().unwrap_or(0);
            DispatchEvent::TopicSetBy {
                channel: line.param(1).to_string(),
                setter: line.param(2).to_string(),
                when,
            }
        }
        "353" => {
            let channel = line.param(2).to_lowercase();
            let raw_members = line.param(3);
            let entry = state.channels.entry(channel).or_insert_with(Channel::fresh);
            if entry.end_of_names {
                entry.members.clear();
                entry.end_of_names = false;
            }
            for tok in raw_members.split_whitespace() {
                let stripped = tok.trim_start_matches(['@', '+', '%', '~', '&']);
                entry.members.push(stripped.to_string());
            }
            DispatchEvent::Ignored
        }
        "366" => {
            let channel = line.param(1).to_lowercase();
            let members = state
                .channels
                .get_mut(&channel)
                .map(|c| {
                    c.end_of_names = true;
                    c.members.clone()
                })
                .unwrap_or_default();
            DispatchEvent::NamesEnd { channel, members }
        }
        "315" => {
            // End-of-WHO: a pure no-op, grouped with 366 only as a
            // snapshot terminator, not a message-emitting one.
            let channel = line.param(1).to_lowercase();
            if let Some(c) = state.channels.get_mut(&channel) {
                c.end_of_names = true;
            }
            DispatchEvent::Ignored
        }
        "354" => DispatchEvent::Ignored,
        "276" | "311" | "312" | "317" | "318" | "319" | "330" | "378" | "671" => {
            DispatchEvent::WhoisLine(AmbientLine {
                numeric_or_verb: line.verb.clone(),
                text: line.params.join(" "),
            })
        }
        "704" | "705" | "706" => DispatchEvent::HelpLine(AmbientLine {
            numeric_or_verb: line.verb.clone(),
            text: line.params.join(" "),
        }),
        _ => {
            trace!(verb = %line.verb, "ambient line");
            DispatchEvent::Ambient {
                text: line.params.join(" "),
            }
        }
    }
}

const FOUND_HOSTNAME_MARKER: &str = "Found your hostname: ";

fn classify_privmsg(line: &IrcLine, state: &mut ParserState) -> DispatchEvent {
    let from = line.source.clone().unwrap_or_default();
    let to = line.param(0).to_string();
    let text = line.param(1).to_string();

    if to == "*" {
        if let Some(idx) = text.find(FOUND_HOSTNAME_MARKER) {
            let host = text[idx + FOUND_HOSTNAME_MARKER.len()..].to_string();
            state.self_hostname = Some(host.clone());
            return DispatchEvent::HostnameDiscovered(host);
        }
        return DispatchEvent::Ignored;
    }

    DispatchEvent::Privmsg { from, to, text }
}

/// Format a 333 topic-set-time reply, e.g.
/// `"Topic set by setter on 2023/11/14 22:13 UTC"`.
pub fn format_topic_set_by(setter: &str, when: i64) -> String {
    let dt = Utc
        .timestamp_opt(when, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap());
    format!("Topic set by {setter} on {}", dt.format("%Y/%m/%d %H:%M UTC"))
}

/// Format a 366 names-end summary: the literal count message for more than
/// 20 members, or the comma-joined list for 20 or fewer.
pub fn format_names_summary(members: &[String]) -> String {
    if members.len() > 20 {
        format!("People in this channel: {}", members.len())
    } else {
        format!("People in this channel: {}", members.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_str(s: &str, state: &mut ParserState) -> DispatchEvent {
        classify(&IrcLine::parse(s), state)
    }

    #[test]
    fn ping_becomes_ping_event() {
        let mut state = ParserState::new();
        assert_eq!(
            classify_str("PING :hub.example", &mut state),
            DispatchEvent::Ping {
                token: "hub.example".to_string()
            }
        );
    }

    #[test]
    fn privmsg_to_channel() {
        let mut state = ParserState::new();
        let ev = classify_str(":nick!u@h PRIVMSG #room :hello there", &mut state);
        assert_eq!(
            ev,
            DispatchEvent::Privmsg {
                from: "nick!u@h".to_string(),
                to: "#room".to_string(),
                text: "hello there".to_string(),
            }
        );
    }

    #[test]
    fn hostname_discovery_from_star_notice() {
        let mut state = ParserState::new();
        let ev = classify_str(
            ":server NOTICE * :*** Found your hostname: example.host",
            &mut state,
        );
        assert_eq!(
            ev,
            DispatchEvent::HostnameDiscovered("example.host".to_string())
        );
        assert_eq!(state.self_hostname.as_deref(), Some("example.host"));
    }

    #[test]
    fn topic_pipes_become_newlines() {
        let mut state = ParserState::new();
        let ev = classify_str(":srv 332 me #room :hello | world", &mut state);
        assert_eq!(
            ev,
            DispatchEvent::Topic {
                channel: "#room".to_string(),
                topic: "hello\n  world".to_string(),
            }
        );
    }

    #[test]
    fn topic_set_by_formats_utc_timestamp() {
        let mut state = ParserState::new();
        let ev = classify_str(":srv 333 me #room setter 1700000000", &mut state);
        assert_eq!(
            ev,
            DispatchEvent::TopicSetBy {
                channel: "#room".to_string(),
                setter: "setter".to_string(),
                when: 1700000000,
            }
        );
        assert_eq!(
            format_topic_set_by("setter", 1700000000),
            "Topic set by setter on 2023/11/14 22:13 UTC"
        );
    }

    #[test]
    fn names_batch_then_end_emits_members() {
        let mut state = ParserState::new();
        classify_str(":srv 353 me = #room :@op +voice plain", &mut state);
        let ev = classify_str(":srv 366 me #room :End of names", &mut state);
        assert_eq!(
            ev,
            DispatchEvent::NamesEnd {
                channel: "#room".to_string(),
                members: vec!["op".to_string(), "voice".to_string(), "plain".to_string()],
            }
        );
        assert_eq!(
            format_names_summary(&["op".into(), "voice".into(), "plain".into()]),
            "People in this channel: op, voice, plain"
        );
    }

    #[test]
    fn names_batch_restarts_fresh_after_366() {
        let mut state = ParserState::new();
        classify_str(":srv 353 me = #room :a b c", &mut state);
        classify_str(":srv 366 me #room :End", &mut state);
        // A fresh join re-sends NAMES; the old roster must be replaced, not
        // appended to.
        classify_str(":srv 353 me = #room :x y", &mut state);
        let ev = classify_str(":srv 366 me #room :End", &mut state);
        assert_eq!(
            ev,
            DispatchEvent::NamesEnd {
                channel: "#room".to_string(),
                members: vec!["x".to_string(), "y".to_string()],
            }
        );
    }

    #[test]
    fn names_over_twenty_members_summarized_by_count() {
        let members: Vec<String> = (0..25).map(|i| format!("user{i}")).collect();
        assert_eq!(format_names_summary(&members), "People in this channel: 25");
    }

    #[test]
    fn quit_fans_out_to_every_channel_containing_nick() {
        let mut state = ParserState::new();
        classify_str(":srv 353 me = #a :nick other", &mut state);
        classify_str(":srv 366 me #a :End", &mut state);
        classify_str(":srv 353 me = #b :nick third", &mut state);
        classify_str(":srv 366 me #b :End", &mut state);

        let ev = classify_str(":nick!u@h QUIT :bye", &mut state);
        match ev {
            DispatchEvent::Quit {
                from,
                reason,
                mut channels,
            } => {
                channels.sort();
                assert_eq!(from, "nick!u@h");
                assert_eq!(reason.as_deref(), Some("bye"));
                assert_eq!(channels, vec!["#a".to_string(), "#b".to_string()]);
            }
            other => panic!("expected Quit, got {other:?}"),
        }

        // nick should now be gone from both rosters.
        assert!(!state.channels["#a"].members.contains(&"nick".to_string()));
        assert!(!state.channels["#b"].members.contains(&"nick".to_string()));
    }

    #[test]
    fn nick_change_renames_in_all_channels() {
        let mut state = ParserState::new();
        classify_str(":srv 353 me = #a :nick other", &mut state);
        classify_str(":srv 366 me #a :End", &mut state);

        let ev = classify_str(":nick!u@h NICK newnick", &mut state);
        assert_eq!(
            ev,
            DispatchEvent::NickChange {
                old: "nick".to_string(),
                new: "newnick".to_string(),
                channels: vec!["#a".to_string()],
            }
        );
        assert!(state.channels["#a"].members.contains(&"newnick".to_string()));
    }

    #[test]
    fn unhandled_verb_is_ambient() {
        let mut state = ParserState::new();
        let ev = classify_str(":srv 999 me :whatever this is", &mut state);
        assert_eq!(
            ev,
            DispatchEvent::Ambient {
                text: "me whatever this is".to_string()
            }
        );
    }

    #[test]
    fn who_numerics_are_ignored_not_ambient() {
        let mut state = ParserState::new();
        assert_eq!(
            classify_str(":srv 354 me 1 nick user host", &mut state),
            DispatchEvent::Ignored
        );
        assert_eq!(
            classify_str(":srv 315 me #room :End of /WHO", &mut state),
            DispatchEvent::Ignored
        );
    }

    #[test]
    fn whois_cluster_numerics_carry_raw_text() {
        let mut state = ParserState::new();
        let ev = classify_str(":srv 311 me nick user host * :Real Name", &mut state);
        match ev {
            DispatchEvent::WhoisLine(line) => assert_eq!(line.numeric_or_verb, "311"),
            other => panic!("expected WhoisLine, got {other:?}"),
        }
    }
}
