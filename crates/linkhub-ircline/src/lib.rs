//! IRC line parsing and dispatch classification, plus the
//! outbound PRIVMSG length budgeting the Hub needs when writing back to the
//! upstream connection.
//!
//! Pure, synchronous, no network I/O: [`IrcLine::parse`] turns one logical
//! line into a structured form, [`dispatch::classify`] turns that into a
//! [`dispatch::DispatchEvent`] the Hub acts on, and [`budget`] computes how
//! an outbound `PRIVMSG` must be split to fit the server's line limit.

mod budget;
mod dispatch;
mod line;

pub use budget::{command_budget, format_privmsg_lines, guess_mask, mask_len, pong_reply, split_for_target};
pub use dispatch::{classify, format_names_summary, format_topic_set_by, AmbientLine, Channel, DispatchEvent, ParserState};
pub use line::{nick_from_mask, IrcLine};
