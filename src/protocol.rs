// src/protocol.rs
//
// Six ASCII bytes per command: command byte, two track digits, sub-command
// byte, group digit, terminator. The terminator is CR (or LF from a
// terminal), or 'r'/'s' on a play command to switch repeat on/off.

use thiserror::Error;

use crate::command::ControlEvent;
use crate::engine::{NUM_GROUPS, NUM_TRACKS};

pub const COMMAND_LEN: usize = 6;

/// Reply byte for an accepted command.
pub const ACK: u8 = b'p';
/// Reply byte for a rejected command.
pub const NAK: u8 = b'f';

const CR: u8 = 13;
const LF: u8 = 10;
const REPEAT_ON: u8 = b'r';
const REPEAT_OFF: u8 = b's';

const CMD_OFFSET: usize = 0;
const TRACK_TENS_OFFSET: usize = 1;
const TRACK_ONES_OFFSET: usize = 2;
const SUB_CMD_OFFSET: usize = 3;
const GROUP_OFFSET: usize = 4;
const GROUP_SELECT_OFFSET: usize = 1;
const TERMINATOR_OFFSET: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Event(ControlEvent),
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("command shorter than six bytes")]
    Truncated,
    #[error("invalid terminator byte {0:#04x}")]
    BadTerminator(u8),
    #[error("unknown command byte {0:#04x}")]
    UnknownCommand(u8),
    #[error("expected 'g' sub-command")]
    MissingGroupTag,
    #[error("payload byte {0:#04x} is not a digit")]
    BadDigit(u8),
    #[error("track {0} out of range")]
    TrackOutOfRange(usize),
    #[error("group {0} out of range")]
    GroupOutOfRange(usize),
}

/// Decode one raw command. The caller answers with [`ACK`] on `Ok` and
/// [`NAK`] on `Err`.
pub fn parse(buf: &[u8]) -> Result<Command, ParseError> {
    if buf.len() < COMMAND_LEN {
        return Err(ParseError::Truncated);
    }
    let terminator = buf[TERMINATOR_OFFSET];
    if !matches!(terminator, CR | LF | REPEAT_ON | REPEAT_OFF) {
        return Err(ParseError::BadTerminator(terminator));
    }

    match buf[CMD_OFFSET] {
        b'r' | b'R' => {
            expect_group_tag(buf)?;
            Ok(Command::Event(ControlEvent::RecordTrack {
                track: track_number(buf)?,
                group: group_number(buf, GROUP_OFFSET)?,
            }))
        }
        b'o' | b'O' => Ok(Command::Event(ControlEvent::OverdubTrack {
            track: track_number(buf)?,
        })),
        b'p' | b'P' => {
            let repeat = match terminator {
                REPEAT_ON => Some(true),
                REPEAT_OFF => Some(false),
                _ => None,
            };
            Ok(Command::Event(ControlEvent::PlayTrack {
                track: track_number(buf)?,
                repeat,
            }))
        }
        b'm' | b'M' => Ok(Command::Event(ControlEvent::MuteTrack {
            track: track_number(buf)?,
        })),
        b'u' | b'U' => Ok(Command::Event(ControlEvent::UnmuteTrack {
            track: track_number(buf)?,
        })),
        b't' | b'T' => {
            expect_group_tag(buf)?;
            Ok(Command::Event(ControlEvent::AddTrackToGroup {
                track: track_number(buf)?,
                group: group_number(buf, GROUP_OFFSET)?,
            }))
        }
        b'd' | b'D' => {
            expect_group_tag(buf)?;
            Ok(Command::Event(ControlEvent::RemoveTrackFromGroup {
                track: track_number(buf)?,
                group: group_number(buf, GROUP_OFFSET)?,
            }))
        }
        b'g' | b'G' => Ok(Command::Event(ControlEvent::SetActiveGroup {
            group: group_number(buf, GROUP_SELECT_OFFSET)?,
        })),
        b's' | b'S' => Ok(Command::Event(ControlEvent::SystemReset)),
        b'q' | b'Q' => Ok(Command::Quit),
        other => Err(ParseError::UnknownCommand(other)),
    }
}

fn digit(byte: u8) -> Result<usize, ParseError> {
    if byte.is_ascii_digit() {
        Ok((byte - b'0') as usize)
    } else {
        Err(ParseError::BadDigit(byte))
    }
}

fn track_number(buf: &[u8]) -> Result<usize, ParseError> {
    let track = digit(buf[TRACK_TENS_OFFSET])? * 10 + digit(buf[TRACK_ONES_OFFSET])?;
    if track >= NUM_TRACKS {
        return Err(ParseError::TrackOutOfRange(track));
    }
    Ok(track)
}

fn group_number(buf: &[u8], offset: usize) -> Result<usize, ParseError> {
    let group = digit(buf[offset])?;
    if group >= NUM_GROUPS {
        return Err(ParseError::GroupOutOfRange(group));
    }
    Ok(group)
}

fn expect_group_tag(buf: &[u8]) -> Result<(), ParseError> {
    match buf[SUB_CMD_OFFSET] {
        b'g' | b'G' => Ok(()),
        _ => Err(ParseError::MissingGroupTag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(buf: &[u8]) -> ControlEvent {
        match parse(buf).unwrap() {
            Command::Event(event) => event,
            Command::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn record_with_group() {
        assert_eq!(
            event(b"r07g1\r"),
            ControlEvent::RecordTrack { track: 7, group: 1 }
        );
        assert_eq!(
            event(b"R15G3\r"),
            ControlEvent::RecordTrack { track: 15, group: 3 }
        );
    }

    #[test]
    fn record_requires_group_tag() {
        assert_eq!(parse(b"r07x1\r"), Err(ParseError::MissingGroupTag));
    }

    #[test]
    fn overdub_mute_unmute() {
        assert_eq!(event(b"o0300\r"), ControlEvent::OverdubTrack { track: 3 });
        assert_eq!(event(b"m1100\r"), ControlEvent::MuteTrack { track: 11 });
        assert_eq!(event(b"U0200\r"), ControlEvent::UnmuteTrack { track: 2 });
    }

    #[test]
    fn play_terminator_selects_repeat() {
        assert_eq!(
            event(b"p0000\r"),
            ControlEvent::PlayTrack { track: 0, repeat: None }
        );
        assert_eq!(
            event(b"p0400r"),
            ControlEvent::PlayTrack { track: 4, repeat: Some(true) }
        );
        assert_eq!(
            event(b"P0400s"),
            ControlEvent::PlayTrack { track: 4, repeat: Some(false) }
        );
    }

    #[test]
    fn group_membership_commands() {
        assert_eq!(
            event(b"t09g2\r"),
            ControlEvent::AddTrackToGroup { track: 9, group: 2 }
        );
        assert_eq!(
            event(b"d09g2\r"),
            ControlEvent::RemoveTrackFromGroup { track: 9, group: 2 }
        );
    }

    #[test]
    fn group_select_and_reset() {
        assert_eq!(event(b"g3000\r"), ControlEvent::SetActiveGroup { group: 3 });
        assert_eq!(event(b"s0000\r"), ControlEvent::SystemReset);
    }

    #[test]
    fn quit_is_not_an_engine_event() {
        assert_eq!(parse(b"q0000\r"), Ok(Command::Quit));
        assert_eq!(parse(b"Q0000\r"), Ok(Command::Quit));
    }

    #[test]
    fn newline_terminator_is_accepted() {
        assert_eq!(
            event(b"r00g1\n"),
            ControlEvent::RecordTrack { track: 0, group: 1 }
        );
    }

    #[test]
    fn bounds_are_enforced() {
        assert_eq!(parse(b"r99g1\r"), Err(ParseError::TrackOutOfRange(99)));
        assert_eq!(parse(b"r00g7\r"), Err(ParseError::GroupOutOfRange(7)));
        assert_eq!(parse(b"g9000\r"), Err(ParseError::GroupOutOfRange(9)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(parse(b"x0000\r"), Err(ParseError::UnknownCommand(b'x')));
        assert_eq!(parse(b"r0ag1\r"), Err(ParseError::BadDigit(b'a')));
        assert_eq!(parse(b"p0000x"), Err(ParseError::BadTerminator(b'x')));
        assert_eq!(parse(b"p00"), Err(ParseError::Truncated));
    }
}
