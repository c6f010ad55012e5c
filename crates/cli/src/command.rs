use std::str::FromStr;

use multitrack_core::Direction;
use multitrack_engine::ChannelIndex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    PlayPause,
    Volume(ChannelIndex, f32),
    Pan(ChannelIndex, f32),
    Tempo(Direction),
    Pitch(Direction),
    Seek(f64),
    DragStart,
    DragTo(f64),
    DragEnd,
    Loop,
    Rewind,
    Status,
    Retry,
    Help,
    Quit,
}

pub const HELP: &str = "\
play                 toggle play/pause
vol <ch> <0..1>      channel volume
pan <ch> <-1..1>     channel pan
tempo +|-            tempo ratio step
pitch +|-            pitch semitone step
seek <secs>          jump to a time
drag start|<secs>|end  scrub gesture
loop                 set loop-in, set loop-out, clear
rewind               back to the start
status               show player state
retry                retry stem download
quit";

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ParseError(pub String);

fn err(message: impl Into<String>) -> ParseError {
    ParseError(message.into())
}

fn channel(arg: Option<&str>) -> Result<ChannelIndex, ParseError> {
    let raw = arg.ok_or_else(|| err("missing channel"))?;
    let index: usize = raw.parse().map_err(|_| err(format!("bad channel '{raw}'")))?;
    ChannelIndex::new(index).map_err(|e| err(e.to_string()))
}

fn number<T: FromStr>(arg: Option<&str>, what: &str) -> Result<T, ParseError> {
    let raw = arg.ok_or_else(|| err(format!("missing {what}")))?;
    raw.parse().map_err(|_| err(format!("bad {what} '{raw}'")))
}

fn direction(arg: Option<&str>) -> Result<Direction, ParseError> {
    match arg {
        Some("+") | Some("up") => Ok(Direction::Up),
        Some("-") | Some("down") => Ok(Direction::Down),
        _ => Err(err("expected + or -")),
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(err("empty command"));
        };

        let command = match verb {
            "play" | "p" => Command::PlayPause,
            "vol" => Command::Volume(channel(words.next())?, number(words.next(), "volume")?),
            "pan" => Command::Pan(channel(words.next())?, number(words.next(), "pan")?),
            "tempo" => Command::Tempo(direction(words.next())?),
            "pitch" => Command::Pitch(direction(words.next())?),
            "seek" => Command::Seek(number(words.next(), "time")?),
            "drag" => match words.next() {
                Some("start") => Command::DragStart,
                Some("end") => Command::DragEnd,
                other => Command::DragTo(number(other, "time")?),
            },
            "loop" | "l" => Command::Loop,
            "rewind" => Command::Rewind,
            "status" | "s" => Command::Status,
            "retry" => Command::Retry,
            "help" | "?" => Command::Help,
            "quit" | "q" | "exit" => Command::Quit,
            other => return Err(err(format!("unknown command '{other}'"))),
        };

        if words.next().is_some() {
            return Err(err(format!("too many arguments for '{verb}'")));
        }
        Ok(command)
    }
}
