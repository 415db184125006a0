pub mod blpop;
pub mod echo;
pub mod executable;
pub mod get;
pub mod incr;
pub mod info;
pub mod llen;
pub mod lpop;
pub mod lpush;
pub mod lrange;
pub mod ping;
pub mod rpush;
pub mod set;
pub mod type_;
pub mod unknown;
pub mod xadd;
pub mod xrange;
pub mod xread;

use bytes::Bytes;
use std::time::Duration;
use std::{str, vec};
use thiserror::Error as ThisError;
use tokio::time::Instant;

use crate::commands::executable::Executable;
use crate::frame::Frame;
use crate::store::{Store, StoreError};
use crate::Error;

use blpop::Blpop;
use echo::Echo;
use get::Get;
use incr::Incr;
use info::Info;
use llen::Llen;
use lpop::Lpop;
use lpush::Lpush;
use lrange::Lrange;
use ping::Ping;
use rpush::Rpush;
use set::Set;
use type_::Type;
use unknown::Unknown;
use xadd::Xadd;
use xrange::Xrange;
use xread::Xread;

#[derive(Debug, PartialEq)]
pub enum Command {
    Get(Get),
    Incr(Incr),
    Set(Set),
    Type(Type),

    Blpop(Blpop),
    Llen(Llen),
    Lpop(Lpop),
    Lpush(Lpush),
    Lrange(Lrange),
    Rpush(Rpush),

    Xadd(Xadd),
    Xrange(Xrange),
    Xread(Xread),

    Echo(Echo),
    Info(Info),
    Ping(Ping),
    Unknown(Unknown),
}

impl Executable for Command {
    async fn exec(self, store: &Store) -> Result<Frame, Error> {
        match self {
            Command::Blpop(cmd) => cmd.exec(store).await,
            Command::Echo(cmd) => cmd.exec(store).await,
            Command::Get(cmd) => cmd.exec(store).await,
            Command::Incr(cmd) => cmd.exec(store).await,
            Command::Info(cmd) => cmd.exec(store).await,
            Command::Llen(cmd) => cmd.exec(store).await,
            Command::Lpop(cmd) => cmd.exec(store).await,
            Command::Lpush(cmd) => cmd.exec(store).await,
            Command::Lrange(cmd) => cmd.exec(store).await,
            Command::Ping(cmd) => cmd.exec(store).await,
            Command::Rpush(cmd) => cmd.exec(store).await,
            Command::Set(cmd) => cmd.exec(store).await,
            Command::Type(cmd) => cmd.exec(store).await,
            Command::Unknown(cmd) => cmd.exec(store).await,
            Command::Xadd(cmd) => cmd.exec(store).await,
            Command::Xrange(cmd) => cmd.exec(store).await,
            Command::Xread(cmd) => cmd.exec(store).await,
        }
    }
}

impl TryFrom<Frame> for Command {
    type Error = CommandParserError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        // Clients send commands to the Redis server as RESP arrays.
        let frames = match frame {
            Frame::Array(array) => array,
            frame => {
                return Err(CommandParserError::InvalidFrame {
                    expected: "array".to_string(),
                    actual: frame,
                })
            }
        };

        let mut parts = frames.into_iter();
        let name = match parts.next() {
            Some(frame) => string_from_frame(frame)?,
            None => {
                return Err(CommandParserError::InvalidFrame {
                    expected: "command name".to_string(),
                    actual: Frame::Array(vec![]),
                })
            }
        };

        let command_name = name.to_lowercase();
        let parser = &mut CommandParser {
            command: command_name.clone(),
            parts,
        };

        let command = match &command_name[..] {
            "blpop" => Blpop::try_from(&mut *parser).map(Command::Blpop),
            "echo" => Echo::try_from(&mut *parser).map(Command::Echo),
            "get" => Get::try_from(&mut *parser).map(Command::Get),
            "incr" => Incr::try_from(&mut *parser).map(Command::Incr),
            "info" => Info::try_from(&mut *parser).map(Command::Info),
            "llen" => Llen::try_from(&mut *parser).map(Command::Llen),
            "lpop" => Lpop::try_from(&mut *parser).map(Command::Lpop),
            "lpush" => Lpush::try_from(&mut *parser).map(Command::Lpush),
            "lrange" => Lrange::try_from(&mut *parser).map(Command::Lrange),
            "ping" => Ping::try_from(&mut *parser).map(Command::Ping),
            "rpush" => Rpush::try_from(&mut *parser).map(Command::Rpush),
            "set" => Set::try_from(&mut *parser).map(Command::Set),
            "type" => Type::try_from(&mut *parser).map(Command::Type),
            "xadd" => Xadd::try_from(&mut *parser).map(Command::Xadd),
            "xrange" => Xrange::try_from(&mut *parser).map(Command::Xrange),
            "xread" => Xread::try_from(&mut *parser).map(Command::Xread),
            _ => {
                let args = parser.remaining_lossy();
                return Ok(Command::Unknown(Unknown { name, args }));
            }
        }?;

        parser.finish()?;

        Ok(command)
    }
}

/// Turns a store error into an error reply. A store that is no longer running is fatal to the
/// connection instead.
fn store_error(err: StoreError) -> Result<Frame, Error> {
    match err {
        StoreError::Closed => Err(err.into()),
        err => Ok(Frame::Error(err.to_string())),
    }
}

/// Rejects timeouts whose deadline cannot be represented.
fn checked_timeout(timeout: Duration) -> Result<Duration, CommandParserError> {
    Instant::now()
        .checked_add(timeout)
        .map(|_| timeout)
        .ok_or(CommandParserError::TimeoutOutOfRange)
}

pub struct CommandParser {
    /// Lowercased command name, used in error replies.
    command: String,
    parts: vec::IntoIter<Frame>,
}

impl CommandParser {
    /// Number of arguments not consumed yet.
    fn remaining(&self) -> usize {
        self.parts.len()
    }

    fn next_frame(&mut self) -> Result<Frame, CommandParserError> {
        self.parts
            .next()
            .ok_or_else(|| CommandParserError::WrongArity {
                command: self.command.clone(),
            })
    }

    fn next_string(&mut self) -> Result<String, CommandParserError> {
        let frame = self.next_frame()?;
        string_from_frame(frame)
    }

    fn next_integer(&mut self) -> Result<i64, CommandParserError> {
        let frame = self.next_frame()?;

        match frame {
            Frame::Integer(i) => Ok(i),
            frame => string_from_frame(frame)?
                .parse::<i64>()
                .map_err(|_| CommandParserError::NotAnInteger),
        }
    }

    fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        let frame = self.next_frame()?;

        match frame {
            // Both `Simple` and `Bulk` representation may be strings. Strings are parsed to UTF-8.
            // While errors are stored as strings, they are considered separate types.
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    /// Consumes the remaining arguments for error messages that echo them back.
    fn remaining_lossy(&mut self) -> Vec<String> {
        self.parts
            .by_ref()
            .map(|frame| match frame {
                Frame::Simple(s) => s,
                Frame::Bulk(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                frame => frame.to_string(),
            })
            .collect()
    }

    /// Fails if arguments are left over once a command has been parsed.
    fn finish(&self) -> Result<(), CommandParserError> {
        if self.remaining() > 0 {
            return Err(CommandParserError::WrongArity {
                command: self.command.clone(),
            });
        }

        Ok(())
    }
}

fn string_from_frame(frame: Frame) -> Result<String, CommandParserError> {
    match frame {
        Frame::Simple(s) => Ok(s),
        Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
            .map(|s| s.to_string())
            .map_err(CommandParserError::InvalidUTF8String),
        frame => Err(CommandParserError::InvalidFrame {
            expected: "simple or bulk string".to_string(),
            actual: frame,
        }),
    }
}

/// Errors found while turning a request into a [`Command`]. They are replied to the client, and
/// the connection stays open.
#[derive(Debug, ThisError, PartialEq)]
pub enum CommandParserError {
    #[error("ERR Protocol error: expected {expected}, got {actual}")]
    InvalidFrame { expected: String, actual: Frame },
    #[error("ERR wrong number of arguments for '{command}' command")]
    WrongArity { command: String },
    #[error("ERR syntax error")]
    SyntaxError,
    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,
    #[error("ERR value is out of range, must be positive")]
    NotPositive,
    #[error("ERR invalid expire time in '{command}' command")]
    InvalidExpireTime { command: String },
    #[error("ERR timeout is not a float or out of range")]
    InvalidTimeout,
    #[error("ERR timeout is not an integer or out of range")]
    InvalidBlockTimeout,
    #[error("ERR timeout is negative")]
    NegativeTimeout,
    #[error("ERR timeout is out of range")]
    TimeoutOutOfRange,
    #[error("ERR Unbalanced '{command}' list of streams: for each stream key an ID or '$' must be specified.")]
    UnbalancedStreams { command: String },
    #[error("ERR invalid UTF-8 string")]
    InvalidUTF8String(#[from] str::Utf8Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_get_command_with_simple_string() {
        let get_frame = Frame::Array(vec![
            Frame::Simple(String::from("GET")),
            Frame::Simple(String::from("foo")),
        ]);

        let get_command = Command::try_from(get_frame).unwrap();

        assert_eq!(
            get_command,
            Command::Get(Get {
                key: String::from("foo")
            })
        );
    }

    #[test]
    fn parse_get_command_with_bulk_string() {
        let get_frame = Frame::Array(vec![
            Frame::Simple(String::from("GET")),
            Frame::Bulk(Bytes::from("foo-from-bytes")),
        ]);

        let get_command = Command::try_from(get_frame).unwrap();

        assert_eq!(
            get_command,
            Command::Get(Get {
                key: String::from("foo-from-bytes")
            })
        );
    }

    #[test]
    fn command_names_are_case_insensitive() {
        for name in ["echo", "ECHO", "eChO"] {
            let frame = Frame::Array(vec![
                Frame::Bulk(Bytes::from(name)),
                Frame::Bulk(Bytes::from("hey")),
            ]);

            assert_eq!(
                Command::try_from(frame).unwrap(),
                Command::Echo(echo::Echo {
                    message: Bytes::from("hey")
                })
            );
        }
    }

    #[test]
    fn wrong_number_of_arguments() {
        let frame = Frame::Array(vec![Frame::Bulk(Bytes::from("GET"))]);
        let err = Command::try_from(frame).unwrap_err();
        assert_eq!(err.to_string(), "ERR wrong number of arguments for 'get' command");

        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("GET")),
            Frame::Bulk(Bytes::from("a")),
            Frame::Bulk(Bytes::from("b")),
        ]);
        let err = Command::try_from(frame).unwrap_err();
        assert_eq!(err.to_string(), "ERR wrong number of arguments for 'get' command");
    }

    #[test]
    fn unknown_command() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("FOO")),
            Frame::Bulk(Bytes::from("bar")),
        ]);

        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(
            cmd,
            Command::Unknown(Unknown {
                name: "FOO".to_string(),
                args: vec!["bar".to_string()],
            })
        );
    }

    #[test]
    fn non_array_request() {
        let frame = Frame::Simple("PING".to_string());

        assert!(matches!(
            Command::try_from(frame),
            Err(CommandParserError::InvalidFrame { .. })
        ));
        assert!(Command::try_from(Frame::Array(vec![])).is_err());
    }
}
