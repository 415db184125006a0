use bytes::Bytes;
use std::time::Duration;

use crate::commands::executable::Executable;
use crate::commands::xrange::entries_frame;
use crate::commands::{checked_timeout, store_error, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::stream::{Block, ReadFrom, StreamId};
use crate::store::Store;
use crate::Error;

/// Read entries with an id greater than the given one from one or more streams.
///
/// The special id `$` reads only entries added after the command was received. With
/// `BLOCK milliseconds`, the command waits for entries to arrive when none are available; a
/// block of `0` waits forever. Replies with a `nil` array when nothing was read.
///
/// Ref: <https://redis.io/docs/latest/commands/xread/>
#[derive(Debug, PartialEq)]
pub struct Xread {
    pub count: Option<usize>,
    pub block: Option<Block>,
    pub streams: Vec<(String, ReadFrom)>,
}

impl Executable for Xread {
    async fn exec(self, store: &Store) -> Result<Frame, Error> {
        let res = match store
            .streams()
            .xread(self.streams, self.count, self.block)
            .await
        {
            Ok(res) => res,
            Err(err) => return store_error(err),
        };

        if res.is_empty() {
            return Ok(Frame::NullArray);
        }

        let streams = res
            .into_iter()
            .map(|(key, entries)| {
                Frame::Array(vec![Frame::Bulk(Bytes::from(key)), entries_frame(entries)])
            })
            .collect();

        Ok(Frame::Array(streams))
    }
}

impl TryFrom<&mut CommandParser> for Xread {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let mut count = None;
        let mut block = None;

        loop {
            let option = parser.next_string()?.to_lowercase();

            match &option[..] {
                "count" => {
                    // COUNT 0 reads without a limit.
                    count = Some(parser.next_integer()?.max(0) as usize);
                }
                "block" => {
                    let ms = parser
                        .next_string()?
                        .parse::<i64>()
                        .map_err(|_| CommandParserError::InvalidBlockTimeout)?;

                    block = match ms {
                        ms if ms < 0 => return Err(CommandParserError::NegativeTimeout),
                        0 => Some(Block::Forever),
                        ms => Some(Block::For(checked_timeout(Duration::from_millis(
                            ms as u64,
                        ))?)),
                    };
                }
                "streams" => break,
                _ => return Err(CommandParserError::SyntaxError),
            }
        }

        let remaining = parser.remaining();
        if remaining == 0 || remaining % 2 != 0 {
            return Err(CommandParserError::UnbalancedStreams {
                command: "xread".to_string(),
            });
        }

        let mut args = Vec::with_capacity(remaining);
        while parser.remaining() > 0 {
            args.push(parser.next_string()?);
        }

        let ids = args.split_off(remaining / 2);
        let streams = args
            .into_iter()
            .zip(ids)
            .map(|(key, id)| Ok((key, parse_read_from(&id)?)))
            .collect::<Result<Vec<_>, CommandParserError>>()?;

        Ok(Self {
            count,
            block,
            streams,
        })
    }
}

fn parse_read_from(id: &str) -> Result<ReadFrom, CommandParserError> {
    match id {
        "$" => Ok(ReadFrom::Latest),
        id => Ok(ReadFrom::After(StreamId::parse_bound(id, 0)?)),
    }
}
