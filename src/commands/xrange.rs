use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{store_error, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::stream::{StreamEntry, StreamId};
use crate::store::Store;
use crate::Error;

/// Returns the stream entries with ids between `start` and `end`, both inclusive.
///
/// `-` and `+` stand for the smallest and the greatest possible ids. An id without a sequence
/// number means sequence `0` as `start` and the greatest sequence as `end`.
///
/// Ref: <https://redis.io/docs/latest/commands/xrange/>
#[derive(Debug, PartialEq)]
pub struct Xrange {
    pub key: String,
    pub start: StreamId,
    pub end: StreamId,
    pub count: Option<usize>,
}

impl Executable for Xrange {
    async fn exec(self, store: &Store) -> Result<Frame, Error> {
        match store
            .streams()
            .xrange(&self.key, self.start, self.end, self.count)
            .await
        {
            Ok(entries) => Ok(entries_frame(entries)),
            Err(err) => store_error(err),
        }
    }
}

impl TryFrom<&mut CommandParser> for Xrange {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let start = StreamId::parse_bound(&parser.next_string()?, 0)?;
        let end = StreamId::parse_bound(&parser.next_string()?, u64::MAX)?;

        let count = match parser.remaining() {
            0 => None,
            _ => {
                if !parser.next_string()?.eq_ignore_ascii_case("count") {
                    return Err(CommandParserError::SyntaxError);
                }
                if parser.remaining() == 0 {
                    return Err(CommandParserError::SyntaxError);
                }
                // A negative count returns nothing.
                Some(parser.next_integer()?.max(0) as usize)
            }
        };

        Ok(Self {
            key,
            start,
            end,
            count,
        })
    }
}

/// Encodes entries as `[[id, [field, value, ...]], ...]`.
pub(crate) fn entries_frame(entries: Vec<StreamEntry>) -> Frame {
    let entries = entries
        .into_iter()
        .map(|entry| {
            let fields = entry
                .fields
                .into_iter()
                .flat_map(|(field, value)| [Frame::Bulk(field), Frame::Bulk(value)])
                .collect();

            Frame::Array(vec![
                Frame::Bulk(Bytes::from(entry.id.to_string())),
                Frame::Array(fields),
            ])
        })
        .collect();

    Frame::Array(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::store::stream::IdSpec;

    fn xrange_frame(args: &[&'static str]) -> Frame {
        let mut frames = vec![Frame::Bulk(Bytes::from("XRANGE"))];
        frames.extend(args.iter().map(|arg| Frame::Bulk(Bytes::from(*arg))));
        Frame::Array(frames)
    }

    fn entry(id: &'static str, field: &'static str, value: &'static str) -> Frame {
        Frame::Array(vec![
            Frame::Bulk(Bytes::from(id)),
            Frame::Array(vec![
                Frame::Bulk(Bytes::from(field)),
                Frame::Bulk(Bytes::from(value)),
            ]),
        ])
    }

    async fn store_with_stream() -> Store {
        let store = Store::new();
        for (seq, value) in [(1, "a"), (2, "b"), (3, "c")] {
            store
                .streams()
                .xadd(
                    String::from("s"),
                    IdSpec::Explicit(StreamId::new(1, seq)),
                    vec![(Bytes::from("f"), Bytes::from(value))],
                )
                .await
                .unwrap();
        }
        store
    }

    #[test]
    fn parse_bounds() {
        assert_eq!(
            Command::try_from(xrange_frame(&["s", "-", "+"])).unwrap(),
            Command::Xrange(Xrange {
                key: String::from("s"),
                start: StreamId::MIN,
                end: StreamId::MAX,
                count: None,
            })
        );
        assert_eq!(
            Command::try_from(xrange_frame(&["s", "5", "7", "COUNT", "2"])).unwrap(),
            Command::Xrange(Xrange {
                key: String::from("s"),
                start: StreamId::new(5, 0),
                end: StreamId::new(7, u64::MAX),
                count: Some(2),
            })
        );
        assert_eq!(
            Command::try_from(xrange_frame(&["s", "-", "+", "LIMIT", "2"])),
            Err(CommandParserError::SyntaxError)
        );
    }

    #[tokio::test]
    async fn inclusive_range() {
        let store = store_with_stream().await;

        let cmd = Command::try_from(xrange_frame(&["s", "1-1", "1-2"])).unwrap();

        assert_eq!(
            cmd.exec(&store).await.unwrap(),
            Frame::Array(vec![entry("1-1", "f", "a"), entry("1-2", "f", "b")])
        );
    }

    #[tokio::test]
    async fn full_range_with_count() {
        let store = store_with_stream().await;

        let cmd = Command::try_from(xrange_frame(&["s", "-", "+", "COUNT", "1"])).unwrap();

        assert_eq!(
            cmd.exec(&store).await.unwrap(),
            Frame::Array(vec![entry("1-1", "f", "a")])
        );

        let cmd = Command::try_from(xrange_frame(&["missing", "-", "+"])).unwrap();

        assert_eq!(cmd.exec(&store).await.unwrap(), Frame::Array(vec![]));
    }
}
