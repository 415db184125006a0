use bytes::Bytes;
use itertools::Itertools;

use crate::commands::executable::Executable;
use crate::commands::{store_error, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::stream::IdSpec;
use crate::store::Store;
use crate::Error;

/// Appends the specified stream entry to the stream at `key`, creating the stream if it does
/// not exist. Replies with the id of the added entry.
///
/// The id is either explicit (`ms-seq`), partially generated (`ms-*`) or fully generated (`*`).
/// It must be greater than every id already in the stream.
///
/// Ref: <https://redis.io/docs/latest/commands/xadd/>
#[derive(Debug, PartialEq)]
pub struct Xadd {
    pub key: String,
    pub id: IdSpec,
    pub fields: Vec<(Bytes, Bytes)>,
}

impl Executable for Xadd {
    async fn exec(self, store: &Store) -> Result<Frame, Error> {
        match store.streams().xadd(self.key, self.id, self.fields).await {
            Ok(id) => Ok(Frame::Bulk(Bytes::from(id.to_string()))),
            Err(err) => store_error(err),
        }
    }
}

impl TryFrom<&mut CommandParser> for Xadd {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let id = parser.next_string()?;

        let remaining = parser.remaining();
        if remaining == 0 || remaining % 2 != 0 {
            return Err(CommandParserError::WrongArity {
                command: "xadd".to_string(),
            });
        }

        let id = id.parse::<IdSpec>()?;

        let mut values = Vec::with_capacity(remaining);
        while parser.remaining() > 0 {
            values.push(parser.next_bytes()?);
        }
        let fields = values.into_iter().tuples().collect();

        Ok(Self { key, id, fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::store::stream::StreamId;

    fn xadd_frame(args: &[&'static str]) -> Frame {
        let mut frames = vec![Frame::Bulk(Bytes::from("XADD"))];
        frames.extend(args.iter().map(|arg| Frame::Bulk(Bytes::from(*arg))));
        Frame::Array(frames)
    }

    #[test]
    fn parse_fields() {
        let cmd = Command::try_from(xadd_frame(&["s", "1-1", "a", "1", "b", "2"])).unwrap();

        assert_eq!(
            cmd,
            Command::Xadd(Xadd {
                key: String::from("s"),
                id: IdSpec::Explicit(StreamId::new(1, 1)),
                fields: vec![
                    (Bytes::from("a"), Bytes::from("1")),
                    (Bytes::from("b"), Bytes::from("2")),
                ],
            })
        );

        assert_eq!(
            Command::try_from(xadd_frame(&["s", "1-1", "a"])),
            Err(CommandParserError::WrongArity {
                command: "xadd".to_string()
            })
        );
        assert_eq!(
            Command::try_from(xadd_frame(&["s", "1-1"])),
            Err(CommandParserError::WrongArity {
                command: "xadd".to_string()
            })
        );
        assert!(Command::try_from(xadd_frame(&["s", "one", "a", "1"])).is_err());
    }

    #[tokio::test]
    async fn ids_must_increase() {
        let store = Store::new();

        let cmd = Command::try_from(xadd_frame(&["s", "5-1", "a", "1"])).unwrap();
        assert_eq!(cmd.exec(&store).await.unwrap(), Frame::Bulk(Bytes::from("5-1")));

        let cmd = Command::try_from(xadd_frame(&["s", "5-1", "a", "1"])).unwrap();
        assert_eq!(
            cmd.exec(&store).await.unwrap(),
            Frame::Error(
                "ERR The ID specified in XADD is equal or smaller than the target stream top item"
                    .to_string()
            )
        );

        let cmd = Command::try_from(xadd_frame(&["s", "5-*", "a", "1"])).unwrap();
        assert_eq!(cmd.exec(&store).await.unwrap(), Frame::Bulk(Bytes::from("5-2")));

        let cmd = Command::try_from(xadd_frame(&["t", "0-0", "a", "1"])).unwrap();
        assert_eq!(
            cmd.exec(&store).await.unwrap(),
            Frame::Error("ERR The ID specified in XADD must be greater than 0-0".to_string())
        );
    }
}
