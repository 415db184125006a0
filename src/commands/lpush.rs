use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{store_error, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Insert all the specified values at the head of the list stored at `key`, one after the other,
/// so `LPUSH key a b c` leaves `c` first. Returns the length of the list after the push.
///
/// Ref: <https://redis.io/docs/latest/commands/lpush/>
#[derive(Debug, PartialEq)]
pub struct Lpush {
    pub key: String,
    pub values: Vec<Bytes>,
}

impl Executable for Lpush {
    async fn exec(self, store: &Store) -> Result<Frame, Error> {
        match store.lists().lpush(self.key, self.values).await {
            Ok(len) => Ok(Frame::Integer(len as i64)),
            Err(err) => store_error(err),
        }
    }
}

impl TryFrom<&mut CommandParser> for Lpush {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;

        let mut values = vec![parser.next_bytes()?];
        while parser.remaining() > 0 {
            values.push(parser.next_bytes()?);
        }

        Ok(Self { key, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;

    #[tokio::test]
    async fn prepends_values() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("LPUSH")),
            Frame::Bulk(Bytes::from("list")),
            Frame::Bulk(Bytes::from("a")),
            Frame::Bulk(Bytes::from("b")),
            Frame::Bulk(Bytes::from("c")),
        ]);
        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(
            cmd,
            Command::Lpush(Lpush {
                key: String::from("list"),
                values: vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")],
            })
        );

        let store = Store::new();

        assert_eq!(cmd.exec(&store).await.unwrap(), Frame::Integer(3));
        assert_eq!(
            store.lists().lrange("list", 0, -1).await.unwrap(),
            vec![Bytes::from("c"), Bytes::from("b"), Bytes::from("a")]
        );
    }
}
