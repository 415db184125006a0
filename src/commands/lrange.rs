use crate::commands::executable::Executable;
use crate::commands::{store_error, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns the elements of the list stored at `key` between the offsets `start` and `stop`, both
/// inclusive. Offsets can be negative, `-1` being the last element of the list. Out of range
/// offsets are clamped to the list.
///
/// Ref: <https://redis.io/docs/latest/commands/lrange/>
#[derive(Debug, PartialEq)]
pub struct Lrange {
    pub key: String,
    pub start: i64,
    pub stop: i64,
}

impl Executable for Lrange {
    async fn exec(self, store: &Store) -> Result<Frame, Error> {
        match store.lists().lrange(&self.key, self.start, self.stop).await {
            Ok(values) => Ok(Frame::Array(values.into_iter().map(Frame::Bulk).collect())),
            Err(err) => store_error(err),
        }
    }
}

impl TryFrom<&mut CommandParser> for Lrange {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let start = parser.next_integer()?;
        let stop = parser.next_integer()?;

        Ok(Self { key, start, stop })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use bytes::Bytes;

    async fn store_with_list() -> Store {
        let store = Store::new();
        store
            .lists()
            .rpush(
                String::from("list"),
                ["a", "b", "c", "d", "e"].into_iter().map(Bytes::from).collect(),
            )
            .await
            .unwrap();
        store
    }

    fn bulks(items: &[&'static str]) -> Frame {
        Frame::Array(items.iter().map(|item| Frame::Bulk(Bytes::from(*item))).collect())
    }

    #[tokio::test]
    async fn negative_offsets() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("LRANGE")),
            Frame::Bulk(Bytes::from("list")),
            Frame::Bulk(Bytes::from("-3")),
            Frame::Bulk(Bytes::from("-1")),
        ]);
        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(
            cmd,
            Command::Lrange(Lrange {
                key: String::from("list"),
                start: -3,
                stop: -1,
            })
        );

        let store = store_with_list().await;

        assert_eq!(cmd.exec(&store).await.unwrap(), bulks(&["c", "d", "e"]));
    }

    #[tokio::test]
    async fn out_of_range_offsets() {
        let store = store_with_list().await;

        let cmd = Lrange {
            key: String::from("list"),
            start: 5,
            stop: 10,
        };
        assert_eq!(cmd.exec(&store).await.unwrap(), bulks(&[]));

        let cmd = Lrange {
            key: String::from("list"),
            start: 2,
            stop: 1,
        };
        assert_eq!(cmd.exec(&store).await.unwrap(), bulks(&[]));

        let cmd = Lrange {
            key: String::from("list"),
            start: 0,
            stop: 100,
        };
        assert_eq!(
            cmd.exec(&store).await.unwrap(),
            bulks(&["a", "b", "c", "d", "e"])
        );
    }

    #[test]
    fn non_integer_offset() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("LRANGE")),
            Frame::Bulk(Bytes::from("list")),
            Frame::Bulk(Bytes::from("zero")),
            Frame::Bulk(Bytes::from("-1")),
        ]);

        assert_eq!(
            Command::try_from(frame),
            Err(CommandParserError::NotAnInteger)
        );
    }
}
