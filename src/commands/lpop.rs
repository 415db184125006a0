use crate::commands::executable::Executable;
use crate::commands::{store_error, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Removes and returns the first elements of the list stored at `key`.
///
/// Without `count`, replies with the first element, or `nil` when the list does not exist. With
/// `count`, replies with an array of up to `count` elements, or a `nil` array when the list does
/// not exist.
///
/// Ref: <https://redis.io/docs/latest/commands/lpop/>
#[derive(Debug, PartialEq)]
pub struct Lpop {
    pub key: String,
    pub count: Option<usize>,
}

impl Executable for Lpop {
    async fn exec(self, store: &Store) -> Result<Frame, Error> {
        let values = match store.lists().lpop(&self.key, self.count.unwrap_or(1)).await {
            Ok(values) => values,
            Err(err) => return store_error(err),
        };

        let res = match self.count {
            None => values
                .into_iter()
                .next()
                .map_or(Frame::NullBulkString, Frame::Bulk),
            // A positive count only pops nothing when there is no list.
            Some(count) if count > 0 && values.is_empty() => Frame::NullArray,
            Some(_) => Frame::Array(values.into_iter().map(Frame::Bulk).collect()),
        };

        Ok(res)
    }
}

impl TryFrom<&mut CommandParser> for Lpop {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;

        let count = match parser.remaining() {
            0 => None,
            _ => {
                let count = parser.next_integer()?;
                let count = usize::try_from(count).map_err(|_| CommandParserError::NotPositive)?;
                Some(count)
            }
        };

        Ok(Self { key, count })
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
                ["a", "b", "c"].into_iter().map(Bytes::from).collect(),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn pop_single() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("LPOP")),
            Frame::Bulk(Bytes::from("list")),
        ]);
        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(
            cmd,
            Command::Lpop(Lpop {
                key: String::from("list"),
                count: None,
            })
        );

        let store = store_with_list().await;

        assert_eq!(cmd.exec(&store).await.unwrap(), Frame::Bulk(Bytes::from("a")));
        assert_eq!(store.lists().llen("list").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn pop_with_count() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("LPOP")),
            Frame::Bulk(Bytes::from("list")),
            Frame::Bulk(Bytes::from("2")),
        ]);
        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(
            cmd,
            Command::Lpop(Lpop {
                key: String::from("list"),
                count: Some(2),
            })
        );

        let store = store_with_list().await;

        assert_eq!(
            cmd.exec(&store).await.unwrap(),
            Frame::Array(vec![Frame::Bulk(Bytes::from("a")), Frame::Bulk(Bytes::from("b"))])
        );

        let cmd = Lpop {
            key: String::from("list"),
            count: Some(0),
        };
        assert_eq!(cmd.exec(&store).await.unwrap(), Frame::Array(vec![]));
    }

    #[tokio::test]
    async fn missing_list() {
        let store = Store::new();

        let cmd = Lpop {
            key: String::from("list"),
            count: None,
        };
        assert_eq!(cmd.exec(&store).await.unwrap(), Frame::NullBulkString);

        let cmd = Lpop {
            key: String::from("list"),
            count: Some(3),
        };
        assert_eq!(cmd.exec(&store).await.unwrap(), Frame::NullArray);
    }

    #[test]
    fn negative_count() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("LPOP")),
            Frame::Bulk(Bytes::from("list")),
            Frame::Bulk(Bytes::from("-1")),
        ]);

        assert_eq!(
            Command::try_from(frame),
            Err(CommandParserError::NotPositive)
        );
    }
}
