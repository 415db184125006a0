use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{store_error, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Insert all the specified values at the tail of the list stored at `key`. If `key` does not
/// exist, it is created as an empty list before the push. Returns the length of the list after
/// the push.
///
/// Ref: <https://redis.io/docs/latest/commands/rpush/>
#[derive(Debug, PartialEq)]
pub struct Rpush {
    pub key: String,
    pub values: Vec<Bytes>,
}

impl Executable for Rpush {
    async fn exec(self, store: &Store) -> Result<Frame, Error> {
        match store.lists().rpush(self.key, self.values).await {
            Ok(len) => Ok(Frame::Integer(len as i64)),
            Err(err) => store_error(err),
        }
    }
}

impl TryFrom<&mut CommandParser> for Rpush {
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
