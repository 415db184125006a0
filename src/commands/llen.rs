use crate::commands::executable::Executable;
use crate::commands::{store_error, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns the length of the list stored at `key`, or `0` if there is no list at `key`.
///
/// Ref: <https://redis.io/docs/latest/commands/llen/>
#[derive(Debug, PartialEq)]
pub struct Llen {
    pub key: String,
}

impl Executable for Llen {
    async fn exec(self, store: &Store) -> Result<Frame, Error> {
        match store.lists().llen(&self.key).await {
            Ok(len) => Ok(Frame::Integer(len as i64)),
            Err(err) => store_error(err),
        }
    }
}

impl TryFrom<&mut CommandParser> for Llen {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
