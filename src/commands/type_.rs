use crate::commands::executable::Executable;
use crate::commands::{store_error, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns the string representation of the type of the value stored at `key`.
///
/// The types this server can return are `string`, `list` and `stream`. If the key does not
/// exist, `none` is returned.
///
/// Ref: <https://redis.io/docs/latest/commands/type/>
#[derive(Debug, PartialEq)]
pub struct Type {
    pub key: String,
}

impl Executable for Type {
    async fn exec(self, store: &Store) -> Result<Frame, Error> {
        match store.value_type(&self.key).await {
            Ok(Some(value_type)) => Ok(Frame::Simple(value_type.to_string())),
            Ok(None) => Ok(Frame::Simple("none".to_string())),
            Err(err) => store_error(err),
        }
    }
}

impl TryFrom<&mut CommandParser> for Type {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
