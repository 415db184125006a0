use bytes::Bytes;
use std::time::Duration;

use crate::commands::executable::Executable;
use crate::commands::{store_error, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::{now_ms, Store};
use crate::Error;

/// Set `key` to hold the string `value`. If `key` already holds a string, it is overwritten and
/// its previous time to live is discarded.
///
/// Options:
/// * `EX seconds` - Set the specified expire time, in seconds.
/// * `PX milliseconds` - Set the specified expire time, in milliseconds.
///
/// Ref: <https://redis.io/docs/latest/commands/set/>
#[derive(Debug, PartialEq)]
pub struct Set {
    pub key: String,
    pub value: Bytes,
    pub ttl: Option<Duration>,
}

impl Executable for Set {
    async fn exec(self, store: &Store) -> Result<Frame, Error> {
        match store.kv().set(self.key, self.value, self.ttl).await {
            Ok(()) => Ok(Frame::Simple("OK".to_string())),
            Err(err) => store_error(err),
        }
    }
}

impl TryFrom<&mut CommandParser> for Set {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let value = parser.next_bytes()?;

        let mut ttl = None;

        while parser.remaining() > 0 {
            let option = parser.next_string()?.to_lowercase();

            let unit_ms: i64 = match &option[..] {
                "ex" => 1000,
                "px" => 1,
                _ => return Err(CommandParserError::SyntaxError),
            };

            if ttl.is_some() || parser.remaining() == 0 {
                return Err(CommandParserError::SyntaxError);
            }

            let invalid_expire_time = || CommandParserError::InvalidExpireTime {
                command: "set".to_string(),
            };

            let amount = parser.next_integer()?;
            if amount <= 0 {
                return Err(invalid_expire_time());
            }

            // The absolute expiry must fit in a signed millisecond timestamp.
            let ttl_ms = amount.checked_mul(unit_ms).ok_or_else(invalid_expire_time)?;
            i64::try_from(now_ms())
                .ok()
                .and_then(|now| now.checked_add(ttl_ms))
                .ok_or_else(invalid_expire_time)?;

            ttl = Some(Duration::from_millis(ttl_ms as u64));
        }

        Ok(Self { key, value, ttl })
    }
}
