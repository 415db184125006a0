use bytes::Bytes;
use std::time::Duration;

use crate::commands::executable::Executable;
use crate::commands::{checked_timeout, store_error, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Blocking version of `LPOP`. Pops the first element of the list at `key`, waiting up to
/// `timeout` for one to be pushed if the list is empty. A timeout of zero blocks indefinitely.
///
/// Replies with a two-element array holding the key and the popped element, or a `nil` array
/// once the timeout expires.
///
/// Ref: <https://redis.io/docs/latest/commands/blpop/>
#[derive(Debug, PartialEq)]
pub struct Blpop {
    pub key: String,
    pub timeout: Option<Duration>,
}

impl Executable for Blpop {
    async fn exec(self, store: &Store) -> Result<Frame, Error> {
        match store.lists().blpop(&self.key, self.timeout).await {
            Ok(Some(value)) => Ok(Frame::Array(vec![
                Frame::Bulk(Bytes::from(self.key)),
                Frame::Bulk(value),
            ])),
            Ok(None) => Ok(Frame::NullArray),
            Err(err) => store_error(err),
        }
    }
}

impl TryFrom<&mut CommandParser> for Blpop {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let timeout = parse_timeout(&parser.next_string()?)?;

        Ok(Self { key, timeout })
    }
}

/// Parses a timeout in (possibly fractional) seconds. Zero means no timeout.
fn parse_timeout(s: &str) -> Result<Option<Duration>, CommandParserError> {
    let seconds = s
        .parse::<f64>()
        .ok()
        .filter(|seconds| seconds.is_finite())
        .ok_or(CommandParserError::InvalidTimeout)?;

    if seconds < 0.0 {
        return Err(CommandParserError::NegativeTimeout);
    }
    if seconds == 0.0 {
        return Ok(None);
    }

    let timeout = Duration::try_from_secs_f64(seconds)
        .map_err(|_| CommandParserError::TimeoutOutOfRange)?;

    checked_timeout(timeout).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;

    fn blpop_frame(key: &'static str, timeout: &'static str) -> Frame {
        Frame::Array(vec![
            Frame::Bulk(Bytes::from("BLPOP")),
            Frame::Bulk(Bytes::from(key)),
            Frame::Bulk(Bytes::from(timeout)),
        ])
    }

    #[test]
    fn parse_timeouts() {
        assert_eq!(
            Command::try_from(blpop_frame("list", "0")).unwrap(),
            Command::Blpop(Blpop {
                key: String::from("list"),
                timeout: None,
            })
        );
        assert_eq!(
            Command::try_from(blpop_frame("list", "0.1")).unwrap(),
            Command::Blpop(Blpop {
                key: String::from("list"),
                timeout: Some(Duration::from_millis(100)),
            })
        );
        assert_eq!(
            Command::try_from(blpop_frame("list", "abc")),
            Err(CommandParserError::InvalidTimeout)
        );
        assert_eq!(
            Command::try_from(blpop_frame("list", "-1")),
            Err(CommandParserError::NegativeTimeout)
        );
        assert_eq!(
            Command::try_from(blpop_frame("list", "1e19")),
            Err(CommandParserError::TimeoutOutOfRange)
        );
        assert_eq!(
            Command::try_from(blpop_frame("list", "1e300")),
            Err(CommandParserError::TimeoutOutOfRange)
        );
    }

    #[tokio::test]
    async fn pops_available_element() {
        let store = Store::new();
        store
            .lists()
            .rpush(String::from("list"), vec![Bytes::from("a")])
            .await
            .unwrap();

        let cmd = Command::try_from(blpop_frame("list", "0")).unwrap();

        assert_eq!(
            cmd.exec(&store).await.unwrap(),
            Frame::Array(vec![
                Frame::Bulk(Bytes::from("list")),
                Frame::Bulk(Bytes::from("a")),
            ])
        );
    }

    #[tokio::test]
    async fn woken_by_push() {
        let store = Store::new();

        let handle = {
            let store = store.clone();
            tokio::spawn(async move {
                let cmd = Command::try_from(blpop_frame("list", "0")).unwrap();
                cmd.exec(&store).await.unwrap()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        store
            .lists()
            .rpush(String::from("list"), vec![Bytes::from("x")])
            .await
            .unwrap();

        assert_eq!(
            handle.await.unwrap(),
            Frame::Array(vec![
                Frame::Bulk(Bytes::from("list")),
                Frame::Bulk(Bytes::from("x")),
            ])
        );
    }

    #[tokio::test]
    async fn times_out() {
        let store = Store::new();

        let cmd = Command::try_from(blpop_frame("list", "0.1")).unwrap();

        assert_eq!(cmd.exec(&store).await.unwrap(), Frame::NullArray);
    }
}
