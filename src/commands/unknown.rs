use itertools::Itertools;

use crate::commands::executable::Executable;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// A command this server does not implement. Executing it replies with an error and leaves the
/// connection open.
#[derive(Debug, PartialEq)]
pub struct Unknown {
    /// The name as sent by the client.
    pub name: String,
    pub args: Vec<String>,
}

impl Executable for Unknown {
    async fn exec(self, _store: &Store) -> Result<Frame, Error> {
        let args = self.args.iter().map(|arg| format!("'{}' ", arg)).join("");

        Ok(Frame::Error(format!(
            "ERR unknown command '{}', with args beginning with: {}",
            self.name, args
        )))
    }
}
