use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Runs a parsed command against the store and produces its reply.
///
/// Validation failures are returned as `Ok(Frame::Error(..))`. An `Err` means the connection
/// cannot go on.
#[allow(async_fn_in_trait)]
pub trait Executable {
    async fn exec(self, store: &Store) -> Result<Frame, Error>;
}
