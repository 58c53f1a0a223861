//! Seam between the connection multiplexer and whatever speaks to clients.
//!
//! The multiplexer hands every chunk it reads to a [`Service`] together with
//! the variable store, and writes back whatever the service buffered.

use crate::store::VarStore;
use bytes::BytesMut;

mod echo;

pub use echo::Echo;

/// What the multiplexer should do with a connection after a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    KeepOpen,
    Close,
}

/// Handles the bytes read from one client.
///
/// Runs on the event loop thread; it must not block.
pub trait Service: Send {
    fn on_read(
        &mut self,
        input: &[u8],
        store: &mut VarStore,
        output: &mut BytesMut,
    ) -> Disposition;
}

impl<F> Service for F
where
    F: FnMut(&[u8], &mut VarStore, &mut BytesMut) -> Disposition + Send,
{
    fn on_read(
        &mut self,
        input: &[u8],
        store: &mut VarStore,
        output: &mut BytesMut,
    ) -> Disposition {
        self(input, store, output)
    }
}
