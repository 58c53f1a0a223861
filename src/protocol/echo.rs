use super::{Disposition, Service};
use crate::store::VarStore;
use bytes::BytesMut;

/// Writes every chunk back to the client unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct Echo;

impl Service for Echo {
    fn on_read(
        &mut self,
        input: &[u8],
        _store: &mut VarStore,
        output: &mut BytesMut,
    ) -> Disposition {
        output.extend_from_slice(input);
        Disposition::KeepOpen
    }
}
