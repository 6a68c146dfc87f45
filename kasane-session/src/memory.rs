//! セッション経由のメモリ読み取り

use crate::{Channel, Session};
use kasane_meta::{MemoryReader, MetaError};

impl<C: Channel> MemoryReader for Session<C> {
    fn read(&mut self, addr: u64, size: usize) -> kasane_meta::Result<Vec<u8>> {
        self.read_memory(addr, size)
            .map_err(|e| MetaError::MemoryRead {
                address: addr,
                source: Box::new(e),
            })
    }
}
