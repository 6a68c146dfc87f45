//! メモリ上の値のデコード

use crate::{Error, Result};
use kasane_meta::{FileInfo, MemoryReader, MetaError, WordReader};

/// 文字列ヘッダ（ポインタ, 長さ）の配列を読み取る
///
/// 返すイテレータは遅延評価で、要素ごとに文字列本体を読み直します。
/// 最初の失敗でエラーを1度返し、それ以降は何も返しません。
pub fn read_string_array<'i, M: MemoryReader>(
    memory: M,
    info: &'i FileInfo,
    base: u64,
    count: u64,
) -> StringArray<'i, M> {
    StringArray {
        memory,
        info,
        base,
        count,
        index: 0,
        headers: None,
        done: false,
    }
}

/// `read_string_array` のイテレータ
pub struct StringArray<'i, M> {
    memory: M,
    info: &'i FileInfo,
    base: u64,
    count: u64,
    index: u64,
    /// 最初の要素を読むときに `2 * count * word_size` バイトをまとめて読む
    headers: Option<Vec<u8>>,
    done: bool,
}

impl<M: MemoryReader> StringArray<'_, M> {
    fn load_headers(&mut self) -> Result<()> {
        if self.headers.is_some() {
            return Ok(());
        }

        let word = self.info.word_size.bytes() as u64;
        let size = self
            .count
            .checked_mul(2 * word)
            .and_then(|size| usize::try_from(size).ok())
            .ok_or_else(|| Error::MemoryRead {
                address: self.base,
                source: MetaError::memory_read(self.base, "string array is too large"),
            })?;

        let data = self
            .memory
            .read(self.base, size)
            .map_err(|source| Error::MemoryRead {
                address: self.base,
                source,
            })?;
        self.headers = Some(data);
        Ok(())
    }

    fn next_string(&mut self) -> Result<Vec<u8>> {
        self.load_headers()?;

        let (ptr, len) = {
            let headers = self.headers.as_deref().unwrap_or_default();
            let start = (self.index * 2 * self.info.word_size.bytes() as u64) as usize;
            let mut reader = WordReader::with_file_info(headers.get(start..).unwrap_or_default(), self.info);
            (reader.read_word()?, reader.read_word()?)
        };

        let len = usize::try_from(len).map_err(|e| Error::MemoryRead {
            address: ptr,
            source: MetaError::memory_read(ptr, e.to_string()),
        })?;
        self.memory
            .read(ptr, len)
            .map_err(|source| Error::MemoryRead { address: ptr, source })
    }
}

impl<M: MemoryReader> Iterator for StringArray<'_, M> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.index >= self.count {
            return None;
        }

        let result = self.next_string();
        match result {
            Ok(_) => self.index += 1,
            Err(_) => self.done = true,
        }
        Some(result)
    }
}

impl<M: MemoryReader> std::iter::FusedIterator for StringArray<'_, M> {}
