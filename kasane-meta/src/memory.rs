//! ワード単位のメモリ読み取り
//!
//! ターゲットのメモリモデル（ワードサイズ4/8バイト、バイトオーダー）に従って
//! 整数を復元します。

use crate::{MetaError, Result};
use gimli::{EndianSlice, Reader, RunTimeEndian};

/// ネイティブ幅の整数のバイト数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordSize {
    Four,
    Eight,
}

impl WordSize {
    /// ワードのバイト数
    pub fn bytes(self) -> usize {
        match self {
            WordSize::Four => 4,
            WordSize::Eight => 8,
        }
    }
}

impl TryFrom<u64> for WordSize {
    type Error = MetaError;

    fn try_from(size: u64) -> Result<Self> {
        match size {
            4 => Ok(WordSize::Four),
            8 => Ok(WordSize::Eight),
            other => Err(MetaError::UnsupportedWordSize(other)),
        }
    }
}

/// バイナリの基本情報
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub os: String,
    pub arch: String,
    pub word_size: WordSize,
    pub byte_order: RunTimeEndian,
}

/// バイト列からワードを順に読み取るリーダー
///
/// 読み取りごとにカーソルが進みます。4バイトワードはゼロ拡張して `u64` で返します。
pub struct WordReader<'a> {
    reader: EndianSlice<'a, RunTimeEndian>,
    word_size: WordSize,
}

impl<'a> WordReader<'a> {
    /// 新しいワードリーダーを作成する
    pub fn new(data: &'a [u8], word_size: WordSize, byte_order: RunTimeEndian) -> Self {
        Self {
            reader: EndianSlice::new(data, byte_order),
            word_size,
        }
    }

    /// バイナリ情報のワードサイズとバイトオーダーでリーダーを作成する
    pub fn with_file_info(data: &'a [u8], info: &FileInfo) -> Self {
        Self::new(data, info.word_size, info.byte_order)
    }

    /// 1ワード読み取る
    ///
    /// 残りが `word_size` バイト未満の場合は `ShortRead` を返し、カーソルは進めません。
    pub fn read_word(&mut self) -> Result<u64> {
        let needed = self.word_size.bytes();
        let remaining = self.reader.len();
        if remaining < needed {
            return Err(MetaError::ShortRead { needed, remaining });
        }

        let word = match self.word_size {
            WordSize::Four => self.reader.read_u32().map(u64::from),
            WordSize::Eight => self.reader.read_u64(),
        };
        word.map_err(|_| MetaError::ShortRead { needed, remaining })
    }

    /// 未読のバイト数
    pub fn remaining(&self) -> usize {
        self.reader.len()
    }
}

/// 生メモリの読み取り能力
///
/// バイナリファイル（仮想アドレス空間）と解析セッションの両方が実装します。
/// 実装はキャッシュしてはいけません。呼び出しごとに読み直します。
pub trait MemoryReader {
    /// `addr` から `size` バイト読み取る
    fn read(&mut self, addr: u64, size: usize) -> Result<Vec<u8>>;

    /// `addr` から1ワード読み取る
    fn read_word(&mut self, addr: u64, info: &FileInfo) -> Result<u64> {
        let bytes = self.read(addr, info.word_size.bytes())?;
        WordReader::with_file_info(&bytes, info).read_word()
    }
}

impl<M: MemoryReader + ?Sized> MemoryReader for &mut M {
    fn read(&mut self, addr: u64, size: usize) -> Result<Vec<u8>> {
        (**self).read(addr, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BYTES: [u8; 8] = [0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];

    #[test]
    fn test_read_four_byte_words_little_endian() {
        let mut reader = WordReader::new(&BYTES, WordSize::Four, RunTimeEndian::Little);
        assert_eq!(reader.read_word().unwrap(), 1);
        assert_eq!(reader.read_word().unwrap(), 2);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_read_eight_byte_word_little_endian() {
        let mut reader = WordReader::new(&BYTES, WordSize::Eight, RunTimeEndian::Little);
        assert_eq!(reader.read_word().unwrap(), 0x0000_0002_0000_0001);
    }

    #[test]
    fn test_read_big_endian() {
        let data = [0x00, 0x00, 0x10, 0x00];
        let mut reader = WordReader::new(&data, WordSize::Four, RunTimeEndian::Big);
        assert_eq!(reader.read_word().unwrap(), 0x1000);
    }

    #[test]
    fn test_short_read_keeps_cursor() {
        let data = [0xaa, 0xbb, 0xcc];
        let mut reader = WordReader::new(&data, WordSize::Four, RunTimeEndian::Little);
        match reader.read_word() {
            Err(MetaError::ShortRead { needed, remaining }) => {
                assert_eq!(needed, 4);
                assert_eq!(remaining, 3);
            }
            other => panic!("expected ShortRead, got {:?}", other),
        }
        assert_eq!(reader.remaining(), 3);
    }

    #[test]
    fn test_word_size_from_u64() {
        assert_eq!(WordSize::try_from(4).unwrap(), WordSize::Four);
        assert_eq!(WordSize::try_from(8).unwrap(), WordSize::Eight);
        assert!(WordSize::try_from(2).is_err());
    }
}
