use std::io::{Read, Seek, SeekFrom};

/// Default chunk size for streamed uploads (§6.1: 64 KiB, configurable).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A chunked reader over a `Read + Seek` source, used by the local CAS and
/// the execution API clients to stream large blobs without materialising
/// the whole file in memory (§2 C12, §9 supplemented feature).
pub struct IncrementalReader<R> {
    inner: R,
    chunk_size: usize,
    offset: u64,
    len: u64,
}

impl<R: Read + Seek> IncrementalReader<R> {
    pub fn new(mut inner: R) -> std::io::Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner,
            chunk_size: DEFAULT_CHUNK_SIZE,
            offset: 0,
            len,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Seeks to `offset` within the source; subsequent `next_chunk` calls
    /// read starting there.
    pub fn seek_to(&mut self, offset: u64) -> std::io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }

    pub fn total_len(&self) -> u64 {
        self.len
    }

    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.offset)
    }

    /// Reads the next chunk (at most `chunk_size` bytes), or `None` at EOF.
    pub fn next_chunk(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        if self.offset >= self.len {
            return Ok(None);
        }
        let want = self.chunk_size.min((self.len - self.offset) as usize);
        let mut buf = vec![0u8; want];
        self.inner.read_exact(&mut buf)?;
        self.offset += want as u64;
        Ok(Some(buf))
    }
}

impl<R: Read + Seek> Iterator for IncrementalReader<R> {
    type Item = std::io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn streams_content_in_fixed_size_chunks() {
        let data = vec![7u8; 150];
        let reader = IncrementalReader::new(Cursor::new(data.clone()))
            .unwrap()
            .with_chunk_size(64);
        let chunks: Vec<Vec<u8>> = reader.map(|c| c.unwrap()).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 64);
        assert_eq!(chunks[1].len(), 64);
        assert_eq!(chunks[2].len(), 22);
        let joined: Vec<u8> = chunks.into_iter().flatten().collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn empty_source_yields_no_chunks() {
        let mut reader = IncrementalReader::new(Cursor::new(Vec::<u8>::new())).unwrap();
        assert_eq!(reader.next_chunk().unwrap(), None);
    }

    #[test]
    fn seek_to_resumes_from_an_offset() {
        let data: Vec<u8> = (0..100u8).collect();
        let mut reader = IncrementalReader::new(Cursor::new(data.clone()))
            .unwrap()
            .with_chunk_size(10);
        reader.seek_to(50).unwrap();
        let chunk = reader.next_chunk().unwrap().unwrap();
        assert_eq!(chunk, data[50..60]);
    }
}
