use md5::{Digest, Md5};
use tokio::io::{AsyncRead, AsyncReadExt};
use crate::config::{PIECE_HEAD_SIZE, PIECE_TAIL_CHAR, PIECE_WRAP_SIZE};
use super::{piece_md5::piece_md5_value, CdnError, Result};

// Content is read in chunks of this size.
const READ_CHUNK: usize = 256 * 1024;

// Low 24 bits of a piece header.
pub fn data_size(header: u32) -> usize {
    (header & 0x00ff_ffff) as usize
}

// Walks the framed pieces of a cached blob. Counters stay valid when a scan
// stops at a broken piece, covering every piece before it.
#[derive(Default)]
pub struct PieceScanner {

    // Complete pieces read so far.
    pub piece_count: i32,

    // Framed bytes of the complete pieces.
    pub file_length: i64,

    pub piece_md5s: Vec<String>,

    // Md5 over the content of every complete piece.
    pub file_md5: Option<Md5>,

    piece_md5: Option<Md5>,

}

impl PieceScanner {

    pub fn new(piece_md5: bool, file_md5: bool) -> Self {
        Self {
            piece_md5: piece_md5.then(Md5::new),
            file_md5: file_md5.then(Md5::new),
            ..Default::default()
        }
    }

    pub async fn scan<R>(&mut self, reader: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let checkpoint = self.file_md5.clone();
            match self.read_piece(reader).await {
                Ok(true) => {},
                Ok(false) => return Ok(()),
                Err(e) => {
                    // Content of the broken piece must not count.
                    self.file_md5 = checkpoint;
                    return Err(e);
                },
            }
        }
    }

    // Reads one framed piece, false on a clean end of input.
    async fn read_piece<R>(&mut self, reader: &mut R) -> Result<bool>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; PIECE_HEAD_SIZE];
        if !read_header(reader, &mut header).await? {
            return Ok(false);
        }
        let size = data_size(u32::from_be_bytes(header));
        let mut piece_md5 = self.piece_md5.as_ref().map(|_| Md5::new());
        if let Some(md5) = piece_md5.as_mut() {
            md5.update(header);
        }

        let mut buf = vec![0u8; READ_CHUNK.min(size.max(1))];
        let mut left = size;
        while left > 0 {
            let n = left.min(buf.len());
            reader.read_exact(&mut buf[..n]).await.map_err(|e| {
                CdnError::InvalidPiece(format!("piece {} content: {}", self.piece_count, e))
            })?;
            if let Some(md5) = piece_md5.as_mut() {
                md5.update(&buf[..n]);
            }
            if let Some(md5) = self.file_md5.as_mut() {
                md5.update(&buf[..n]);
            }
            left -= n;
        }

        let mut tail = [0u8; 1];
        reader.read_exact(&mut tail).await.map_err(|e| {
            CdnError::InvalidPiece(format!("piece {} tailer: {}", self.piece_count, e))
        })?;
        if tail[0] != PIECE_TAIL_CHAR {
            return Err(CdnError::InvalidPiece(format!(
                "piece {} has tailer {:#x}", self.piece_count, tail[0],
            )));
        }

        if let Some(mut md5) = piece_md5 {
            md5.update(tail);
            let sum = hex::encode(md5.finalize());
            self.piece_md5s.push(piece_md5_value(&sum, size + PIECE_WRAP_SIZE));
        }
        self.piece_count += 1;
        self.file_length += (size + PIECE_WRAP_SIZE) as i64;
        Ok(true)
    }

}

// Fills the header, false on a clean end of input.
async fn read_header<R>(reader: &mut R, header: &mut [u8; PIECE_HEAD_SIZE]) -> Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut read = 0;
    while read < header.len() {
        let n = reader.read(&mut header[read..]).await?;
        if n == 0 {
            break;
        }
        read += n;
    }
    match read {
        0 => Ok(false),
        PIECE_HEAD_SIZE => Ok(true),
        n => Err(CdnError::InvalidPiece(format!("unexpected head size: {}", n))),
    }
}
