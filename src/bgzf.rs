//! BGZF output sink.
//!
//! Real BGZF framing (BSIZE extra field, per-block CRC, virtual offsets)
//! is out of scope here; `flate2::write::GzEncoder` stands in as the
//! concrete sink, giving every caller the same `Write` surface a real
//! BGZF writer would without this crate owning block-boundary
//! bookkeeping.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

pub struct BgzfSink<W: Write> {
    inner: GzEncoder<W>,
}

impl<W: Write> BgzfSink<W> {
    pub fn new(writer: W) -> Self {
        BgzfSink {
            inner: GzEncoder::new(writer, Compression::default()),
        }
    }

    /// Flushes and returns the underlying writer, mirroring the
    /// "finish" step a real BGZF sink would need for its EOF block.
    pub fn finish(self) -> std::io::Result<W> {
        self.inner.finish()
    }
}

impl<W: Write> Write for BgzfSink<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
