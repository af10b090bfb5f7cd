use crate::coding::Coding;
use crate::encoder::Encoder;
use bytes::BytesMut;
use log::warn;
use std::io::{self, Write};

/// A writer that compresses everything written to it into a byte sink.
///
/// Call [`EncodingWriter::finish`] to emit the format trailer and get the
/// sink back. A writer dropped without `finish` finishes itself, so the sink
/// always ends with a complete stream; errors at that point can only be
/// logged.
///
/// Once compressing or writing to the sink fails, the stream is aborted: the
/// compressor is released, nothing more reaches the sink, and no trailer is
/// ever written, so a damaged stream cannot pass for a complete one.
///
/// Identity does not compress: the writer forwards bytes unchanged.
pub struct EncodingWriter<W: Write> {
    sink: Option<W>,
    encoder: Option<Encoder>,
    scratch: BytesMut,
    aborted: bool,
}

impl<W: Write> EncodingWriter<W> {
    /// Wraps `sink` with a compressor for `coding`.
    pub fn new(coding: Coding, sink: W) -> Self {
        Self {
            sink: Some(sink),
            encoder: Encoder::new(coding),
            scratch: BytesMut::new(),
            aborted: false,
        }
    }

    /// Returns the coding applied to written bytes.
    pub fn coding(&self) -> Coding {
        self.encoder
            .as_ref()
            .map_or(Coding::Identity, Encoder::coding)
    }

    /// Closes the compressor and returns the sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.finish_encoder()?;
        let Some(mut sink) = self.sink.take() else {
            return Err(io::Error::other("writer already finished"));
        };
        sink.flush()?;
        Ok(sink)
    }

    fn finish_encoder(&mut self) -> io::Result<()> {
        self.check_aborted()?;
        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(());
        };
        if encoder.is_finished() {
            return Ok(());
        }
        let result = encoder.finish(&mut self.scratch);
        self.guard(result)?;
        self.drain()
    }

    fn drain(&mut self) -> io::Result<()> {
        if self.scratch.is_empty() {
            return Ok(());
        }
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        let result = sink.write_all(&self.scratch);
        self.scratch.clear();
        self.guard(result)
    }

    /// Aborts the stream if `result` is an error.
    fn guard<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if result.is_err() && !self.aborted {
            self.aborted = true;
            self.scratch.clear();
            if let Some(encoder) = self.encoder.as_mut() {
                encoder.release();
            }
        }
        result
    }

    fn check_aborted(&self) -> io::Result<()> {
        if self.aborted {
            return Err(io::Error::other(format!(
                "{} stream aborted after an earlier error",
                self.coding()
            )));
        }
        Ok(())
    }
}

impl<W: Write> Write for EncodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_aborted()?;
        match self.encoder.as_mut() {
            Some(encoder) => {
                let result = encoder.encode(buf, &mut self.scratch);
                self.guard(result)?;
                self.drain()?;
                Ok(buf.len())
            }
            None => match self.sink.as_mut() {
                Some(sink) => sink.write(buf),
                None => Err(io::Error::other("writer already finished")),
            },
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_aborted()?;
        if let Some(encoder) = self.encoder.as_mut() {
            let result = encoder.flush(&mut self.scratch);
            self.guard(result)?;
            self.drain()?;
        }
        match self.sink.as_mut() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write> Drop for EncodingWriter<W> {
    fn drop(&mut self) {
        if self.sink.is_none() || self.aborted {
            return;
        }
        if let Err(e) = self.finish_encoder() {
            warn!("failed to finish {} stream on drop: {e}", self.coding());
        }
    }
}
