use crate::coding::Coding;
use bytes::BytesMut;
use compression_codecs::EncodeV2;
use compression_core::util::{PartialBuffer, WriteBuffer};
use log::debug;
use std::io;

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024; // 8KB output buffer

/// One streaming compressor, owned for the lifetime of one response.
///
/// [`Encoder::finish`] emits the format trailer and releases the compressor.
/// It runs at most once and every later call fails. [`Encoder::release`]
/// gives the compressor up without a trailer, for streams that failed.
/// Dropping an unfinished encoder releases it without emitting anything.
pub(crate) struct Encoder {
    coding: Coding,
    inner: Option<Box<dyn EncodeV2 + Send>>,
    output_buffer: Vec<u8>,
}

impl Encoder {
    /// Creates an encoder for `coding`, or `None` for identity.
    pub(crate) fn new(coding: Coding) -> Option<Self> {
        Some(Self {
            coding,
            inner: Some(coding.encoder()?),
            output_buffer: vec![0u8; OUTPUT_BUFFER_SIZE],
        })
    }

    pub(crate) fn coding(&self) -> Coding {
        self.coding
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.inner.is_none()
    }

    /// Compresses all of `input`, appending whatever the encoder emits to `out`.
    pub(crate) fn encode(&mut self, input: &[u8], out: &mut BytesMut) -> io::Result<()> {
        let encoder = self.inner.as_mut().ok_or_else(finished)?;
        let mut input_buf = PartialBuffer::new(input);

        // Keep encoding until all input is consumed
        loop {
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            encoder.encode(&mut input_buf, &mut output)?;

            let written = output.written_len();
            out.extend_from_slice(&self.output_buffer[..written]);

            if input_buf.written_len() >= input.len() {
                return Ok(());
            }
            if written == 0 && input_buf.written_len() == 0 {
                return Err(io::Error::other(format!(
                    "{} encoder made no progress",
                    self.coding
                )));
            }
        }
    }

    /// Flushes buffered data so everything written so far can be decoded.
    pub(crate) fn flush(&mut self, out: &mut BytesMut) -> io::Result<()> {
        let encoder = self.inner.as_mut().ok_or_else(finished)?;
        loop {
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            let done = encoder.flush(&mut output)?;

            let written = output.written_len();
            out.extend_from_slice(&self.output_buffer[..written]);

            if done {
                return Ok(());
            }
        }
    }

    /// Emits the remaining data and the format trailer, then releases the
    /// compressor.
    pub(crate) fn finish(&mut self, out: &mut BytesMut) -> io::Result<()> {
        let mut encoder = self.inner.take().ok_or_else(finished)?;
        loop {
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            let done = encoder.finish(&mut output)?;

            let written = output.written_len();
            out.extend_from_slice(&self.output_buffer[..written]);

            if done {
                return Ok(());
            }
        }
    }

    /// Drops the compressor without emitting a trailer.
    pub(crate) fn release(&mut self) {
        self.inner = None;
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        if self.inner.is_some() {
            debug!("{} encoder released before finishing", self.coding);
        }
    }
}

fn finished() -> io::Error {
    io::Error::other("encoder already finished")
}
