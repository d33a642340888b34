//! Minimal length-prefixed codec over [`bytes`] buffers.
//!
//! Every variable-sized field is written as a big-endian `u32` length
//! followed by the bytes. Reads are bounded and never panic on short input.

use crate::backends::error::PointError;
use crate::backends::error::ScalarError;
use crate::traits::Affine;
use crate::traits::ScalarField;

use bytes::Buf;
use bytes::BufMut;

/// Upper bound of any single length-prefixed field.
pub const MAX_FIELD_LEN: usize = 1 << 20;

/// Upper bound of the number of items in an encoded list.
pub const MAX_ITEMS: usize = 1 << 12;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CodecError {
    #[error("unexpected end of buffer")]
    EndOfBuffer,
    #[error("extra data found: {0} bytes")]
    ExtraData(usize),
    #[error("length exceeded: {0} > {1}")]
    LengthExceeded(usize, usize),
    #[error("invalid data in {0}: {1}")]
    InvalidData(&'static str, String),
    #[error("point: {0}")]
    Point(#[from] PointError),
    #[error("scalar: {0}")]
    Scalar(#[from] ScalarError),
}

/// Types that can be written to a buffer.
pub trait Write {
    fn write(&self, buf: &mut impl BufMut);

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write(&mut buf);
        buf
    }
}

/// Types that can be read from a buffer.
pub trait Read: Sized {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError>;

    /// Decodes a value, ensuring the buffer is fully consumed.
    fn decode(mut buf: impl Buf) -> Result<Self, CodecError> {
        let value = Self::read(&mut buf)?;
        let remaining = buf.remaining();
        if remaining > 0 {
            return Err(CodecError::ExtraData(remaining));
        }

        Ok(value)
    }
}

fn ensure(buf: &impl Buf, len: usize) -> Result<(), CodecError> {
    if buf.remaining() < len {
        return Err(CodecError::EndOfBuffer);
    }
    Ok(())
}

pub fn read_u8(buf: &mut impl Buf) -> Result<u8, CodecError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub fn read_u32(buf: &mut impl Buf) -> Result<u32, CodecError> {
    ensure(buf, 4)?;
    Ok(buf.get_u32())
}

pub fn read_u64(buf: &mut impl Buf) -> Result<u64, CodecError> {
    ensure(buf, 8)?;
    Ok(buf.get_u64())
}

pub fn read_fixed(buf: &mut impl Buf, len: usize) -> Result<Vec<u8>, CodecError> {
    ensure(buf, len)?;
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

pub fn write_bytes(buf: &mut impl BufMut, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

pub fn read_bytes(buf: &mut impl Buf) -> Result<Vec<u8>, CodecError> {
    let len = read_u32(buf)? as usize;
    if len > MAX_FIELD_LEN {
        return Err(CodecError::LengthExceeded(len, MAX_FIELD_LEN));
    }
    read_fixed(buf, len)
}

/// Reads a list length, bounded by [`MAX_ITEMS`].
pub fn read_len(buf: &mut impl Buf) -> Result<usize, CodecError> {
    let len = read_u32(buf)? as usize;
    if len > MAX_ITEMS {
        return Err(CodecError::LengthExceeded(len, MAX_ITEMS));
    }
    Ok(len)
}

pub fn write_point<P: Affine>(buf: &mut impl BufMut, point: &P) {
    buf.put_slice(&point.serialize());
}

pub fn read_point<P: Affine>(buf: &mut impl Buf, size: usize) -> Result<P, CodecError> {
    let bytes = read_fixed(buf, size)?;
    Ok(P::deserialize(&bytes)?)
}

pub fn write_scalar<F: ScalarField>(buf: &mut impl BufMut, scalar: &F) {
    buf.put_slice(&scalar.to_bytes_be());
}

pub fn read_scalar<F: ScalarField>(buf: &mut impl Buf) -> Result<F, CodecError> {
    let bytes = read_fixed(buf, F::SCALAR_SIZE)?;
    Ok(F::from_bytes_be(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_buffers_never_panic() {
        let mut buf: &[u8] = &[0, 0];
        assert_eq!(read_u32(&mut buf), Err(CodecError::EndOfBuffer));

        // length prefix larger than the remaining bytes
        let mut buf: &[u8] = &[0, 0, 0, 5, 1, 2];
        assert_eq!(read_bytes(&mut buf), Err(CodecError::EndOfBuffer));
    }

    #[test]
    fn oversized_fields_are_rejected() {
        let mut raw = vec![];
        raw.put_u32(MAX_FIELD_LEN as u32 + 1);
        let mut buf: &[u8] = &raw;
        assert_eq!(
            read_bytes(&mut buf),
            Err(CodecError::LengthExceeded(MAX_FIELD_LEN + 1, MAX_FIELD_LEN))
        );

        let mut raw = vec![];
        raw.put_u32(MAX_ITEMS as u32 + 1);
        let mut buf: &[u8] = &raw;
        assert_eq!(
            read_len(&mut buf),
            Err(CodecError::LengthExceeded(MAX_ITEMS + 1, MAX_ITEMS))
        );
    }

    #[test]
    fn length_prefixed_bytes() {
        let mut raw = vec![];
        write_bytes(&mut raw, b"tag");
        assert_eq!(raw, [0, 0, 0, 3, b't', b'a', b'g']);

        let mut buf: &[u8] = &raw;
        assert_eq!(read_bytes(&mut buf).unwrap(), b"tag");
        assert!(buf.is_empty());
    }
}
