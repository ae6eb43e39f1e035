//! Fortran unformatted-record framing: every record is
//! `[u32 length][payload][u32 length]`, little-endian.

use crate::error::SphError;
use std::io::{Read, Write};

pub fn read_u32<R: Read>(r: &mut R) -> Result<u32, SphError> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

/// Reads one record, validating the head/tail length markers.
pub fn read_record<R: Read>(r: &mut R) -> Result<Vec<u8>, SphError> {
    let len = read_u32(r)?;
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    let tail = read_u32(r)?;
    if tail != len {
        return Err(SphError::Format(format!(
            "record framing mismatch: head {len}, tail {tail}"
        )));
    }
    Ok(buf)
}

/// Reads and discards one record.
pub fn skip_record<R: Read>(r: &mut R) -> Result<(), SphError> {
    read_record(r).map(|_| ())
}

pub fn write_record<W: Write>(w: &mut W, payload: &[u8]) -> Result<(), SphError> {
    let len = payload.len() as u32;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(payload)?;
    w.write_all(&len.to_le_bytes())?;
    Ok(())
}

pub fn as_i32s(buf: &[u8]) -> Vec<i32> {
    buf.chunks_exact(4)
        .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

pub fn as_f64s(buf: &[u8]) -> Vec<f64> {
    buf.chunks_exact(8)
        .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

pub fn as_f32s(buf: &[u8]) -> Vec<f64> {
    buf.chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()) as f64)
        .collect()
}

/// Reads a record expected to hold exactly one i32.
pub fn read_i32_scalar<R: Read>(r: &mut R) -> Result<i32, SphError> {
    let rec = read_record(r)?;
    if rec.len() != 4 {
        return Err(SphError::Format(format!(
            "expected scalar i32 record, got {} bytes",
            rec.len()
        )));
    }
    Ok(i32::from_le_bytes(rec[..4].try_into().unwrap()))
}

/// Reads a record expected to hold exactly one f64.
pub fn read_f64_scalar<R: Read>(r: &mut R) -> Result<f64, SphError> {
    let rec = read_record(r)?;
    if rec.len() != 8 {
        return Err(SphError::Format(format!(
            "expected scalar f64 record, got {} bytes",
            rec.len()
        )));
    }
    Ok(f64::from_le_bytes(rec[..8].try_into().unwrap()))
}

pub fn write_i32_record<W: Write>(w: &mut W, values: &[i32]) -> Result<(), SphError> {
    let mut buf = Vec::with_capacity(values.len() * 4);
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    write_record(w, &buf)
}

pub fn write_f64_record<W: Write>(w: &mut W, values: &[f64]) -> Result<(), SphError> {
    let mut buf = Vec::with_capacity(values.len() * 8);
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    write_record(w, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn record_round_trip() {
        let mut buf = Vec::new();
        write_f64_record(&mut buf, &[1.5, -2.5]).unwrap();
        write_i32_record(&mut buf, &[7]).unwrap();
        let mut r = Cursor::new(buf);
        assert_eq!(as_f64s(&read_record(&mut r).unwrap()), vec![1.5, -2.5]);
        assert_eq!(read_i32_scalar(&mut r).unwrap(), 7);
    }

    #[test]
    fn bad_tail_marker_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&4u32.to_le_bytes());
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.extend_from_slice(&8u32.to_le_bytes()); // wrong tail
        let mut r = Cursor::new(buf);
        assert!(read_record(&mut r).is_err());
    }
}
