//! Host-endian value runs over byte streams.
//!
//! Every file the trainer touches is a flat run of `i32`, `f32` or `f64` values in the
//! machine's native layout, so reading is a matter of filling a typed buffer's byte view.

use std::io::{self, Read, Write};

use bytemuck::{Pod, Zeroable};

use crate::{LsvmErr, Result};

/// Reads exactly `n` values of type `T`.
///
/// # Arguments
/// * `reader` - The byte source.
/// * `n` - The amount of values to read.
/// * `what` - A name for the values, used in the error on a short read.
///
/// # Returns
/// The values, or `LsvmErr::ShortRead` if the stream ends first.
pub fn read_values<T, R>(reader: &mut R, n: usize, what: &'static str) -> Result<Vec<T>>
where
    T: Pod + Zeroable,
    R: Read + ?Sized,
{
    let mut buf = vec![T::zeroed(); n];

    // The typed buffer keeps `T`'s alignment, its byte view gets overwritten whole.
    let bytes: &mut [u8] = bytemuck::cast_slice_mut(buf.as_mut_slice());
    reader.read_exact(bytes).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => LsvmErr::ShortRead { what, expected: n },
        _ => LsvmErr::Io(e),
    })?;

    Ok(buf)
}

/// Reads exactly `n` host-endian `i32`s.
pub fn read_i32s<R: Read + ?Sized>(
    reader: &mut R,
    n: usize,
    what: &'static str,
) -> Result<Vec<i32>> {
    read_values(reader, n, what)
}

/// Reads exactly `n` host-endian `f32`s.
pub fn read_f32s<R: Read + ?Sized>(
    reader: &mut R,
    n: usize,
    what: &'static str,
) -> Result<Vec<f32>> {
    read_values(reader, n, what)
}

/// Reads exactly `n` host-endian `f64`s.
pub fn read_f64s<R: Read + ?Sized>(
    reader: &mut R,
    n: usize,
    what: &'static str,
) -> Result<Vec<f64>> {
    read_values(reader, n, what)
}

/// Writes `values` in host-endian layout.
pub fn write_values<T, W>(writer: &mut W, values: &[T]) -> io::Result<()>
where
    T: Pod,
    W: Write + ?Sized,
{
    writer.write_all(bytemuck::cast_slice(values))
}

/// Writes host-endian `f64`s.
pub fn write_f64s<W: Write + ?Sized>(writer: &mut W, values: &[f64]) -> io::Result<()> {
    write_values(writer, values)
}

/// Converts a count read from a file into a `usize`, rejecting negative values.
pub(crate) fn count(field: &'static str, value: i32) -> Result<usize> {
    usize::try_from(value).map_err(|_| LsvmErr::InvalidHeader {
        field,
        value: value.into(),
    })
}
