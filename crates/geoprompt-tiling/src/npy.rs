//! Minimal NumPy `.npy` (format 1.0) writer for little-endian `f32`/`i32`
//! C-order arrays.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
/// Magic, version and header-length field.
const PREAMBLE_LEN: usize = 10;
const ALIGN: usize = 64;

/// Element types the writer supports.
pub trait NpyElement: Copy {
    const DESCR: &'static str;
    fn write_le(self, out: &mut impl Write) -> io::Result<()>;
}

impl NpyElement for f32 {
    const DESCR: &'static str = "<f4";
    fn write_le(self, out: &mut impl Write) -> io::Result<()> {
        out.write_all(&self.to_le_bytes())
    }
}

impl NpyElement for i32 {
    const DESCR: &'static str = "<i4";
    fn write_le(self, out: &mut impl Write) -> io::Result<()> {
        out.write_all(&self.to_le_bytes())
    }
}

fn shape_literal(shape: &[usize]) -> String {
    match shape {
        [n] => format!("({n},)"),
        _ => {
            let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
            format!("({})", dims.join(", "))
        }
    }
}

/// Header dict padded with spaces and terminated by `\n` so the data starts
/// on a 64-byte boundary.
pub fn npy_header(descr: &str, shape: &[usize]) -> Vec<u8> {
    let mut dict = format!(
        "{{'descr': '{descr}', 'fortran_order': False, 'shape': {}, }}",
        shape_literal(shape)
    );
    let unpadded = PREAMBLE_LEN + dict.len() + 1;
    let pad = (ALIGN - unpadded % ALIGN) % ALIGN;
    dict.extend(std::iter::repeat(' ').take(pad));
    dict.push('\n');

    let mut out = Vec::with_capacity(PREAMBLE_LEN + dict.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out
}

/// Write `data` as a C-order array of `shape` to `out`.
pub fn write_npy<T: NpyElement>(out: &mut impl Write, shape: &[usize], data: &[T]) -> io::Result<()> {
    let expected: usize = shape.iter().product();
    if expected != data.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("shape {shape:?} needs {expected} values, got {}", data.len()),
        ));
    }
    out.write_all(&npy_header(T::DESCR, shape))?;
    for &v in data {
        v.write_le(out)?;
    }
    Ok(())
}

pub fn write_npy_file<T: NpyElement>(
    path: impl AsRef<Path>,
    shape: &[usize],
    data: &[T],
) -> io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    write_npy(&mut w, shape, data)?;
    w.flush()
}
