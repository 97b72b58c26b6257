//! Array records: dtype tag, dimension count, dimensions, byte length,
//! raw little-endian element content.

use bytes::{Buf, BufMut};

use crate::array::{element_count, ArrayData, DType, NdArray, MAX_DIMS};
use crate::error::StreamError;

/// Encoded size of a record describing `array`.
pub fn record_len(array: &NdArray) -> usize {
    // dtype + ndim + dims + byte_length + data
    2 + 8 * array.ndim() + 8 + array.byte_len()
}

/// Append the record for `array` to `dst`.
///
/// `field` names the record in errors.
pub fn write_record(
    dst: &mut impl BufMut,
    field: &'static str,
    array: &NdArray,
) -> Result<(), StreamError> {
    let expected = element_count(array.shape())
        .ok_or_else(|| StreamError::encoding(field, "shape overflows usize"))?;
    if expected != array.len() {
        return Err(StreamError::encoding(
            field,
            format!(
                "shape {:?} declares {expected} elements, storage holds {}",
                array.shape(),
                array.len()
            ),
        ));
    }
    if array.ndim() == 0 || array.ndim() > MAX_DIMS {
        return Err(StreamError::encoding(
            field,
            format!("dimension count {} outside 1..={MAX_DIMS}", array.ndim()),
        ));
    }

    dst.put_u8(array.dtype() as u8);
    dst.put_u8(array.ndim() as u8);
    for &dim in array.shape() {
        dst.put_u64_le(dim as u64);
    }
    dst.put_u64_le(array.byte_len() as u64);

    match array.data() {
        ArrayData::U8(v) => dst.put_slice(v),
        ArrayData::U16(v) => v.iter().for_each(|&x| dst.put_u16_le(x)),
        ArrayData::F32(v) => v.iter().for_each(|&x| dst.put_f32_le(x)),
        ArrayData::F64(v) => v.iter().for_each(|&x| dst.put_f64_le(x)),
    }
    Ok(())
}

/// Read one record from the front of `src`, advancing past it.
///
/// `src` is the already length-checked message body, so running off its
/// end means the record lied about its size.
pub fn read_record(src: &mut &[u8], field: &'static str) -> Result<NdArray, StreamError> {
    need(src, 2, field)?;
    let tag = src.get_u8();
    let dtype = DType::try_from(tag)
        .map_err(|_| StreamError::malformed(format!("{field}: unknown dtype tag {tag:#04x}")))?;
    let ndim = src.get_u8() as usize;
    if ndim == 0 || ndim > MAX_DIMS {
        return Err(StreamError::malformed(format!(
            "{field}: dimension count {ndim} outside 1..={MAX_DIMS}"
        )));
    }

    need(src, 8 * ndim + 8, field)?;
    let mut shape = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        let dim = usize::try_from(src.get_u64_le())
            .map_err(|_| StreamError::malformed(format!("{field}: dimension overflows usize")))?;
        shape.push(dim);
    }
    let byte_length = src.get_u64_le();

    let declared = element_count(&shape)
        .and_then(|n| n.checked_mul(dtype.size()))
        .ok_or_else(|| StreamError::malformed(format!("{field}: shape {shape:?} overflows")))?;
    if byte_length != declared as u64 {
        return Err(StreamError::malformed(format!(
            "{field}: byte length {byte_length} does not match {dtype}{shape:?} ({declared} bytes)"
        )));
    }

    need(src, declared, field)?;
    let raw = &src[..declared];
    let data = match dtype {
        DType::U8 => ArrayData::U8(raw.to_vec()),
        DType::U16 => ArrayData::U16(
            raw.chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect(),
        ),
        DType::F32 => ArrayData::F32(
            raw.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        DType::F64 => ArrayData::F64(
            raw.chunks_exact(8)
                .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        ),
    };
    src.advance(declared);

    Ok(NdArray::from_parts(shape, data))
}

fn need(src: &[u8], n: usize, field: &'static str) -> Result<(), StreamError> {
    if src.len() < n {
        return Err(StreamError::malformed(format!(
            "{field}: record overruns message body ({n} bytes needed, {} left)",
            src.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(array: &NdArray) -> Vec<u8> {
        let mut out = Vec::new();
        write_record(&mut out, "test", array).unwrap();
        out
    }

    #[test]
    fn record_layout() {
        let a = NdArray::from_u16(vec![1, 2], vec![0x0102, 0x0304]).unwrap();
        let bytes = encode(&a);
        assert_eq!(bytes.len(), record_len(&a));
        assert_eq!(bytes[0], DType::U16 as u8);
        assert_eq!(bytes[1], 2);
        assert_eq!(&bytes[2..10], &1u64.to_le_bytes());
        assert_eq!(&bytes[10..18], &2u64.to_le_bytes());
        assert_eq!(&bytes[18..26], &4u64.to_le_bytes());
        assert_eq!(&bytes[26..], &[0x02, 0x01, 0x04, 0x03]);
    }

    #[test]
    fn reads_back_every_dtype() {
        let arrays = [
            NdArray::from_u8(vec![2, 2, 3], (0..12).collect()).unwrap(),
            NdArray::from_u16(vec![3], vec![0, 1, u16::MAX]).unwrap(),
            NdArray::from_f32(vec![1, 3], vec![-1.5, f32::MAX, 0.25]).unwrap(),
            NdArray::from_f64(vec![2, 2], vec![1.0, -0.0, f64::MIN_POSITIVE, 3.5]).unwrap(),
        ];
        let mut body = Vec::new();
        for a in &arrays {
            write_record(&mut body, "test", a).unwrap();
        }
        let mut cursor = &body[..];
        for a in &arrays {
            assert_eq!(&read_record(&mut cursor, "test").unwrap(), a);
        }
        assert!(cursor.is_empty());
    }

    #[test]
    fn nan_bits_survive() {
        let a = NdArray::from_f32(vec![1], vec![f32::NAN]).unwrap();
        let bytes = encode(&a);
        let back = read_record(&mut &bytes[..], "test").unwrap();
        assert_eq!(
            back.as_f32().unwrap()[0].to_bits(),
            f32::NAN.to_bits()
        );
    }

    #[test]
    fn unknown_dtype_tag_is_malformed() {
        let mut bytes = encode(&NdArray::from_u8(vec![1], vec![9]).unwrap());
        bytes[0] = 0x7f;
        let err = read_record(&mut &bytes[..], "rgb").unwrap_err();
        assert!(matches!(err, StreamError::MalformedMessage(_)));
        assert!(err.to_string().contains("rgb"));
    }

    #[test]
    fn inconsistent_byte_length_is_malformed() {
        let mut bytes = encode(&NdArray::from_u16(vec![2], vec![1, 2]).unwrap());
        bytes[10] = 3; // byte_length low byte: 4 -> 3
        assert!(matches!(
            read_record(&mut &bytes[..], "depth"),
            Err(StreamError::MalformedMessage(_))
        ));
    }

    #[test]
    fn zero_dimensions_is_malformed() {
        let mut bytes = encode(&NdArray::from_u8(vec![1], vec![9]).unwrap());
        bytes[1] = 0;
        assert!(read_record(&mut &bytes[..], "rgb").is_err());
    }

    #[test]
    fn overrun_is_malformed() {
        let bytes = encode(&NdArray::from_f64(vec![4, 4], vec![0.0; 16]).unwrap());
        let short = &bytes[..bytes.len() - 1];
        assert!(matches!(
            read_record(&mut &short[..], "transform"),
            Err(StreamError::MalformedMessage(_))
        ));
    }
}
