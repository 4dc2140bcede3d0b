use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use num_complex::Complex64;
use serde_json::Value;

use crate::data_type::{ByteOrder, DataType, ScalarKind, ScalarType};

/// The scalar substituted for chunks that are absent from the store.
///
/// `Undefined` corresponds to JSON `null`: reads of uninitialized regions
/// have no contractual value, but this implementation materializes them as
/// zero bytes so results are stable within a process run.
#[derive(Debug, Clone, PartialEq)]
pub enum FillValue {
    Undefined,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Complex(Complex64),
    /// `S*` and `V*` kinds; shorter than the item size means zero-padded.
    Bytes(Vec<u8>),
    /// `U*` kinds; stored as UTF-32 in the dtype's byte order.
    Str(String),
    /// Structured records, in field order.
    Record(Vec<FillValue>),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FillValueError {
    #[error("fill value {value} does not match dtype `{dtype}`")]
    TypeMismatch { dtype: String, value: String },
    #[error("fill value {value} is out of range for dtype `{dtype}`")]
    OutOfRange { dtype: String, value: String },
    #[error("fill value is not valid base64: {0}")]
    BadBase64(String),
    #[error("fill value needs {actual} bytes but dtype `{dtype}` holds {max}")]
    TooLong {
        dtype: String,
        actual: usize,
        max: usize,
    },
    #[error("unicode dtype `{0}` must have a size divisible by 4 to carry a fill value")]
    BadUnicodeSize(String),
    #[error("record fill value must be an object with exactly the record's field names")]
    BadRecord,
}

fn float_from_json(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

fn float_to_json(f: f64) -> Value {
    if f.is_nan() {
        Value::from("NaN")
    } else if f == f64::INFINITY {
        Value::from("Infinity")
    } else if f == f64::NEG_INFINITY {
        Value::from("-Infinity")
    } else {
        Value::from(f)
    }
}

fn int_in_range(i: i64, size: usize) -> bool {
    match size {
        1 => i64::from(i8::MIN) <= i && i <= i64::from(i8::MAX),
        2 => i64::from(i16::MIN) <= i && i <= i64::from(i16::MAX),
        4 => i64::from(i32::MIN) <= i && i <= i64::from(i32::MAX),
        _ => true,
    }
}

fn uint_in_range(u: u64, size: usize) -> bool {
    match size {
        1 => u <= u64::from(u8::MAX),
        2 => u <= u64::from(u16::MAX),
        4 => u <= u64::from(u32::MAX),
        _ => true,
    }
}

fn write_int(out: &mut Vec<u8>, v: i64, size: usize, order: ByteOrder) {
    let mut buf = [0u8; 8];
    let big = matches!(order, ByteOrder::Big);
    match size {
        1 => {
            out.push(v as i8 as u8);
            return;
        }
        2 => {
            if big {
                BigEndian::write_i16(&mut buf[..2], v as i16);
            } else {
                LittleEndian::write_i16(&mut buf[..2], v as i16);
            }
        }
        4 => {
            if big {
                BigEndian::write_i32(&mut buf[..4], v as i32);
            } else {
                LittleEndian::write_i32(&mut buf[..4], v as i32);
            }
        }
        _ => {
            if big {
                BigEndian::write_i64(&mut buf, v);
            } else {
                LittleEndian::write_i64(&mut buf, v);
            }
        }
    }
    out.extend_from_slice(&buf[..size]);
}

fn write_uint(out: &mut Vec<u8>, v: u64, size: usize, order: ByteOrder) {
    let mut buf = [0u8; 8];
    let big = matches!(order, ByteOrder::Big);
    match size {
        1 => {
            out.push(v as u8);
            return;
        }
        2 => {
            if big {
                BigEndian::write_u16(&mut buf[..2], v as u16);
            } else {
                LittleEndian::write_u16(&mut buf[..2], v as u16);
            }
        }
        4 => {
            if big {
                BigEndian::write_u32(&mut buf[..4], v as u32);
            } else {
                LittleEndian::write_u32(&mut buf[..4], v as u32);
            }
        }
        _ => {
            if big {
                BigEndian::write_u64(&mut buf, v);
            } else {
                LittleEndian::write_u64(&mut buf, v);
            }
        }
    }
    out.extend_from_slice(&buf[..size]);
}

fn write_float(out: &mut Vec<u8>, v: f64, size: usize, order: ByteOrder) {
    let big = matches!(order, ByteOrder::Big);
    match size {
        2 => {
            let h = half::f16::from_f64(v);
            let bytes = if big { h.to_be_bytes() } else { h.to_le_bytes() };
            out.extend_from_slice(&bytes);
        }
        4 => {
            let mut buf = [0u8; 4];
            if big {
                BigEndian::write_f32(&mut buf, v as f32);
            } else {
                LittleEndian::write_f32(&mut buf, v as f32);
            }
            out.extend_from_slice(&buf);
        }
        _ => {
            let mut buf = [0u8; 8];
            if big {
                BigEndian::write_f64(&mut buf, v);
            } else {
                LittleEndian::write_f64(&mut buf, v);
            }
            out.extend_from_slice(&buf);
        }
    }
}

impl FillValue {
    pub fn is_defined(&self) -> bool {
        !matches!(self, Self::Undefined)
    }

    /// Decode the `fill_value` JSON of a `.zarray` document against its dtype.
    pub fn from_json(dtype: &DataType, value: &Value) -> Result<Self, FillValueError> {
        if value.is_null() {
            return Ok(Self::Undefined);
        }
        match dtype {
            DataType::Scalar(st) => Self::scalar_from_json(st, value),
            DataType::Structured(fields) => {
                let obj = value.as_object().ok_or(FillValueError::BadRecord)?;
                if obj.len() != fields.len() {
                    return Err(FillValueError::BadRecord);
                }
                let mut values = Vec::with_capacity(fields.len());
                for field in fields {
                    let v = obj.get(&field.name).ok_or(FillValueError::BadRecord)?;
                    values.push(Self::scalar_from_json(&field.dtype, v)?);
                }
                Ok(Self::Record(values))
            }
        }
    }

    fn scalar_from_json(st: &ScalarType, value: &Value) -> Result<Self, FillValueError> {
        let mismatch = || FillValueError::TypeMismatch {
            dtype: st.to_string(),
            value: value.to_string(),
        };
        match st.kind {
            ScalarKind::Bool => value.as_bool().map(Self::Bool).ok_or_else(mismatch),
            ScalarKind::Int | ScalarKind::TimeDelta | ScalarKind::DateTime => {
                let i = value.as_i64().ok_or_else(mismatch)?;
                if !int_in_range(i, st.size) {
                    return Err(FillValueError::OutOfRange {
                        dtype: st.to_string(),
                        value: value.to_string(),
                    });
                }
                Ok(Self::Int(i))
            }
            ScalarKind::UInt => {
                let u = value.as_u64().ok_or_else(mismatch)?;
                if !uint_in_range(u, st.size) {
                    return Err(FillValueError::OutOfRange {
                        dtype: st.to_string(),
                        value: value.to_string(),
                    });
                }
                Ok(Self::UInt(u))
            }
            ScalarKind::Float => float_from_json(value).map(Self::Float).ok_or_else(mismatch),
            ScalarKind::Complex => {
                let parts = value
                    .as_array()
                    .filter(|a| a.len() == 2)
                    .ok_or_else(mismatch)?;
                let re = float_from_json(&parts[0]).ok_or_else(mismatch)?;
                let im = float_from_json(&parts[1]).ok_or_else(mismatch)?;
                Ok(Self::Complex(Complex64::new(re, im)))
            }
            ScalarKind::ByteStr | ScalarKind::Void => {
                let s = value.as_str().ok_or_else(mismatch)?;
                let bytes = BASE64
                    .decode(s)
                    .map_err(|e| FillValueError::BadBase64(e.to_string()))?;
                if bytes.len() > st.size {
                    return Err(FillValueError::TooLong {
                        dtype: st.to_string(),
                        actual: bytes.len(),
                        max: st.size,
                    });
                }
                Ok(Self::Bytes(bytes))
            }
            ScalarKind::UnicodeStr => {
                let s = value.as_str().ok_or_else(mismatch)?;
                if st.size % 4 != 0 {
                    return Err(FillValueError::BadUnicodeSize(st.to_string()));
                }
                let needed = s.chars().count() * 4;
                if needed > st.size {
                    return Err(FillValueError::TooLong {
                        dtype: st.to_string(),
                        actual: needed,
                        max: st.size,
                    });
                }
                Ok(Self::Str(s.to_owned()))
            }
        }
    }

    /// Encode back into `.zarray` JSON; the exact inverse of [`Self::from_json`].
    pub fn to_json(&self, dtype: &DataType) -> Result<Value, FillValueError> {
        match (self, dtype) {
            (Self::Undefined, _) => Ok(Value::Null),
            (_, DataType::Scalar(st)) => self.scalar_to_json(st),
            (Self::Record(values), DataType::Structured(fields)) => {
                if values.len() != fields.len() {
                    return Err(FillValueError::BadRecord);
                }
                let mut map = serde_json::Map::new();
                for (field, value) in fields.iter().zip(values) {
                    map.insert(field.name.clone(), value.scalar_to_json(&field.dtype)?);
                }
                Ok(Value::Object(map))
            }
            (_, DataType::Structured(_)) => Err(FillValueError::BadRecord),
        }
    }

    fn scalar_to_json(&self, st: &ScalarType) -> Result<Value, FillValueError> {
        let mismatch = || FillValueError::TypeMismatch {
            dtype: st.to_string(),
            value: format!("{self:?}"),
        };
        match (self, st.kind) {
            (Self::Bool(b), ScalarKind::Bool) => Ok(Value::from(*b)),
            (Self::Int(i), ScalarKind::Int | ScalarKind::TimeDelta | ScalarKind::DateTime) => {
                Ok(Value::from(*i))
            }
            (Self::UInt(u), ScalarKind::UInt) => Ok(Value::from(*u)),
            (Self::Float(f), ScalarKind::Float) => Ok(float_to_json(*f)),
            (Self::Complex(c), ScalarKind::Complex) => {
                Ok(Value::Array(vec![float_to_json(c.re), float_to_json(c.im)]))
            }
            (Self::Bytes(b), ScalarKind::ByteStr | ScalarKind::Void) => {
                Ok(Value::from(BASE64.encode(b)))
            }
            (Self::Str(s), ScalarKind::UnicodeStr) => Ok(Value::from(s.clone())),
            _ => Err(mismatch()),
        }
    }

    /// The item-size binary pattern of this fill value, honoring the dtype's
    /// byte order. Tiling it across a chunk buffer materializes an
    /// uninitialized chunk.
    pub fn to_item_bytes(&self, dtype: &DataType) -> Result<Vec<u8>, FillValueError> {
        let mut out = Vec::with_capacity(dtype.item_size());
        match (self, dtype) {
            (Self::Undefined, _) => out.resize(dtype.item_size(), 0),
            (_, DataType::Scalar(st)) => self.write_scalar_bytes(st, &mut out)?,
            (Self::Record(values), DataType::Structured(fields)) => {
                if values.len() != fields.len() {
                    return Err(FillValueError::BadRecord);
                }
                for (field, value) in fields.iter().zip(values) {
                    value.write_scalar_bytes(&field.dtype, &mut out)?;
                }
            }
            (_, DataType::Structured(_)) => return Err(FillValueError::BadRecord),
        }
        debug_assert_eq!(out.len(), dtype.item_size());
        Ok(out)
    }

    fn write_scalar_bytes(&self, st: &ScalarType, out: &mut Vec<u8>) -> Result<(), FillValueError> {
        let mismatch = || FillValueError::TypeMismatch {
            dtype: st.to_string(),
            value: format!("{self:?}"),
        };
        let start = out.len();
        match (self, st.kind) {
            (Self::Undefined, _) => {}
            (Self::Bool(b), ScalarKind::Bool) => out.push(u8::from(*b)),
            (Self::Int(i), ScalarKind::Int | ScalarKind::TimeDelta | ScalarKind::DateTime) => {
                write_int(out, *i, st.size, st.order)
            }
            (Self::UInt(u), ScalarKind::UInt) => write_uint(out, *u, st.size, st.order),
            (Self::Float(f), ScalarKind::Float) => write_float(out, *f, st.size, st.order),
            (Self::Complex(c), ScalarKind::Complex) => {
                write_float(out, c.re, st.size / 2, st.order);
                write_float(out, c.im, st.size / 2, st.order);
            }
            (Self::Bytes(b), ScalarKind::ByteStr | ScalarKind::Void) => {
                if b.len() > st.size {
                    return Err(FillValueError::TooLong {
                        dtype: st.to_string(),
                        actual: b.len(),
                        max: st.size,
                    });
                }
                out.extend_from_slice(b);
            }
            (Self::Str(s), ScalarKind::UnicodeStr) => {
                if s.chars().count() * 4 > st.size {
                    return Err(FillValueError::TooLong {
                        dtype: st.to_string(),
                        actual: s.chars().count() * 4,
                        max: st.size,
                    });
                }
                for ch in s.chars() {
                    write_uint(out, u64::from(u32::from(ch)), 4, st.order);
                }
            }
            _ => return Err(mismatch()),
        }
        out.resize(start + st.size, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dtype(s: &str) -> DataType {
        DataType::Scalar(s.parse().unwrap())
    }

    #[test]
    fn nan_sentinel_roundtrips() {
        let dt = dtype("<f8");
        let fv = FillValue::from_json(&dt, &json!("NaN")).unwrap();
        match fv {
            FillValue::Float(f) => assert!(f.is_nan()),
            other => panic!("expected float, got {other:?}"),
        }
        assert_eq!(fv.to_json(&dt).unwrap(), json!("NaN"));
    }

    #[test]
    fn infinity_sentinels_roundtrip() {
        let dt = dtype("<f4");
        for (json_in, expected) in [
            (json!("Infinity"), f64::INFINITY),
            (json!("-Infinity"), f64::NEG_INFINITY),
        ] {
            let fv = FillValue::from_json(&dt, &json_in).unwrap();
            assert_eq!(fv, FillValue::Float(expected));
            assert_eq!(fv.to_json(&dt).unwrap(), json_in);
        }
    }

    #[test]
    fn finite_floats_stay_numbers() {
        let dt = dtype("<f8");
        let fv = FillValue::from_json(&dt, &json!(2.5)).unwrap();
        assert_eq!(fv, FillValue::Float(2.5));
        assert_eq!(fv.to_json(&dt).unwrap(), json!(2.5));
    }

    #[test]
    fn null_means_undefined() {
        let dt = dtype("<i4");
        let fv = FillValue::from_json(&dt, &Value::Null).unwrap();
        assert_eq!(fv, FillValue::Undefined);
        assert_eq!(fv.to_json(&dt).unwrap(), Value::Null);
        assert_eq!(fv.to_item_bytes(&dt).unwrap(), vec![0; 4]);
    }

    #[test]
    fn int_range_checks() {
        assert!(FillValue::from_json(&dtype("<i1"), &json!(127)).is_ok());
        assert!(matches!(
            FillValue::from_json(&dtype("<i1"), &json!(128)),
            Err(FillValueError::OutOfRange { .. })
        ));
        assert!(matches!(
            FillValue::from_json(&dtype("<u2"), &json!(-1)),
            Err(FillValueError::TypeMismatch { .. })
        ));
        assert!(matches!(
            FillValue::from_json(&dtype("<u1"), &json!(256)),
            Err(FillValueError::OutOfRange { .. })
        ));
    }

    #[test]
    fn type_shape_mismatches_rejected() {
        assert!(FillValue::from_json(&dtype("<i4"), &json!("7")).is_err());
        assert!(FillValue::from_json(&dtype("|b1"), &json!(1)).is_err());
        assert!(FillValue::from_json(&dtype("<f8"), &json!("nan")).is_err());
        assert!(FillValue::from_json(&dtype("<c16"), &json!([1.0])).is_err());
    }

    #[test]
    fn bytes_roundtrip_base64() {
        let dt = dtype("|S4");
        let fv = FillValue::from_json(&dt, &json!("AAEC")).unwrap();
        assert_eq!(fv, FillValue::Bytes(vec![0, 1, 2]));
        assert_eq!(fv.to_json(&dt).unwrap(), json!("AAEC"));
        // short values are zero-padded out to the item size
        assert_eq!(fv.to_item_bytes(&dt).unwrap(), vec![0, 1, 2, 0]);
        assert!(FillValue::from_json(&dt, &json!("not base64!")).is_err());
        assert!(matches!(
            FillValue::from_json(&dtype("|S2"), &json!("AAECAw==")),
            Err(FillValueError::TooLong { .. })
        ));
    }

    #[test]
    fn unicode_fill_encodes_utf32() {
        let dt = dtype("<U3");
        assert!(matches!(
            FillValue::from_json(&dt, &json!("ab")),
            Err(FillValueError::BadUnicodeSize(_))
        ));

        let dt = dtype("<U12");
        let fv = FillValue::from_json(&dt, &json!("ab")).unwrap();
        assert_eq!(
            fv.to_item_bytes(&dt).unwrap(),
            vec![b'a', 0, 0, 0, b'b', 0, 0, 0, 0, 0, 0, 0]
        );
        assert!(FillValue::from_json(&dt, &json!("abcd")).is_err());
    }

    #[test]
    fn complex_pair_roundtrips() {
        let dt = dtype("<c16");
        let fv = FillValue::from_json(&dt, &json!([1.5, "NaN"])).unwrap();
        match fv {
            FillValue::Complex(c) => {
                assert_eq!(c.re, 1.5);
                assert!(c.im.is_nan());
            }
            other => panic!("expected complex, got {other:?}"),
        }
        assert_eq!(fv.to_json(&dt).unwrap(), json!([1.5, "NaN"]));
    }

    #[test]
    fn record_fill_roundtrips() {
        let dt: DataType = serde_json::from_str(r#"[["x","<u2"],["y","<f4"]]"#).unwrap();
        let fv = FillValue::from_json(&dt, &json!({"x": 7, "y": 0.5})).unwrap();
        assert_eq!(
            fv,
            FillValue::Record(vec![FillValue::UInt(7), FillValue::Float(0.5)])
        );
        assert_eq!(fv.to_json(&dt).unwrap(), json!({"x": 7, "y": 0.5}));
        let bytes = fv.to_item_bytes(&dt).unwrap();
        assert_eq!(&bytes[..2], &[7, 0]);
        assert_eq!(&bytes[2..], &0.5f32.to_le_bytes());

        assert!(FillValue::from_json(&dt, &json!({"x": 7})).is_err());
        assert!(FillValue::from_json(&dt, &json!({"x": 7, "z": 1})).is_err());
    }

    #[test]
    fn binary_patterns_respect_byte_order() {
        let le = FillValue::Int(0x0102)
            .to_item_bytes(&dtype("<i4"))
            .unwrap();
        assert_eq!(le, vec![2, 1, 0, 0]);
        let be = FillValue::Int(0x0102)
            .to_item_bytes(&dtype(">i4"))
            .unwrap();
        assert_eq!(be, vec![0, 0, 1, 2]);

        let nan = FillValue::Float(f64::NAN)
            .to_item_bytes(&dtype("<f8"))
            .unwrap();
        assert_eq!(nan, f64::NAN.to_le_bytes());

        let h = FillValue::Float(1.0).to_item_bytes(&dtype("<f2")).unwrap();
        assert_eq!(h, half::f16::from_f64(1.0).to_le_bytes());
    }
}
