use crate::errors::{Error, Result};

/// Class of an extended data type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataClass {
    Numeric,
    String,
    Compound,
}

/// The numeric subtypes of the in-memory type system.
///
/// There is deliberately no signed 8-bit entry: the abstract system reserves
/// that width for the unsigned byte, and signed 8-bit native storage is
/// widened to `Int16` by the type mapper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumericType {
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    CInt16,
    CInt32,
    CFloat32,
    CFloat64,
}

impl NumericType {
    /// Size of one element, in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 | Self::CInt16 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 | Self::CInt32 | Self::CFloat32 => 8,
            Self::CFloat64 => 16,
        }
    }

    pub fn is_complex(self) -> bool {
        matches!(
            self,
            Self::CInt16 | Self::CInt32 | Self::CFloat32 | Self::CFloat64
        )
    }

    /// For complex types, the type of the real/imaginary components.
    pub fn component_type(self) -> NumericType {
        match self {
            Self::CInt16 => Self::Int16,
            Self::CInt32 => Self::Int32,
            Self::CFloat32 => Self::Float32,
            Self::CFloat64 => Self::Float64,
            other => other,
        }
    }
}

/// A named, offset sub-field of a compound type.
#[derive(Clone, Debug, PartialEq)]
pub struct Component {
    pub name: String,
    pub offset: usize,
    pub datatype: ExtendedDataType,
}

impl Component {
    pub fn new<S: Into<String>>(name: S, offset: usize, datatype: ExtendedDataType) -> Self {
        Self {
            name: name.into(),
            offset,
            datatype,
        }
    }
}

/// The abstract data type exposed to clients: a numeric type, a string with
/// an optional maximum byte length, or a named compound record.
#[derive(Clone, Debug, PartialEq)]
pub enum ExtendedDataType {
    Numeric(NumericType),
    String {
        /// Maximum byte length, or 0 when unbounded.
        max_length: usize,
    },
    Compound {
        name: String,
        size: usize,
        components: Vec<Component>,
    },
}

impl ExtendedDataType {
    pub fn numeric(t: NumericType) -> Self {
        Self::Numeric(t)
    }

    pub fn string() -> Self {
        Self::String { max_length: 0 }
    }

    pub fn string_with_max_length(max_length: usize) -> Self {
        Self::String { max_length }
    }

    pub fn compound<S: Into<String>>(name: S, size: usize, components: Vec<Component>) -> Self {
        Self::Compound {
            name: name.into(),
            size,
            components,
        }
    }

    pub fn class(&self) -> DataClass {
        match self {
            Self::Numeric(_) => DataClass::Numeric,
            Self::String { .. } => DataClass::String,
            Self::Compound { .. } => DataClass::Compound,
        }
    }

    pub fn numeric_type(&self) -> Option<NumericType> {
        match self {
            Self::Numeric(t) => Some(*t),
            _ => None,
        }
    }

    pub fn max_string_length(&self) -> usize {
        match self {
            Self::String { max_length } => *max_length,
            _ => 0,
        }
    }

    /// Size of one element in a caller buffer, in bytes. Strings have no
    /// in-buffer representation (they travel through the dedicated string
    /// paths) and report 0.
    pub fn size(&self) -> usize {
        match self {
            Self::Numeric(t) => t.size(),
            Self::String { .. } => 0,
            Self::Compound { size, .. } => *size,
        }
    }

    /// Whether every leaf of this type is numeric (strings disqualify).
    pub fn is_fully_numeric(&self) -> bool {
        match self {
            Self::Numeric(_) => true,
            Self::String { .. } => false,
            Self::Compound { components, .. } => {
                components.iter().all(|c| c.datatype.is_fully_numeric())
            }
        }
    }
}

/// A fixed-width primitive that can cross the byte-buffer boundary of the
/// transfer engine. Implemented for the unsigned byte, the 16/32/64-bit
/// integers of both signs, and the two float widths.
pub trait Element: Copy + Default + PartialEq + std::fmt::Debug + 'static {
    const NUMERIC: NumericType;

    fn write_to(self, out: &mut [u8]);
    fn read_from(raw: &[u8]) -> Self;
}

macro_rules! element_impl {
    ($rust:ty, $variant:ident) => {
        impl Element for $rust {
            const NUMERIC: NumericType = NumericType::$variant;

            fn write_to(self, out: &mut [u8]) {
                out[..std::mem::size_of::<$rust>()].copy_from_slice(&self.to_ne_bytes());
            }

            fn read_from(raw: &[u8]) -> Self {
                let mut bytes = [0u8; std::mem::size_of::<$rust>()];
                bytes.copy_from_slice(&raw[..std::mem::size_of::<$rust>()]);
                <$rust>::from_ne_bytes(bytes)
            }
        }
    };
}

element_impl!(u8, UInt8);
element_impl!(i16, Int16);
element_impl!(u16, UInt16);
element_impl!(i32, Int32);
element_impl!(u32, UInt32);
element_impl!(i64, Int64);
element_impl!(u64, UInt64);
element_impl!(f32, Float32);
element_impl!(f64, Float64);

/// Decode one scalar of numeric type `t` from `raw` into an f64.
///
/// Good enough for comparisons and formatting; conversion between elements
/// goes through `copy_numeric` which preserves 64-bit integer exactness.
pub(crate) fn decode_as_f64(raw: &[u8], t: NumericType) -> f64 {
    match t.component_type() {
        NumericType::UInt8 => u8::read_from(raw) as f64,
        NumericType::Int16 => i16::read_from(raw) as f64,
        NumericType::UInt16 => u16::read_from(raw) as f64,
        NumericType::Int32 => i32::read_from(raw) as f64,
        NumericType::UInt32 => u32::read_from(raw) as f64,
        NumericType::Int64 => i64::read_from(raw) as f64,
        NumericType::UInt64 => u64::read_from(raw) as f64,
        NumericType::Float32 => f32::read_from(raw) as f64,
        NumericType::Float64 => f64::read_from(raw),
        _ => unreachable!("component_type never returns a complex type"),
    }
}

macro_rules! cast_to_each {
    ($v:expr, $dst:expr, $out:expr) => {
        match $dst.component_type() {
            NumericType::UInt8 => ($v as u8).write_to($out),
            NumericType::Int16 => ($v as i16).write_to($out),
            NumericType::UInt16 => ($v as u16).write_to($out),
            NumericType::Int32 => ($v as i32).write_to($out),
            NumericType::UInt32 => ($v as u32).write_to($out),
            NumericType::Int64 => ($v as i64).write_to($out),
            NumericType::UInt64 => ($v as u64).write_to($out),
            NumericType::Float32 => ($v as f32).write_to($out),
            NumericType::Float64 => ($v as f64).write_to($out),
            _ => unreachable!(),
        }
    };
}

/// Convert one scalar component between numeric types, `as`-cast semantics.
fn copy_component(src: &[u8], src_t: NumericType, dst: &mut [u8], dst_t: NumericType) {
    macro_rules! dispatch_src {
        ($($variant:ident => $rust:ty),* $(,)?) => {
            match src_t {
                $(
                    NumericType::$variant => {
                        let v = <$rust>::read_from(src);
                        cast_to_each!(v, dst_t, dst)
                    }
                )*
                _ => unreachable!(),
            }
        };
    }
    dispatch_src!(
        UInt8 => u8,
        Int16 => i16,
        UInt16 => u16,
        Int32 => i32,
        UInt32 => u32,
        Int64 => i64,
        UInt64 => u64,
        Float32 => f32,
        Float64 => f64,
    );
}

/// Convert one numeric element between two numeric types.
///
/// Complex sources keep their real and imaginary parts when the destination
/// is complex; a real destination receives the real part; a complex
/// destination built from a real source gets a zero imaginary part.
pub(crate) fn copy_numeric(src: &[u8], src_t: NumericType, dst: &mut [u8], dst_t: NumericType) {
    let sc = src_t.component_type();
    let dc = dst_t.component_type();
    let src_half = sc.size();
    let dst_half = dc.size();
    copy_component(&src[..src_half], sc, &mut dst[..dst_half], dc);
    if dst_t.is_complex() {
        let imag = dst_half..2 * dst_half;
        if src_t.is_complex() {
            copy_component(&src[src_half..2 * src_half], sc, &mut dst[imag], dc);
        } else {
            dst[imag].fill(0);
        }
    }
}

/// Convert one element between two extended data types, writing into `dst`.
///
/// Numeric pairs cast; identical compounds copy bytes; differing compounds
/// are matched component-by-component by name. String types have no byte
/// representation here and are rejected; the string transfer paths never
/// call this.
pub(crate) fn copy_value(
    src: &[u8],
    src_dt: &ExtendedDataType,
    dst: &mut [u8],
    dst_dt: &ExtendedDataType,
) -> Result<()> {
    match (src_dt, dst_dt) {
        (ExtendedDataType::Numeric(s), ExtendedDataType::Numeric(d)) => {
            copy_numeric(src, *s, dst, *d);
            Ok(())
        }
        (
            ExtendedDataType::Compound {
                components: sc,
                size: ssize,
                ..
            },
            ExtendedDataType::Compound {
                components: dc,
                size: dsize,
                ..
            },
        ) => {
            if sc == dc {
                dst[..*dsize].copy_from_slice(&src[..*ssize]);
                return Ok(());
            }
            for d in dc {
                let s = sc.iter().find(|s| s.name == d.name).ok_or_else(|| {
                    Error::unsupported(format!(
                        "compound conversion: no source component named '{}'",
                        d.name
                    ))
                })?;
                copy_value(
                    &src[s.offset..],
                    &s.datatype,
                    &mut dst[d.offset..],
                    &d.datatype,
                )?;
            }
            Ok(())
        }
        _ => Err(Error::unsupported(
            "conversion between these element types is not supported",
        )),
    }
}

/// Format one numeric element as text, for diagnostics and string-typed
/// attribute reads.
pub(crate) fn format_numeric(raw: &[u8], t: NumericType) -> String {
    if t.is_complex() {
        let half = t.component_type().size();
        let re = decode_as_f64(&raw[..half], t.component_type());
        let im = decode_as_f64(&raw[half..2 * half], t.component_type());
        return format!("{}+{}i", re, im);
    }
    match t {
        NumericType::Int64 => i64::read_from(raw).to_string(),
        NumericType::UInt64 => u64::read_from(raw).to_string(),
        NumericType::Float32 => f32::read_from(raw).to_string(),
        NumericType::Float64 => f64::read_from(raw).to_string(),
        _ => {
            let v = decode_as_f64(raw, t);
            (v as i64).to_string()
        }
    }
}

/// Parse text into one numeric element. Unparsable input becomes zero,
/// mirroring the forgiving coercion used for attribute values.
pub(crate) fn parse_numeric(text: &str, t: NumericType, out: &mut [u8]) {
    let v = text.trim().parse::<f64>().unwrap_or(0.0);
    let staged = v.to_ne_bytes();
    copy_numeric(&staged, NumericType::Float64, out, t);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_sizes() {
        assert_eq!(NumericType::UInt8.size(), 1);
        assert_eq!(NumericType::Int16.size(), 2);
        assert_eq!(NumericType::CFloat32.size(), 8);
        assert_eq!(NumericType::CFloat64.size(), 16);
    }

    #[test]
    fn test_copy_numeric_widening() {
        let src = 1234i16.to_ne_bytes();
        let mut dst = [0u8; 8];
        copy_numeric(&src, NumericType::Int16, &mut dst, NumericType::Float64);
        assert_eq!(f64::read_from(&dst), 1234.0);
    }

    #[test]
    fn test_copy_numeric_i64_exact() {
        let v = (1i64 << 60) + 7;
        let src = v.to_ne_bytes();
        let mut dst = [0u8; 8];
        copy_numeric(&src, NumericType::Int64, &mut dst, NumericType::Int64);
        assert_eq!(i64::read_from(&dst), v);
    }

    #[test]
    fn test_copy_numeric_complex() {
        let mut src = [0u8; 8];
        1.5f32.write_to(&mut src[..4]);
        (-2.5f32).write_to(&mut src[4..]);
        let mut dst = [0u8; 16];
        copy_numeric(&src, NumericType::CFloat32, &mut dst, NumericType::CFloat64);
        assert_eq!(f64::read_from(&dst[..8]), 1.5);
        assert_eq!(f64::read_from(&dst[8..]), -2.5);

        let mut real = [0u8; 8];
        copy_numeric(&src, NumericType::CFloat32, &mut real, NumericType::Float64);
        assert_eq!(f64::read_from(&real), 1.5);
    }

    #[test]
    fn test_copy_value_compound_identical() {
        let comps = vec![
            Component::new("real", 0, ExtendedDataType::numeric(NumericType::Float32)),
            Component::new("imag", 4, ExtendedDataType::numeric(NumericType::Float32)),
        ];
        let dt = ExtendedDataType::compound("ComplexFloat32", 8, comps);
        let mut src = [0u8; 8];
        1.0f32.write_to(&mut src[..4]);
        2.0f32.write_to(&mut src[4..]);
        let mut dst = [0u8; 8];
        copy_value(&src, &dt, &mut dst, &dt).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn test_format_parse_numeric() {
        let mut raw = [0u8; 8];
        (-42.5f64).write_to(&mut raw);
        assert_eq!(format_numeric(&raw, NumericType::Float64), "-42.5");

        let mut out = [0u8; 2];
        parse_numeric("17", NumericType::Int16, &mut out);
        assert_eq!(i16::read_from(&out), 17);
    }
}
