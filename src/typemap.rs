//! Mapping between native storage types and the abstract type system.
//!
//! Two directions: `build_data_type` lifts a native type into an
//! [`ExtendedDataType`] (recording whether the match is perfect or a
//! widening), and `create_or_get_type` finds or creates the native type
//! that realizes an abstract one, including the compound types that stand
//! in for complex numbers.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::errors::{Error, Result};
use crate::store::{GrpId, NativeType, StorageFormat, Store, UserTypeClass, UserTypeId};
use crate::types::{Component, ExtendedDataType, NumericType};

/// Result of lifting a native type. A non-perfect match means elements are
/// widened on read and the bulk write fast path must be skipped.
#[derive(Clone, Debug)]
pub(crate) struct MappedType {
    pub datatype: ExtendedDataType,
    pub perfect: bool,
}

impl MappedType {
    fn perfect(datatype: ExtendedDataType) -> Self {
        MappedType {
            datatype,
            perfect: true,
        }
    }
}

/// Memoized compound lookups, keyed by type name. Compound introspection
/// walks every field through the store, so repeated lifts of the same type
/// are worth short-circuiting.
#[derive(Default)]
pub(crate) struct TypeCache {
    map: Mutex<HashMap<String, MappedType>>,
}

impl TypeCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

/// Lift a native type into the abstract type system.
///
/// `treat_as_unsigned` carries the `_Unsigned` marker attribute of the
/// owning variable for signed byte storage: the abstract system has no
/// signed 8-bit type, so signed bytes map to the unsigned byte unless the
/// marker explicitly says the data really is signed, in which case they
/// widen to 16-bit.
pub(crate) fn build_data_type(
    store: &dyn Store,
    t: NativeType,
    treat_as_unsigned: bool,
    cache: &TypeCache,
) -> Result<MappedType> {
    let simple = |n| Ok(MappedType::perfect(ExtendedDataType::numeric(n)));
    match t {
        NativeType::SChar => {
            if treat_as_unsigned {
                simple(NumericType::UInt8)
            } else {
                Ok(MappedType {
                    datatype: ExtendedDataType::numeric(NumericType::Int16),
                    perfect: false,
                })
            }
        }
        NativeType::UChar => simple(NumericType::UInt8),
        NativeType::Short => simple(NumericType::Int16),
        NativeType::UShort => simple(NumericType::UInt16),
        NativeType::Int => simple(NumericType::Int32),
        NativeType::UInt => simple(NumericType::UInt32),
        NativeType::Int64 => simple(NumericType::Int64),
        NativeType::UInt64 => simple(NumericType::UInt64),
        NativeType::Float => simple(NumericType::Float32),
        NativeType::Double => simple(NumericType::Float64),
        NativeType::Char => Ok(MappedType::perfect(ExtendedDataType::string())),
        NativeType::Str => Ok(MappedType::perfect(ExtendedDataType::string())),
        NativeType::User(id) => build_user_type(store, id, cache),
    }
}

fn build_user_type(store: &dyn Store, id: UserTypeId, cache: &TypeCache) -> Result<MappedType> {
    let info = store.user_type_info(id)?;
    if let Some(hit) = cache.map.lock().get(&info.name) {
        return Ok(hit.clone());
    }
    let mapped = match info.class {
        UserTypeClass::Compound => {
            if let Some(n) = complex_numeric(store, id, &info.name, info.field_count)? {
                MappedType::perfect(ExtendedDataType::numeric(n))
            } else {
                let mut components = Vec::with_capacity(info.field_count);
                for i in 0..info.field_count {
                    let field = store.compound_field(id, i)?;
                    if field.rank != 0 {
                        return Err(Error::unsupported(format!(
                            "compound type '{}': array field '{}'",
                            info.name, field.name
                        )));
                    }
                    let sub = build_data_type(store, field.datatype, true, cache)?;
                    if !sub.perfect || sub.datatype.class() != crate::types::DataClass::Numeric {
                        return Err(Error::unsupported(format!(
                            "compound type '{}': field '{}' has no exact numeric mapping",
                            info.name, field.name
                        )));
                    }
                    components.push(Component::new(field.name, field.offset, sub.datatype));
                }
                MappedType::perfect(ExtendedDataType::compound(
                    info.name.clone(),
                    info.size,
                    components,
                ))
            }
        }
        UserTypeClass::Enum => {
            let base = info
                .base
                .ok_or_else(|| Error::store("enumeration without a base type"))?;
            build_data_type(store, base, true, cache)?
        }
        UserTypeClass::Vlen => {
            return Err(Error::unsupported(format!(
                "variable-length type '{}'",
                info.name
            )))
        }
        UserTypeClass::Opaque => {
            return Err(Error::unsupported(format!("opaque type '{}'", info.name)))
        }
    };
    cache.map.lock().insert(info.name, mapped.clone());
    Ok(mapped)
}

/// Recognize the conventional two-field compound encoding of a complex
/// number: a name starting with "complex" and two identically-typed fields
/// laid out back to back.
fn complex_numeric(
    store: &dyn Store,
    id: UserTypeId,
    name: &str,
    field_count: usize,
) -> Result<Option<NumericType>> {
    if field_count != 2 || !name.to_ascii_lowercase().starts_with("complex") {
        return Ok(None);
    }
    let first = store.compound_field(id, 0)?;
    let second = store.compound_field(id, 1)?;
    if first.datatype != second.datatype || first.rank != 0 || second.rank != 0 {
        return Ok(None);
    }
    let n = match first.datatype {
        NativeType::Short => NumericType::CInt16,
        NativeType::Int => NumericType::CInt32,
        NativeType::Float => NumericType::CFloat32,
        NativeType::Double => NumericType::CFloat64,
        _ => return Ok(None),
    };
    let half = n.component_type().size();
    if first.offset != 0 || second.offset != half {
        return Ok(None);
    }
    Ok(Some(n))
}

/// Find or create the native type realizing an abstract one, for variable
/// and attribute creation in group `g`.
///
/// Complex types become two-field compounds named after the component
/// width; general compounds are created field by field under their own
/// name. Classic-model formats reject the types they cannot express.
pub(crate) fn create_or_get_type(
    store: &dyn Store,
    g: GrpId,
    dt: &ExtendedDataType,
) -> Result<NativeType> {
    let format = store.format();
    let extended = matches!(format, StorageFormat::V4 | StorageFormat::Cdf5);
    match dt {
        ExtendedDataType::Numeric(n) => match n {
            NumericType::UInt8 => {
                if format == StorageFormat::V4 {
                    Ok(NativeType::UChar)
                } else {
                    // Classic models spell unsigned bytes as signed storage
                    // plus an _Unsigned marker, written by the caller.
                    Ok(NativeType::SChar)
                }
            }
            NumericType::Int16 => Ok(NativeType::Short),
            NumericType::Int32 => Ok(NativeType::Int),
            NumericType::Float32 => Ok(NativeType::Float),
            NumericType::Float64 => Ok(NativeType::Double),
            NumericType::UInt16 if extended => Ok(NativeType::UShort),
            NumericType::UInt32 if extended => Ok(NativeType::UInt),
            NumericType::Int64 if extended => Ok(NativeType::Int64),
            NumericType::UInt64 if extended => Ok(NativeType::UInt64),
            NumericType::UInt16 | NumericType::UInt32 | NumericType::Int64
            | NumericType::UInt64 => Err(Error::unsupported(format!(
                "{:?} cannot be stored in the {} format",
                n,
                format.structural_name()
            ))),
            NumericType::CInt16 => create_or_get_complex(store, g, "ComplexInt16", NativeType::Short),
            NumericType::CInt32 => create_or_get_complex(store, g, "ComplexInt32", NativeType::Int),
            NumericType::CFloat32 => {
                create_or_get_complex(store, g, "ComplexFloat32", NativeType::Float)
            }
            NumericType::CFloat64 => {
                create_or_get_complex(store, g, "ComplexFloat64", NativeType::Double)
            }
        },
        ExtendedDataType::String { .. } => {
            if format == StorageFormat::V4 {
                Ok(NativeType::Str)
            } else {
                Err(Error::unsupported(
                    "variable-length strings require the v4-native format",
                ))
            }
        }
        ExtendedDataType::Compound {
            name,
            size,
            components,
        } => {
            if format != StorageFormat::V4 {
                return Err(Error::unsupported(
                    "compound types require the v4-native format",
                ));
            }
            if let Some(existing) = store.type_id_by_name(g, name) {
                let info = store.user_type_info(existing)?;
                if info.class != UserTypeClass::Compound
                    || info.size != *size
                    || info.field_count != components.len()
                {
                    return Err(Error::invalid(format!(
                        "a different type named '{}' already exists",
                        name
                    )));
                }
                return Ok(NativeType::User(existing));
            }
            let id = store.def_compound(g, name, *size)?;
            for c in components {
                let field = create_or_get_type(store, g, &c.datatype)?;
                store.insert_compound_field(id, &c.name, c.offset, field)?;
            }
            Ok(NativeType::User(id))
        }
    }
}

fn create_or_get_complex(
    store: &dyn Store,
    g: GrpId,
    name: &str,
    component: NativeType,
) -> Result<NativeType> {
    if store.format() != StorageFormat::V4 {
        return Err(Error::unsupported(
            "complex types require the v4-native format",
        ));
    }
    if let Some(existing) = store.type_id_by_name(g, name) {
        return Ok(NativeType::User(existing));
    }
    let half = component
        .builtin_size()
        .ok_or_else(|| Error::store("complex component must be a builtin type"))?;
    let id = store.def_compound(g, name, 2 * half)?;
    store.insert_compound_field(id, "real", 0, component)?;
    store.insert_compound_field(id, "imag", half, component)?;
    Ok(NativeType::User(id))
}

/// Default fill value of a native type, in native bytes. `None` for
/// strings and user-defined types.
pub(crate) fn default_fill_value(t: NativeType) -> Option<Vec<u8>> {
    match t {
        NativeType::SChar => Some((-127i8).to_ne_bytes().to_vec()),
        NativeType::Char => Some(vec![0]),
        NativeType::UChar => Some(vec![255]),
        NativeType::Short => Some((-32767i16).to_ne_bytes().to_vec()),
        NativeType::UShort => Some(65535u16.to_ne_bytes().to_vec()),
        NativeType::Int => Some((-2147483647i32).to_ne_bytes().to_vec()),
        NativeType::UInt => Some(4294967295u32.to_ne_bytes().to_vec()),
        NativeType::Int64 => Some((-9223372036854775806i64).to_ne_bytes().to_vec()),
        NativeType::UInt64 => Some(18446744073709551614u64.to_ne_bytes().to_vec()),
        NativeType::Float => Some(9.96921e+36f32.to_ne_bytes().to_vec()),
        NativeType::Double => Some(9.969209968386869e+36f64.to_ne_bytes().to_vec()),
        NativeType::Str | NativeType::User(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memstore::MemStore;
    use crate::types::DataClass;

    #[test]
    fn test_simple_lifts() {
        let store = MemStore::new();
        let cache = TypeCache::new();
        let m = build_data_type(&store, NativeType::Double, true, &cache).unwrap();
        assert!(m.perfect);
        assert_eq!(m.datatype.numeric_type(), Some(NumericType::Float64));

        let m = build_data_type(&store, NativeType::Int64, true, &cache).unwrap();
        assert!(m.perfect);
        assert_eq!(m.datatype.numeric_type(), Some(NumericType::Int64));
    }

    #[test]
    fn test_signed_byte_polarity() {
        let store = MemStore::new();
        let cache = TypeCache::new();
        let m = build_data_type(&store, NativeType::SChar, true, &cache).unwrap();
        assert!(m.perfect);
        assert_eq!(m.datatype.numeric_type(), Some(NumericType::UInt8));

        let m = build_data_type(&store, NativeType::SChar, false, &cache).unwrap();
        assert!(!m.perfect);
        assert_eq!(m.datatype.numeric_type(), Some(NumericType::Int16));
    }

    #[test]
    fn test_complex_round_trip() {
        let store = MemStore::new();
        let root = store.root();
        let cache = TypeCache::new();
        let native = create_or_get_type(
            &store,
            root,
            &ExtendedDataType::numeric(NumericType::CFloat32),
        )
        .unwrap();
        let m = build_data_type(&store, native, true, &cache).unwrap();
        assert!(m.perfect);
        assert_eq!(m.datatype.numeric_type(), Some(NumericType::CFloat32));

        // A second request reuses the existing type.
        let again = create_or_get_type(
            &store,
            root,
            &ExtendedDataType::numeric(NumericType::CFloat32),
        )
        .unwrap();
        assert_eq!(again, native);
    }

    #[test]
    fn test_general_compound_round_trip() {
        let store = MemStore::new();
        let root = store.root();
        let cache = TypeCache::new();
        let dt = ExtendedDataType::compound(
            "Sample",
            12,
            vec![
                Component::new("count", 0, ExtendedDataType::numeric(NumericType::Int32)),
                Component::new("mean", 4, ExtendedDataType::numeric(NumericType::Float64)),
            ],
        );
        let native = create_or_get_type(&store, root, &dt).unwrap();
        let m = build_data_type(&store, native, true, &cache).unwrap();
        assert!(m.perfect);
        assert_eq!(m.datatype.class(), DataClass::Compound);
        assert_eq!(m.datatype, dt);
    }

    #[test]
    fn test_classic_rejects_unsigned() {
        let store = MemStore::with_format(StorageFormat::Classic);
        let root = store.root();
        let r = create_or_get_type(&store, root, &ExtendedDataType::numeric(NumericType::UInt32));
        assert!(matches!(r, Err(Error::NotSupported(_))));

        // The unsigned byte falls back to signed storage.
        let n = create_or_get_type(&store, root, &ExtendedDataType::numeric(NumericType::UInt8))
            .unwrap();
        assert_eq!(n, NativeType::SChar);
    }
}
