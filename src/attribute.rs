//! Attribute wrapper: scalar or 1-D metadata attached to a group or a
//! variable, with value coercion between the native storage type and the
//! type a caller asks for.

use std::sync::Arc;

use parking_lot::Mutex;
use paste::paste;
use tracing::warn;

use crate::context::SharedResources;
use crate::errors::{Error, Result};
use crate::store::{AttrTarget, GrpId, NativeType};
use crate::typemap::{build_data_type, create_or_get_type};
use crate::types::{
    copy_value, format_numeric, parse_numeric, DataClass, Element, ExtendedDataType, NumericType,
};

/// Whether signed byte storage under `target` should read as unsigned.
/// Controlled by the conventional `_Unsigned` marker attribute; absence
/// means unsigned.
pub(crate) fn treat_bytes_as_unsigned(shared: &SharedResources, target: AttrTarget) -> bool {
    match shared.store().get_att_text(target, "_Unsigned") {
        Ok(v) => !(v.eq_ignore_ascii_case("false") || v.eq_ignore_ascii_case("no")),
        Err(_) => true,
    }
}

pub struct Attribute {
    shared: Arc<SharedResources>,
    target: AttrTarget,
    name: Mutex<String>,
    native: NativeType,
    /// Element count; 1 for scalars and single-text attributes.
    count: usize,
    rank: usize,
    datatype: Mutex<ExtendedDataType>,
    perfect: bool,
}

impl Attribute {
    /// Open an existing attribute, or `None` when absent.
    pub(crate) fn open(
        shared: &Arc<SharedResources>,
        target: AttrTarget,
        name: &str,
    ) -> Result<Option<Arc<Attribute>>> {
        let _guard = shared.lock();
        let (native, len) = match shared.store().att_info(target, name) {
            Some(info) => info,
            None => return Ok(None),
        };
        let (datatype, perfect, count, rank) = match native {
            // A char attribute is one string whose length is the byte count.
            NativeType::Char => (ExtendedDataType::string_with_max_length(len), true, 1, 0),
            NativeType::Str => (
                ExtendedDataType::string(),
                true,
                len,
                if len > 1 { 1 } else { 0 },
            ),
            other => {
                let unsigned = treat_bytes_as_unsigned(shared, target);
                let mapped = build_data_type(shared.store(), other, unsigned, shared.type_cache())?;
                (mapped.datatype, mapped.perfect, len, if len > 1 { 1 } else { 0 })
            }
        };
        Ok(Some(Arc::new(Attribute {
            shared: Arc::clone(shared),
            target,
            name: Mutex::new(name.to_string()),
            native,
            count,
            rank,
            datatype: Mutex::new(datatype),
            perfect,
        })))
    }

    /// Create an attribute of `length` elements (0 for a scalar) and
    /// materialize it with default content. `owner_group` hosts any user
    /// type the abstract type requires.
    pub(crate) fn new(
        shared: &Arc<SharedResources>,
        target: AttrTarget,
        owner_group: GrpId,
        name: &str,
        length: usize,
        dt: &ExtendedDataType,
    ) -> Result<Arc<Attribute>> {
        if shared.read_only() {
            return Err(Error::ReadOnly);
        }
        if name.is_empty() {
            return Err(Error::invalid("empty attribute name"));
        }
        let count = length.max(1);
        let rank = if length == 0 { 0 } else { 1 };
        let _guard = shared.lock();
        shared.set_define_mode(true)?;
        let store = shared.store();
        let (native, datatype) = match dt.class() {
            DataClass::String => {
                if count == 1 {
                    store.put_att_text(target, name, "")?;
                    (NativeType::Char, ExtendedDataType::string_with_max_length(0))
                } else {
                    store.put_att_strings(target, name, &vec![String::new(); count])?;
                    (NativeType::Str, ExtendedDataType::string())
                }
            }
            DataClass::Numeric | DataClass::Compound => {
                let native = create_or_get_type(store, owner_group, dt)?;
                let esize = store.type_size(native)?;
                store.put_att_raw(target, name, native, count, &vec![0u8; count * esize])?;
                (native, dt.clone())
            }
        };
        Ok(Arc::new(Attribute {
            shared: Arc::clone(shared),
            target,
            name: Mutex::new(name.to_string()),
            native,
            count,
            rank,
            datatype: Mutex::new(datatype),
            perfect: true,
        }))
    }

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub fn data_type(&self) -> ExtendedDataType {
        self.datatype.lock().clone()
    }

    /// Number of elements (1 for scalars).
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 0 for scalar attributes, 1 otherwise.
    pub fn rank(&self) -> usize {
        self.rank
    }

    fn is_string_class(&self) -> bool {
        self.datatype.lock().class() == DataClass::String
    }

    /// Read every element, converted to `dt`. String-class requests must
    /// go through [`Attribute::read_strings`].
    pub fn read(&self, dt: &ExtendedDataType) -> Result<Vec<u8>> {
        if dt.class() == DataClass::String {
            return Err(Error::invalid(
                "byte-oriented read of string data; use read_strings",
            ));
        }
        let _guard = self.shared.lock();
        let name = self.name();
        if self.is_string_class() {
            // Parse text into numbers, element by element.
            let n = dt
                .numeric_type()
                .ok_or_else(|| Error::unsupported("string attribute as compound"))?;
            let texts = self.raw_strings(&name)?;
            let mut out = vec![0u8; texts.len() * n.size()];
            for (i, t) in texts.iter().enumerate() {
                parse_numeric(t, n, &mut out[i * n.size()..(i + 1) * n.size()]);
            }
            return Ok(out);
        }

        let raw = self.shared.store().get_att_raw(self.target, &name)?;
        let esize = self.shared.store().type_size(self.native)?;
        let own = self.data_type();
        let out_size = dt.size();
        let mut out = vec![0u8; self.count * out_size];
        for i in 0..self.count {
            let src = &raw[i * esize..(i + 1) * esize];
            let dst = &mut out[i * out_size..(i + 1) * out_size];
            if !self.perfect && self.native == NativeType::SChar {
                // Signed bytes surface as 16-bit; widen through a staging
                // element.
                let staging = (src[0] as i8 as i16).to_ne_bytes();
                copy_value(
                    &staging,
                    &ExtendedDataType::numeric(NumericType::Int16),
                    dst,
                    dt,
                )?;
            } else {
                copy_value(src, &own, dst, dt)?;
            }
        }
        Ok(out)
    }

    /// Read every element as text. Numeric elements are formatted.
    pub fn read_strings(&self) -> Result<Vec<String>> {
        let _guard = self.shared.lock();
        let name = self.name();
        if self.is_string_class() {
            return self.raw_strings(&name);
        }
        let own = self.data_type();
        let n = match own.numeric_type() {
            Some(n) => n,
            None => return Err(Error::unsupported("compound attribute as string")),
        };
        let raw = self.read(&own)?;
        Ok((0..self.count)
            .map(|i| format_numeric(&raw[i * n.size()..(i + 1) * n.size()], n))
            .collect())
    }

    fn raw_strings(&self, name: &str) -> Result<Vec<String>> {
        match self.native {
            NativeType::Char => Ok(vec![self.shared.store().get_att_text(self.target, name)?]),
            _ => self.shared.store().get_att_strings(self.target, name),
        }
    }

    /// Replace the whole value with `count` elements of type `dt`.
    pub fn write(&self, data: &[u8], dt: &ExtendedDataType) -> Result<()> {
        if self.shared.read_only() {
            return Err(Error::ReadOnly);
        }
        if dt.class() == DataClass::String {
            return Err(Error::invalid(
                "byte-oriented write of string data; use write_strings",
            ));
        }
        if data.len() < self.count * dt.size() {
            return Err(Error::invalid("attribute write buffer too small"));
        }
        let _guard = self.shared.lock();
        self.shared.set_define_mode(true)?;
        let name = self.name();
        if self.is_string_class() {
            let n = dt
                .numeric_type()
                .ok_or_else(|| Error::unsupported("compound value into string attribute"))?;
            let texts: Vec<String> = (0..self.count)
                .map(|i| format_numeric(&data[i * n.size()..(i + 1) * n.size()], n))
                .collect();
            return self.put_strings(&name, &texts);
        }

        let esize = self.shared.store().type_size(self.native)?;
        let own = self.data_type();
        let mut raw = vec![0u8; self.count * esize];
        for i in 0..self.count {
            let src = &data[i * dt.size()..(i + 1) * dt.size()];
            let dst = &mut raw[i * esize..(i + 1) * esize];
            if !self.perfect && self.native == NativeType::SChar {
                let mut staging = [0u8; 2];
                copy_value(
                    src,
                    dt,
                    &mut staging,
                    &ExtendedDataType::numeric(NumericType::Int16),
                )?;
                dst[0] = i16::from_ne_bytes(staging) as i8 as u8;
            } else {
                copy_value(src, dt, dst, &own)?;
            }
        }
        self.shared
            .store()
            .put_att_raw(self.target, &name, self.native, self.count, &raw)
    }

    /// Replace the whole value from text. Numeric attributes parse each
    /// element; unparsable text becomes zero with a warning.
    pub fn write_strings(&self, values: &[String]) -> Result<()> {
        if self.shared.read_only() {
            return Err(Error::ReadOnly);
        }
        if values.len() < self.count {
            return Err(Error::invalid("attribute write needs every element"));
        }
        let _guard = self.shared.lock();
        self.shared.set_define_mode(true)?;
        let name = self.name();
        if self.is_string_class() {
            return self.put_strings(&name, values);
        }
        let own = self.data_type();
        let n = own
            .numeric_type()
            .ok_or_else(|| Error::unsupported("text into compound attribute"))?;
        let esize = self.shared.store().type_size(self.native)?;
        let mut raw = vec![0u8; self.count * esize];
        for (i, v) in values.iter().take(self.count).enumerate() {
            if v.trim().parse::<f64>().is_err() {
                warn!(attribute = %name, value = %v, "unparsable numeric text, storing zero");
            }
            if !self.perfect && self.native == NativeType::SChar {
                let mut staging = [0u8; 2];
                parse_numeric(v, NumericType::Int16, &mut staging);
                raw[i * esize] = i16::from_ne_bytes(staging) as i8 as u8;
            } else {
                parse_numeric(v, n, &mut raw[i * esize..(i + 1) * esize]);
            }
        }
        self.shared
            .store()
            .put_att_raw(self.target, &name, self.native, self.count, &raw)
    }

    fn put_strings(&self, name: &str, values: &[String]) -> Result<()> {
        match self.native {
            NativeType::Char => {
                let text = &values[0];
                self.shared.store().put_att_text(self.target, name, text)?;
                *self.datatype.lock() = ExtendedDataType::string_with_max_length(text.len());
                Ok(())
            }
            _ => self
                .shared
                .store()
                .put_att_strings(self.target, name, &values[..self.count]),
        }
    }

    pub fn rename(&self, new_name: &str) -> Result<()> {
        if self.shared.read_only() {
            return Err(Error::ReadOnly);
        }
        if new_name.is_empty() {
            return Err(Error::invalid("empty name"));
        }
        let _guard = self.shared.lock();
        self.shared.set_define_mode(true)?;
        let mut name = self.name.lock();
        self.shared
            .store()
            .rename_att(self.target, &name, new_name)?;
        *name = new_name.to_string();
        Ok(())
    }

    /// Read the first element as text.
    pub fn read_as_string(&self) -> Result<String> {
        let mut values = self.read_strings()?;
        Ok(values.swap_remove(0))
    }
}

macro_rules! typed_readers {
    ($($rust:ty),* $(,)?) => {
        paste! {
            impl Attribute {
                $(
                    #[doc = concat!("Read the first element as `", stringify!($rust), "`.")]
                    pub fn [<read_as_ $rust>](&self) -> Result<$rust> {
                        let dt = ExtendedDataType::numeric(<$rust as Element>::NUMERIC);
                        let raw = self.read(&dt)?;
                        Ok(<$rust as Element>::read_from(&raw))
                    }

                    #[doc = concat!("Read every element as `", stringify!($rust), "`.")]
                    pub fn [<read_as_ $rust _vec>](&self) -> Result<Vec<$rust>> {
                        let dt = ExtendedDataType::numeric(<$rust as Element>::NUMERIC);
                        let raw = self.read(&dt)?;
                        let size = std::mem::size_of::<$rust>();
                        Ok(raw
                            .chunks_exact(size)
                            .map(<$rust as Element>::read_from)
                            .collect())
                    }
                )*
            }
        }
    };
}

typed_readers!(u8, i16, u16, i32, u32, i64, u64, f32, f64);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memstore::MemStore;

    fn shared() -> Arc<SharedResources> {
        SharedResources::for_created(Box::new(MemStore::new()))
    }

    #[test]
    fn test_create_write_read_numeric() {
        let shared = shared();
        let root = shared.store().root();
        let target = AttrTarget::Group(root);
        let att = Attribute::new(
            &shared,
            target,
            root,
            "scale_factor",
            0,
            &ExtendedDataType::numeric(NumericType::Float64),
        )
        .unwrap();
        att.write(
            &0.25f64.to_ne_bytes(),
            &ExtendedDataType::numeric(NumericType::Float64),
        )
        .unwrap();
        assert_eq!(att.read_as_f64().unwrap(), 0.25);
        // Cross-type read converts.
        assert_eq!(att.read_as_f32().unwrap(), 0.25f32);
        assert_eq!(att.read_as_string().unwrap(), "0.25");
    }

    #[test]
    fn test_text_attribute() {
        let shared = shared();
        let root = shared.store().root();
        let target = AttrTarget::Group(root);
        let att = Attribute::new(
            &shared,
            target,
            root,
            "title",
            0,
            &ExtendedDataType::string(),
        )
        .unwrap();
        att.write_strings(&[String::from("surface temperature")])
            .unwrap();
        assert_eq!(att.read_as_string().unwrap(), "surface temperature");
        assert_eq!(att.data_type().max_string_length(), 19);

        let reopened = Attribute::open(&shared, target, "title").unwrap().unwrap();
        assert_eq!(reopened.read_as_string().unwrap(), "surface temperature");
    }

    #[test]
    fn test_string_to_numeric_coercion() {
        let shared = shared();
        let root = shared.store().root();
        let target = AttrTarget::Group(root);
        shared.store().put_att_text(target, "level", "850").unwrap();
        let att = Attribute::open(&shared, target, "level").unwrap().unwrap();
        assert_eq!(att.read_as_i32().unwrap(), 850);
    }

    #[test]
    fn test_vector_attribute() {
        let shared = shared();
        let root = shared.store().root();
        let target = AttrTarget::Group(root);
        let att = Attribute::new(
            &shared,
            target,
            root,
            "valid_range",
            2,
            &ExtendedDataType::numeric(NumericType::Int32),
        )
        .unwrap();
        let mut data = [0u8; 8];
        (-100i32).write_to(&mut data[..4]);
        100i32.write_to(&mut data[4..]);
        att.write(&data, &ExtendedDataType::numeric(NumericType::Int32))
            .unwrap();
        assert_eq!(att.rank(), 1);
        assert_eq!(att.read_as_i32_vec().unwrap(), vec![-100, 100]);
        assert_eq!(att.read_as_f64_vec().unwrap(), vec![-100.0, 100.0]);
    }

    #[test]
    fn test_signed_byte_widening() {
        let shared = shared();
        let root = shared.store().root();
        let target = AttrTarget::Group(root);
        let store = shared.store();
        store
            .put_att_text(target, "_Unsigned", "false")
            .unwrap();
        store
            .put_att_raw(target, "offset", NativeType::SChar, 1, &[(-5i8) as u8])
            .unwrap();
        let att = Attribute::open(&shared, target, "offset").unwrap().unwrap();
        assert_eq!(
            att.data_type().numeric_type(),
            Some(NumericType::Int16)
        );
        assert_eq!(att.read_as_i16().unwrap(), -5);

        att.write(
            &(-7i16).to_ne_bytes(),
            &ExtendedDataType::numeric(NumericType::Int16),
        )
        .unwrap();
        assert_eq!(att.read_as_i16().unwrap(), -7);
    }

    #[test]
    fn test_rename() {
        let shared = shared();
        let root = shared.store().root();
        let target = AttrTarget::Group(root);
        let att = Attribute::new(
            &shared,
            target,
            root,
            "Conventions",
            0,
            &ExtendedDataType::string(),
        )
        .unwrap();
        att.rename("conventions").unwrap();
        assert_eq!(att.name(), "conventions");
        assert!(Attribute::open(&shared, target, "Conventions")
            .unwrap()
            .is_none());
    }
}
