//! Variable wrapper and the N-dimensional transfer engine.
//!
//! A read or write request carries, per logical dimension, a starting
//! index, an element count, a signed step through the array, and a signed
//! element stride through the caller buffer. The engine picks the cheapest
//! native access path the request shape allows: one bulk contiguous call,
//! one strided mapped call, or a per-element traversal that also performs
//! type conversion. The per-element traversal is iterative, driven by an
//! explicit odometer over the dimensions, so rank never translates into
//! call-stack depth.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::{ArrayD, IxDyn};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::attribute::{treat_bytes_as_unsigned, Attribute};
use crate::context::SharedResources;
use crate::dimension::Dimension;
use crate::errors::{Error, Result};
use crate::group::group_full_name;
use crate::memstore::MemStore;
use crate::options::OptionList;
use crate::store::{AttrTarget, DimId, GrpId, NativeType, VarId};
use crate::typemap::{build_data_type, create_or_get_type, default_fill_value, MappedType};
use crate::types::{
    copy_value, decode_as_f64, format_numeric, parse_numeric, DataClass, Element,
    ExtendedDataType, NumericType,
};

/// A region materialized by an advise-read call, held as a variable over a
/// private in-memory store.
struct CachedRegion {
    variable: Arc<Variable>,
    start: Vec<u64>,
    count: Vec<usize>,
}

pub struct Variable {
    shared: Arc<SharedResources>,
    id: VarId,
    group: GrpId,
    native: NativeType,
    store_dims: Vec<DimId>,
    /// Fixed string width when a 2-D character variable reads as a 1-D
    /// string array. The second storage axis is the string length, not a
    /// logical dimension.
    text_length: Option<usize>,
    structural: Vec<(String, String)>,
    mapped: Mutex<Option<MappedType>>,
    dims: Mutex<Option<Vec<Arc<Dimension>>>>,
    unit: Mutex<String>,
    /// Memoized no-data resolution; the outer `Option` is the memo state.
    nodata: Mutex<Option<Option<Vec<u8>>>>,
    use_default_fill_as_nodata: AtomicBool,
    has_written: AtomicBool,
    cache: Mutex<Option<CachedRegion>>,
}

enum Path {
    OneElement,
    Vara,
    Varm,
    Generic,
}

impl Variable {
    /// Wrap an existing variable.
    pub(crate) fn create(shared: &Arc<SharedResources>, v: VarId) -> Result<Arc<Variable>> {
        Self::build(shared, v, true)
    }

    /// Wrap a freshly defined variable, which still accepts a pre-fill
    /// value because nothing has been written yet.
    pub(crate) fn created(shared: &Arc<SharedResources>, v: VarId) -> Result<Arc<Variable>> {
        Self::build(shared, v, false)
    }

    fn build(shared: &Arc<SharedResources>, v: VarId, has_written: bool) -> Result<Arc<Variable>> {
        let _guard = shared.lock();
        let store = shared.store();
        let group = store.var_group(v)?;
        let native = store.var_type(v)?;
        let store_dims = store.var_dim_ids(v)?;

        let mut text_length = None;
        if store_dims.len() == 2 && native == NativeType::Char {
            // The second axis is a string length only when no variable is
            // named after it.
            let extra = store.dim_name(store_dims[1])?;
            if store.var_id(group, &extra).is_none() {
                text_length = Some(store.dim_len(store_dims[1])?);
            }
        }

        let mut structural = Vec::new();
        if store.var_deflate(v)?.is_some() {
            structural.push((String::from("COMPRESS"), String::from("DEFLATE")));
        }

        let unit = store
            .get_att_text(AttrTarget::Var(v), "units")
            .unwrap_or_default();

        Ok(Arc::new(Variable {
            shared: Arc::clone(shared),
            id: v,
            group,
            native,
            store_dims,
            text_length,
            structural,
            mapped: Mutex::new(None),
            dims: Mutex::new(None),
            unit: Mutex::new(unit),
            nodata: Mutex::new(None),
            use_default_fill_as_nodata: AtomicBool::new(false),
            has_written: AtomicBool::new(has_written),
            cache: Mutex::new(None),
        }))
    }

    pub(crate) fn id(&self) -> VarId {
        self.id
    }

    pub fn name(&self) -> Result<String> {
        let _guard = self.shared.lock();
        self.shared.store().var_name(self.id)
    }

    pub fn full_name(&self) -> Result<String> {
        let _guard = self.shared.lock();
        let prefix = group_full_name(&self.shared, self.group)?;
        let name = self.shared.store().var_name(self.id)?;
        if prefix == "/" {
            Ok(format!("/{}", name))
        } else {
            Ok(format!("{}/{}", prefix, name))
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
        self.shared.store().rename_var(self.id, new_name)
    }

    /// Logical rank. The string-length axis of a fixed-width character
    /// variable does not count.
    pub fn rank(&self) -> usize {
        if self.text_length.is_some() {
            1
        } else {
            self.store_dims.len()
        }
    }

    fn logical_dim_ids(&self) -> &[DimId] {
        if self.text_length.is_some() {
            &self.store_dims[..1]
        } else {
            &self.store_dims
        }
    }

    pub fn dimensions(&self) -> Result<Vec<Arc<Dimension>>> {
        {
            let cached = self.dims.lock();
            if let Some(dims) = &*cached {
                return Ok(dims.clone());
            }
        }
        let mut out = Vec::with_capacity(self.rank());
        for d in self.logical_dim_ids() {
            out.push(Dimension::open(&self.shared, *d)?);
        }
        *self.dims.lock() = Some(out.clone());
        Ok(out)
    }

    fn mapped(&self) -> Result<MappedType> {
        {
            let cached = self.mapped.lock();
            if let Some(m) = &*cached {
                return Ok(m.clone());
            }
        }
        let _guard = self.shared.lock();
        let m = if let Some(len) = self.text_length {
            MappedType {
                datatype: ExtendedDataType::string_with_max_length(len),
                perfect: true,
            }
        } else if self.native == NativeType::Char {
            // A character variable outside the fixed-string form carries
            // raw bytes.
            MappedType {
                datatype: ExtendedDataType::numeric(NumericType::UInt8),
                perfect: true,
            }
        } else {
            let unsigned = treat_bytes_as_unsigned(&self.shared, AttrTarget::Var(self.id));
            build_data_type(
                self.shared.store(),
                self.native,
                unsigned,
                self.shared.type_cache(),
            )?
        };
        *self.mapped.lock() = Some(m.clone());
        Ok(m)
    }

    pub fn data_type(&self) -> Result<ExtendedDataType> {
        Ok(self.mapped()?.datatype)
    }

    /// Chunk shape over the logical dimensions, zeros when unchunked.
    pub fn block_size(&self) -> Result<Vec<u64>> {
        let rank = self.rank();
        let _guard = self.shared.lock();
        match self.shared.store().var_chunking(self.id)? {
            Some(chunks) => Ok(chunks.iter().take(rank).map(|c| *c as u64).collect()),
            None => Ok(vec![0; rank]),
        }
    }

    pub fn structural_info(&self) -> &[(String, String)] {
        &self.structural
    }

    pub fn unit(&self) -> String {
        self.unit.lock().clone()
    }

    /// Set the `units` attribute; an empty string removes it.
    pub fn set_unit(&self, unit: &str) -> Result<()> {
        if self.shared.read_only() {
            return Err(Error::ReadOnly);
        }
        let _guard = self.shared.lock();
        let target = AttrTarget::Var(self.id);
        if unit.is_empty() {
            if self.shared.store().att_info(target, "units").is_some() {
                self.shared.set_define_mode(true)?;
                self.shared.store().del_att(target, "units")?;
            }
        } else {
            self.shared.set_define_mode(true)?;
            self.shared.store().put_att_text(target, "units", unit)?;
        }
        *self.unit.lock() = unit.to_string();
        Ok(())
    }

    pub fn scale(&self) -> Result<Option<f64>> {
        self.linear_coefficient("scale_factor")
    }

    pub fn offset(&self) -> Result<Option<f64>> {
        self.linear_coefficient("add_offset")
    }

    fn linear_coefficient(&self, name: &str) -> Result<Option<f64>> {
        match Attribute::open(&self.shared, AttrTarget::Var(self.id), name)? {
            Some(att) if att.data_type().class() == DataClass::Numeric => {
                Ok(Some(att.read_as_f64()?))
            }
            _ => Ok(None),
        }
    }

    pub fn set_scale(&self, value: f64, storage: Option<NumericType>) -> Result<()> {
        self.set_linear_coefficient("scale_factor", value, storage)
    }

    pub fn set_offset(&self, value: f64, storage: Option<NumericType>) -> Result<()> {
        self.set_linear_coefficient("add_offset", value, storage)
    }

    fn set_linear_coefficient(
        &self,
        name: &str,
        value: f64,
        storage: Option<NumericType>,
    ) -> Result<()> {
        let target = AttrTarget::Var(self.id);
        let att = match Attribute::open(&self.shared, target, name)? {
            Some(att) => att,
            None => {
                let dt = ExtendedDataType::numeric(storage.unwrap_or(NumericType::Float64));
                Attribute::new(&self.shared, target, self.group, name, 0, &dt)?
            }
        };
        att.write(
            &value.to_ne_bytes(),
            &ExtendedDataType::numeric(NumericType::Float64),
        )
    }

    pub fn attribute(&self, name: &str) -> Result<Option<Arc<Attribute>>> {
        Attribute::open(&self.shared, AttrTarget::Var(self.id), name)
    }

    /// Attributes of this variable. Conventional bookkeeping entries
    /// (`_FillValue`, `missing_value`, `units`, `scale_factor`,
    /// `add_offset`, and the `_Unsigned` marker on signed byte storage)
    /// are hidden unless `SHOW_ALL` is set.
    pub fn attributes(&self, options: &OptionList) -> Result<Vec<Arc<Attribute>>> {
        let _guard = self.shared.lock();
        let show_all = options.get_bool("SHOW_ALL", false);
        let target = AttrTarget::Var(self.id);
        let mut out = Vec::new();
        for name in self.shared.store().att_names(target)? {
            if !show_all {
                let hidden = matches!(
                    name.as_str(),
                    "_FillValue" | "missing_value" | "units" | "scale_factor" | "add_offset"
                ) || (name == "_Unsigned" && self.native == NativeType::SChar);
                if hidden {
                    continue;
                }
            }
            if let Some(att) = Attribute::open(&self.shared, target, &name)? {
                out.push(att);
            }
        }
        Ok(out)
    }

    /// Create an attribute of `length` elements (0 for a scalar).
    pub fn create_attribute(
        &self,
        name: &str,
        length: usize,
        dt: &ExtendedDataType,
    ) -> Result<Arc<Attribute>> {
        Attribute::new(
            &self.shared,
            AttrTarget::Var(self.id),
            self.group,
            name,
            length,
            dt,
        )
    }

    pub fn delete_attribute(&self, name: &str) -> Result<()> {
        if self.shared.read_only() {
            return Err(Error::ReadOnly);
        }
        let _guard = self.shared.lock();
        self.shared.set_define_mode(true)?;
        self.shared.store().del_att(AttrTarget::Var(self.id), name)
    }

    /// When no explicit no-data attribute exists, let the format's default
    /// fill value stand in.
    pub fn set_use_default_fill_as_nodata(&self, enabled: bool) {
        self.use_default_fill_as_nodata.store(enabled, Ordering::Relaxed);
        *self.nodata.lock() = None;
    }

    /// The variables listed by the `coordinates` attribute, in order.
    pub fn coordinate_variables(&self) -> Result<Vec<Arc<Variable>>> {
        let coords = match self.attribute("coordinates")? {
            Some(att)
                if att.data_type().class() == DataClass::String && att.rank() == 0 =>
            {
                att.read_as_string()?
            }
            _ => return Ok(vec![]),
        };
        let _guard = self.shared.lock();
        let mut out = Vec::new();
        for token in coords.split_whitespace() {
            match self.shared.store().var_id(self.group, token) {
                Some(v) => out.push(Variable::create(&self.shared, v)?),
                None => {
                    warn!(coordinate = %token, "no variable for listed coordinate");
                }
            }
        }
        Ok(out)
    }

    // ---- no-data ----

    /// The no-data value in the logical element type, resolved from the
    /// `_FillValue` attribute, then `missing_value`, then (when enabled)
    /// the format's default fill. Memoized until explicitly changed.
    pub fn raw_nodata(&self) -> Result<Option<Vec<u8>>> {
        {
            let memo = self.nodata.lock();
            if let Some(resolved) = &*memo {
                return Ok(resolved.clone());
            }
        }
        let use_default = self.use_default_fill_as_nodata.load(Ordering::Relaxed);
        let resolved = self.resolve_nodata(use_default)?;
        *self.nodata.lock() = Some(resolved.clone());
        Ok(resolved)
    }

    fn resolve_nodata(&self, use_default: bool) -> Result<Option<Vec<u8>>> {
        let own = self.mapped()?.datatype;
        if own.class() != DataClass::Numeric {
            return Ok(None);
        }
        let _guard = self.shared.lock();

        let mut attr = None;
        let mut attr_name = "_FillValue";
        for name in ["_FillValue", "missing_value"] {
            if let Some(a) = self.attribute(name)? {
                attr = Some(a);
                attr_name = name;
                break;
            }
        }

        if let Some(att) = attr {
            let adt = att.data_type();
            match adt.class() {
                DataClass::Numeric => {
                    let ours = att.read(&own)?;
                    let ours = ours[..own.size()].to_vec();
                    // Round-trip through the attribute's own type; a value
                    // outside the variable's range is informative but not a
                    // usable sentinel.
                    let mut back = vec![0u8; adt.size()];
                    copy_value(&ours, &own, &mut back, &adt)?;
                    let orig = att.read(&adt)?;
                    if back == orig[..adt.size()] {
                        return Ok(Some(ours));
                    }
                    warn!(
                        attribute = attr_name,
                        "no-data attribute value is outside the variable's range"
                    );
                    return Ok(None);
                }
                DataClass::String => {
                    let text = att.read_as_string()?;
                    let n = match own.numeric_type() {
                        Some(n) => n,
                        None => return Ok(None),
                    };
                    let mut val = vec![0u8; own.size()];
                    parse_numeric(&text, n, &mut val);
                    if format_numeric(&val, n) == text.trim() {
                        return Ok(Some(val));
                    }
                    warn!(
                        attribute = attr_name,
                        value = %text,
                        "no-data attribute text does not round-trip"
                    );
                    return Ok(None);
                }
                DataClass::Compound => return Ok(None),
            }
        }

        if use_default {
            let eligible = matches!(
                self.native,
                NativeType::Short
                    | NativeType::UShort
                    | NativeType::Int
                    | NativeType::UInt
                    | NativeType::Float
                    | NativeType::Double
                    | NativeType::Int64
                    | NativeType::UInt64
            );
            if eligible {
                // Perfect mappings for these types, so native bytes are the
                // logical representation.
                return Ok(default_fill_value(self.native));
            }
        }
        Ok(None)
    }

    /// Set (or with `None` clear) the no-data value, given in the logical
    /// element type. Setting it before any data is written also asks the
    /// store to pre-fill not-yet-allocated storage with it.
    pub fn set_raw_nodata(&self, value: Option<&[u8]>) -> Result<()> {
        if self.shared.read_only() {
            return Err(Error::ReadOnly);
        }
        let mapped = self.mapped()?;
        let own = &mapped.datatype;
        if own.class() != DataClass::Numeric {
            return Err(Error::unsupported("no-data on a non-numeric variable"));
        }
        let _guard = self.shared.lock();
        self.shared.set_define_mode(true)?;
        let store = self.shared.store();
        let target = AttrTarget::Var(self.id);
        *self.nodata.lock() = None;

        match value {
            None => {
                for name in ["_FillValue", "missing_value"] {
                    if store.att_info(target, name).is_some() {
                        store.del_att(target, name)?;
                    }
                }
                *self.nodata.lock() = Some(None);
                Ok(())
            }
            Some(v) => {
                if v.len() < own.size() {
                    return Err(Error::invalid("no-data value buffer too small"));
                }
                let native = self.logical_to_native(&v[..own.size()], &mapped)?;
                if !self.has_written.load(Ordering::Relaxed) {
                    store.set_var_fill(self.id, &native)?;
                }
                if store.att_info(target, "missing_value").is_some() {
                    if store.att_info(target, "_FillValue").is_some() {
                        return Err(Error::unsupported(
                            "cannot change no-data when missing_value and _FillValue both exist",
                        ));
                    }
                    store.put_att_raw(target, "missing_value", self.native, 1, &native)?;
                } else {
                    store.put_att_raw(target, "_FillValue", self.native, 1, &native)?;
                }
                *self.nodata.lock() = Some(Some(v[..own.size()].to_vec()));
                Ok(())
            }
        }
    }

    /// The no-data value cast to a concrete primitive.
    pub fn nodata_as<T: Element + num_traits::NumCast>(&self) -> Result<Option<T>> {
        let own = self.mapped()?.datatype;
        let n = match own.numeric_type() {
            Some(n) => n,
            None => return Ok(None),
        };
        match self.raw_nodata()? {
            Some(raw) => Ok(num_traits::cast(decode_as_f64(&raw, n))),
            None => Ok(None),
        }
    }

    fn logical_to_native(&self, logical: &[u8], mapped: &MappedType) -> Result<Vec<u8>> {
        let native_size = {
            let _guard = self.shared.lock();
            self.shared.store().type_size(self.native)?
        };
        if mapped.perfect {
            return Ok(logical[..native_size].to_vec());
        }
        // Signed byte storage surfaced as 16-bit; narrow back.
        let widened = i16::from_ne_bytes([logical[0], logical[1]]);
        Ok(vec![widened as i8 as u8])
    }

    // ---- resize ----

    /// Grow the referenced dimensions to `new_sizes`. Shrinking is
    /// rejected, as is growth of a dimension the store does not list as
    /// resizable. A dimension referenced twice must receive one size.
    pub fn resize(&self, new_sizes: &[u64]) -> Result<()> {
        if self.shared.read_only() {
            return Err(Error::ReadOnly);
        }
        let dims = self.dimensions()?;
        if new_sizes.len() != dims.len() {
            return Err(Error::invalid("wrong number of sizes for this variable"));
        }
        let _guard = self.shared.lock();

        let mut targets: Vec<(DimId, u64)> = Vec::new();
        let mut grown: Vec<usize> = Vec::new();
        for (i, dim) in dims.iter().enumerate() {
            if let Some((_, prev)) = targets.iter().find(|(d, _)| *d == dim.id()) {
                if *prev != new_sizes[i] {
                    return Err(Error::invalid(
                        "dimension referenced several times with different sizes",
                    ));
                }
            } else {
                targets.push((dim.id(), new_sizes[i]));
            }
            let cur = dim.size()?;
            if new_sizes[i] < cur {
                return Err(Error::unsupported("resize cannot shrink a dimension"));
            }
            if new_sizes[i] > cur {
                grown.push(i);
            }
        }
        if grown.is_empty() {
            return Ok(());
        }

        let unlimited = self.shared.store().unlimited_dim_ids(self.group)?;
        for i in &grown {
            if !unlimited.contains(&dims[*i].id()) {
                return Err(Error::unsupported(format!(
                    "dimension '{}' was not created as resizable",
                    dims[*i].name()?
                )));
            }
        }
        for i in grown {
            dims[i].grow_to(new_sizes[i]);
        }
        Ok(())
    }

    // ---- read / write ----

    /// Read a hyper-rectangle into `out`, converting each element to `dt`.
    ///
    /// `out` holds elements of `dt` addressed by the signed per-dimension
    /// `buffer_stride` (in elements); the element at the request origin
    /// sits after the span any negative strides reach back over. String
    /// data goes through [`Variable::read_strings`] instead.
    pub fn read(
        &self,
        start: &[u64],
        count: &[usize],
        step: &[i64],
        buffer_stride: &[isize],
        dt: &ExtendedDataType,
        out: &mut [u8],
    ) -> Result<()> {
        if dt.class() == DataClass::String {
            return Err(Error::invalid(
                "byte-oriented read of string data; use read_strings",
            ));
        }
        let rank = self.rank();
        check_rank(rank, start, count, step, buffer_stride)?;
        if count.iter().product::<usize>() == 0 {
            return Ok(());
        }

        if let Some((cached, rewritten)) = self.cached_region_for(start, count, step) {
            debug!("serving read from the advise-read cache");
            return cached.read(&rewritten, count, step, buffer_stride, dt, out);
        }

        if self.text_length.is_some() {
            return Err(Error::unsupported(
                "fixed-width character data reads as strings",
            ));
        }
        if !dt.is_fully_numeric() {
            return Err(Error::unsupported("unsupported buffer element type"));
        }
        let mapped = self.mapped()?;
        if mapped.datatype.class() == DataClass::String {
            return Err(Error::invalid(
                "byte-oriented read of string data; use read_strings",
            ));
        }

        let _guard = self.shared.lock();
        self.shared.set_define_mode(false)?;
        let startp = start_to_usize(start)?;
        let (base, span) = buffer_span(count, buffer_stride);
        if out.len() < span * dt.size() {
            return Err(Error::invalid("read buffer too small"));
        }
        self.read_bytes(&mapped, &startp, count, step, buffer_stride, dt, base, out)
    }

    /// Write a hyper-rectangle from `data`, converting each element from
    /// `dt`. Invalidates any advise-read cache.
    pub fn write(
        &self,
        start: &[u64],
        count: &[usize],
        step: &[i64],
        buffer_stride: &[isize],
        dt: &ExtendedDataType,
        data: &[u8],
    ) -> Result<()> {
        if self.shared.read_only() {
            return Err(Error::ReadOnly);
        }
        if dt.class() == DataClass::String {
            return Err(Error::invalid(
                "byte-oriented write of string data; use write_strings",
            ));
        }
        let rank = self.rank();
        check_rank(rank, start, count, step, buffer_stride)?;
        if count.iter().product::<usize>() == 0 {
            return Ok(());
        }

        if self.text_length.is_some() {
            return Err(Error::unsupported(
                "fixed-width character data writes as strings",
            ));
        }
        if !dt.is_fully_numeric() {
            return Err(Error::unsupported("unsupported buffer element type"));
        }
        let mapped = self.mapped()?;
        if mapped.datatype.class() == DataClass::String {
            return Err(Error::invalid(
                "byte-oriented write of string data; use write_strings",
            ));
        }

        let _guard = self.shared.lock();
        self.shared.set_define_mode(false)?;
        let startp = start_to_usize(start)?;
        let (base, span) = buffer_span(count, buffer_stride);
        if data.len() < span * dt.size() {
            return Err(Error::invalid("write buffer too small"));
        }
        // Only a write that will actually reach the store ends the
        // pre-fill window and invalidates the advise-read cache.
        self.has_written.store(true, Ordering::Relaxed);
        *self.cache.lock() = None;
        self.write_bytes(&mapped, &startp, count, step, buffer_stride, dt, base, data)
    }

    /// Read string elements in row-major window order. Valid for native
    /// string variables and the fixed-width character form.
    pub fn read_strings(
        &self,
        start: &[u64],
        count: &[usize],
        step: &[i64],
    ) -> Result<Vec<String>> {
        let rank = self.rank();
        let stride = vec![0isize; rank];
        check_rank(rank, start, count, step, &stride)?;
        let _guard = self.shared.lock();
        self.shared.set_define_mode(false)?;
        let store = self.shared.store();
        let total: usize = count.iter().product();
        let mut out = Vec::with_capacity(total);

        if let Some(text_len) = self.text_length {
            let mut row = vec![0u8; text_len];
            let mut idx = start[0] as i64;
            for _ in 0..count[0] {
                store.get_vara(
                    self.id,
                    &[usize::try_from(idx).map_err(|_| Error::invalid("negative index"))?, 0],
                    &[1, text_len],
                    &mut row,
                )?;
                let end = row.iter().position(|b| *b == 0).unwrap_or(text_len);
                out.push(String::from_utf8_lossy(&row[..end]).into_owned());
                idx += step[0];
            }
            return Ok(out);
        }

        if self.native != NativeType::Str {
            return Err(Error::unsupported("string read of a numeric variable"));
        }
        let startp = start_to_usize(start)?;
        for_each_element(&startp, count, step, &stride, |idx, _| {
            out.push(store.get_var1_string(self.id, idx)?);
            Ok(())
        })?;
        Ok(out)
    }

    /// Write string elements given in row-major window order. Fixed-width
    /// character storage zero-pads and truncates to the string width.
    pub fn write_strings(
        &self,
        start: &[u64],
        count: &[usize],
        step: &[i64],
        values: &[String],
    ) -> Result<()> {
        if self.shared.read_only() {
            return Err(Error::ReadOnly);
        }
        let rank = self.rank();
        let stride = vec![0isize; rank];
        check_rank(rank, start, count, step, &stride)?;
        let total: usize = count.iter().product();
        if values.len() < total {
            return Err(Error::invalid("not enough string values for the window"));
        }
        if self.text_length.is_none() && self.native != NativeType::Str {
            return Err(Error::unsupported("string write to a numeric variable"));
        }
        let _guard = self.shared.lock();
        self.shared.set_define_mode(false)?;
        let store = self.shared.store();
        self.has_written.store(true, Ordering::Relaxed);
        *self.cache.lock() = None;

        if let Some(text_len) = self.text_length {
            let mut idx = start[0] as i64;
            for value in values.iter().take(count[0]) {
                let mut row = vec![0u8; text_len];
                let bytes = value.as_bytes();
                let n = bytes.len().min(text_len);
                row[..n].copy_from_slice(&bytes[..n]);
                store.put_vara(
                    self.id,
                    &[usize::try_from(idx).map_err(|_| Error::invalid("negative index"))?, 0],
                    &[1, text_len],
                    &row,
                )?;
                idx += step[0];
            }
            return Ok(());
        }

        let startp = start_to_usize(start)?;
        let mut next = 0usize;
        for_each_element(&startp, count, step, &stride, |idx, _| {
            store.put_var1_string(self.id, idx, &values[next])?;
            next += 1;
            Ok(())
        })
    }

    /// Materialize a region in memory so later reads fully contained in it
    /// never touch the store. Any write drops the materialized copy.
    pub fn advise_read(&self, start: &[u64], count: &[usize]) -> Result<()> {
        let rank = self.rank();
        if rank == 0 {
            return Ok(());
        }
        if start.len() != rank || count.len() != rank {
            return Err(Error::invalid("wrong request rank for this variable"));
        }
        let own = self.mapped()?.datatype;
        if own.class() != DataClass::Numeric {
            return Err(Error::unsupported("advise-read on a non-numeric variable"));
        }
        *self.cache.lock() = None;

        let total: usize = count.iter().product();
        let mut buf = vec![0u8; total * own.size()];
        let step = vec![1i64; rank];
        let stride = natural_strides(count);
        self.read(start, count, &step, &stride, &own, &mut buf)?;

        let mem = SharedResources::for_created(Box::new(MemStore::new()));
        let cached = {
            let store = mem.store();
            let root = store.root();
            let dims = self.dimensions()?;
            let mut ids = Vec::with_capacity(rank);
            for (i, dim) in dims.iter().enumerate() {
                let name = dim.name()?;
                // A dimension referenced twice keeps one definition.
                let id = match store.dim_id(root, &name) {
                    Some(existing) => existing,
                    None => store.def_dim(root, &name, count[i], false)?,
                };
                ids.push(id);
            }
            let native = create_or_get_type(store, root, &own)?;
            let v = store.def_var(root, &self.name()?, native, &ids)?;
            Variable::created(&mem, v)?
        };
        cached.write(&vec![0u64; rank], count, &step, &stride, &own, &buf)?;
        *self.cache.lock() = Some(CachedRegion {
            variable: cached,
            start: start.to_vec(),
            count: count.to_vec(),
        });
        Ok(())
    }

    fn cached_region_for(
        &self,
        start: &[u64],
        count: &[usize],
        step: &[i64],
    ) -> Option<(Arc<Variable>, Vec<u64>)> {
        let guard = self.cache.lock();
        let region = guard.as_ref()?;
        let mut rewritten = Vec::with_capacity(start.len());
        for i in 0..start.len() {
            let first = start[i] as i128;
            let last = first + (count[i] as i128 - 1) * step[i] as i128;
            let cs = region.start[i] as i128;
            let ce = cs + region.count[i] as i128 - 1;
            if first.min(last) < cs || first.max(last) > ce {
                return None;
            }
            rewritten.push(start[i] - region.start[i]);
        }
        Some((Arc::clone(&region.variable), rewritten))
    }

    // ---- typed convenience ----

    /// Read a window as a row-major typed array.
    pub fn read_array<T: Element>(&self, start: &[u64], count: &[usize]) -> Result<ArrayD<T>> {
        let dt = ExtendedDataType::numeric(T::NUMERIC);
        let size = dt.size();
        let total: usize = count.iter().product();
        let mut raw = vec![0u8; total * size];
        let step = vec![1i64; count.len()];
        let stride = natural_strides(count);
        self.read(start, count, &step, &stride, &dt, &mut raw)?;
        let elems: Vec<T> = raw.chunks_exact(size).map(T::read_from).collect();
        ArrayD::from_shape_vec(IxDyn(count), elems)
            .map_err(|_| Error::invalid("window shape does not match element count"))
    }

    /// Write a row-major typed array at `start`.
    pub fn write_array<T: Element>(&self, start: &[u64], array: &ArrayD<T>) -> Result<()> {
        let dt = ExtendedDataType::numeric(T::NUMERIC);
        let size = dt.size();
        let count: Vec<usize> = array.shape().to_vec();
        let standard = array.as_standard_layout();
        let mut raw = vec![0u8; standard.len() * size];
        for (i, v) in standard.iter().enumerate() {
            v.write_to(&mut raw[i * size..(i + 1) * size]);
        }
        let step = vec![1i64; count.len()];
        let stride = natural_strides(&count);
        self.write(start, &count, &step, &stride, &dt, &raw)
    }

    // ---- transfer engine internals ----

    fn choose_path(
        &self,
        is_read: bool,
        mapped: &MappedType,
        count: &[usize],
        step: &[i64],
        stride: &[isize],
        dt: &ExtendedDataType,
    ) -> Path {
        let own = &mapped.datatype;
        if count.is_empty() {
            return Path::OneElement;
        }

        let mut slow = !mapped.perfect
            && !(is_read
                && dt.class() == DataClass::Numeric
                && own.class() == DataClass::Numeric
                && dt.size() >= own.size());
        for i in 0..count.len() {
            // The mapped native call rejects non-positive steps and
            // silently misreads negative buffer strides.
            if count[i] != 1 && step[i] <= 0 {
                slow = true;
            }
            if stride[i] < 0 {
                slow = true;
            }
        }

        let identical_aggregate = (dt
            .numeric_type()
            .is_some_and(NumericType::is_complex)
            || dt.class() == DataClass::Compound)
            && dt == own;
        if !slow && identical_aggregate {
            // The mapped call cannot move non-atomic element types; only a
            // truly contiguous request can go through the bulk call.
            if natural_layout(count, step, stride) {
                return Path::Vara;
            }
            slow = true;
        }

        if slow
            || dt.class() == DataClass::Compound
            || own.class() == DataClass::Compound
            || (!is_read && dt.numeric_type() != own.numeric_type())
            || (is_read && dt.size() < own.size())
        {
            return Path::Generic;
        }

        if natural_layout(count, step, stride) {
            return Path::Vara;
        }
        if dt.numeric_type() != own.numeric_type() || !mapped.perfect {
            return Path::Generic;
        }
        Path::Varm
    }

    #[allow(clippy::too_many_arguments)]
    fn read_bytes(
        &self,
        mapped: &MappedType,
        start: &[usize],
        count: &[usize],
        step: &[i64],
        stride: &[isize],
        dt: &ExtendedDataType,
        base: usize,
        out: &mut [u8],
    ) -> Result<()> {
        let store = self.shared.store();
        let own = &mapped.datatype;
        let dt_size = dt.size();
        let native_size = store.type_size(self.native)?;

        match self.choose_path(true, mapped, count, step, stride, dt) {
            Path::OneElement => self.read_one(&[], mapped, native_size, dt, &mut out[..dt_size]),
            Path::Vara => {
                let total: usize = count.iter().product();
                store.get_vara(self.id, start, count, &mut out[..total * native_size])?;
                if !mapped.perfect || dt.numeric_type() != own.numeric_type() {
                    self.widen_in_place(mapped, native_size, total, dt, out)?;
                }
                Ok(())
            }
            Path::Varm => {
                let stridep: Vec<isize> = count
                    .iter()
                    .zip(step.iter())
                    .map(|(c, s)| if *c == 1 { 1 } else { *s as isize })
                    .collect();
                let mut imap: Vec<isize> = stride.to_vec();
                if !self.shared.imap_in_elements() {
                    for m in &mut imap {
                        *m *= native_size as isize;
                    }
                }
                store.get_varm(self.id, start, count, &stridep, &imap, out)
            }
            Path::Generic => {
                let direct = mapped.perfect && dt == own;
                for_each_element(start, count, step, stride, |idx, off| {
                    let at = ((base as isize + off) as usize) * dt_size;
                    if direct {
                        store.get_var1(self.id, idx, &mut out[at..at + native_size])
                    } else {
                        self.read_one(idx, mapped, native_size, dt, &mut out[at..at + dt_size])
                    }
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_bytes(
        &self,
        mapped: &MappedType,
        start: &[usize],
        count: &[usize],
        step: &[i64],
        stride: &[isize],
        dt: &ExtendedDataType,
        base: usize,
        data: &[u8],
    ) -> Result<()> {
        let store = self.shared.store();
        let own = &mapped.datatype;
        let dt_size = dt.size();
        let native_size = store.type_size(self.native)?;

        match self.choose_path(false, mapped, count, step, stride, dt) {
            Path::OneElement => self.write_one(&[], mapped, native_size, dt, &data[..dt_size]),
            Path::Vara => {
                // Reaching the bulk call on write means the bytes already
                // are the native representation.
                let total: usize = count.iter().product();
                store.put_vara(self.id, start, count, &data[..total * native_size])
            }
            Path::Varm => {
                let stridep: Vec<isize> = count
                    .iter()
                    .zip(step.iter())
                    .map(|(c, s)| if *c == 1 { 1 } else { *s as isize })
                    .collect();
                let mut imap: Vec<isize> = stride.to_vec();
                if !self.shared.imap_in_elements() {
                    for m in &mut imap {
                        *m *= native_size as isize;
                    }
                }
                store.put_varm(self.id, start, count, &stridep, &imap, data)
            }
            Path::Generic => {
                let direct = mapped.perfect && dt == own;
                for_each_element(start, count, step, stride, |idx, off| {
                    let at = ((base as isize + off) as usize) * dt_size;
                    if direct {
                        store.put_var1(self.id, idx, &data[at..at + native_size])
                    } else {
                        self.write_one(idx, mapped, native_size, dt, &data[at..at + dt_size])
                    }
                })
            }
        }
    }

    /// After a bulk read left `total` native elements at the front of
    /// `out`, convert each to `dt` in place. Runs back to front so the
    /// growing destination never overwrites unconverted source bytes.
    fn widen_in_place(
        &self,
        mapped: &MappedType,
        native_size: usize,
        total: usize,
        dt: &ExtendedDataType,
        out: &mut [u8],
    ) -> Result<()> {
        let own = &mapped.datatype;
        let own_size = own.size();
        let dt_size = dt.size();
        if !mapped.perfect && matches!(self.native, NativeType::SChar) {
            for i in (0..total).rev() {
                let staged = (out[i * native_size] as i8 as i16).to_ne_bytes();
                copy_value(&staged, own, &mut out[i * dt_size..(i + 1) * dt_size], dt)?;
            }
        } else {
            let mut staged = [0u8; 16];
            for i in (0..total).rev() {
                staged[..own_size].copy_from_slice(&out[i * own_size..(i + 1) * own_size]);
                copy_value(
                    &staged[..own_size],
                    own,
                    &mut out[i * dt_size..(i + 1) * dt_size],
                    dt,
                )?;
            }
        }
        Ok(())
    }

    fn read_one(
        &self,
        idx: &[usize],
        mapped: &MappedType,
        native_size: usize,
        dt: &ExtendedDataType,
        out: &mut [u8],
    ) -> Result<()> {
        let own = &mapped.datatype;
        let mut src = vec![0u8; own.size().max(native_size)];
        self.shared
            .store()
            .get_var1(self.id, idx, &mut src[..native_size])?;
        if !mapped.perfect && matches!(self.native, NativeType::SChar) {
            let widened = (src[0] as i8 as i16).to_ne_bytes();
            src[..2].copy_from_slice(&widened);
        }
        copy_value(&src, own, out, dt)
    }

    fn write_one(
        &self,
        idx: &[usize],
        mapped: &MappedType,
        native_size: usize,
        dt: &ExtendedDataType,
        data: &[u8],
    ) -> Result<()> {
        let own = &mapped.datatype;
        let mut staged = vec![0u8; own.size().max(native_size)];
        copy_value(data, dt, &mut staged, own)?;
        if !mapped.perfect && matches!(self.native, NativeType::SChar) {
            let widened = i16::from_ne_bytes([staged[0], staged[1]]);
            staged[0] = widened as i8 as u8;
        }
        self.shared.store().put_var1(self.id, idx, &staged[..native_size])
    }
}

impl Drop for Variable {
    /// When a referenced dimension has grown past what the store actually
    /// allocated for this variable, write one no-data element at the new
    /// extreme corner so grown cells read back as no-data, not garbage.
    fn drop(&mut self) {
        if self.shared.read_only() || self.rank() == 0 || self.text_length.is_some() {
            return;
        }
        let _ = self.flush_grown_extent();
    }
}

impl Variable {
    fn flush_grown_extent(&self) -> Result<()> {
        let own = self.mapped()?.datatype;
        if own.class() == DataClass::String {
            return Ok(());
        }
        let mut sizes = Vec::with_capacity(self.rank());
        let mut grew = false;
        for d in self.logical_dim_ids() {
            match self.shared.cached_dimension(*d) {
                Some(dim) => {
                    let logical = dim.size()?;
                    if logical > dim.actual_size()? {
                        grew = true;
                    }
                    sizes.push(logical);
                }
                None => {
                    let _guard = self.shared.lock();
                    sizes.push(self.shared.store().dim_len(*d)? as u64);
                }
            }
        }
        if !grew {
            return Ok(());
        }
        debug!(variable = %self.name()?, "materializing grown extent");
        let nodata = self
            .resolve_nodata(true)?
            .unwrap_or_else(|| vec![0u8; own.size()]);
        let corner: Vec<u64> = sizes.iter().map(|s| s - 1).collect();
        let rank = self.rank();
        self.write(
            &corner,
            &vec![1usize; rank],
            &vec![1i64; rank],
            &vec![0isize; rank],
            &own,
            &nodata,
        )
    }
}

fn check_rank(
    rank: usize,
    start: &[u64],
    count: &[usize],
    step: &[i64],
    stride: &[isize],
) -> Result<()> {
    if start.len() != rank || count.len() != rank || step.len() != rank || stride.len() != rank {
        return Err(Error::invalid("wrong request rank for this variable"));
    }
    Ok(())
}

fn start_to_usize(start: &[u64]) -> Result<Vec<usize>> {
    start
        .iter()
        .map(|s| usize::try_from(*s).map_err(|_| Error::invalid("start index not addressable")))
        .collect()
}

/// Row-major element strides for a packed buffer of shape `count`.
pub(crate) fn natural_strides(count: &[usize]) -> Vec<isize> {
    let mut stride = vec![1isize; count.len()];
    let mut acc = 1isize;
    for i in (0..count.len()).rev() {
        stride[i] = acc;
        acc *= count[i] as isize;
    }
    stride
}

/// Whether the request is one contiguous block in both the array and the
/// buffer, checked innermost-out.
fn natural_layout(count: &[usize], step: &[i64], stride: &[isize]) -> bool {
    let mut expected: isize = 1;
    for i in (0..count.len()).rev() {
        if count[i] != 1 && (step[i] != 1 || stride[i] != expected) {
            return false;
        }
        expected *= count[i] as isize;
    }
    true
}

/// Extra leading elements negative strides reach back over, and the total
/// element span the request addresses.
fn buffer_span(count: &[usize], stride: &[isize]) -> (usize, usize) {
    let mut base = 0usize;
    let mut top = 0usize;
    for (c, s) in count.iter().zip(stride.iter()) {
        if *c == 0 {
            continue;
        }
        if *s < 0 {
            base += (c - 1) * s.unsigned_abs();
        } else {
            top += (c - 1) * *s as usize;
        }
    }
    (base, base + top + 1)
}

/// Iterative odometer over the request window. Calls `f` with the array
/// index vector and the signed buffer offset (in elements) of each
/// requested element, advancing indices with signed arithmetic since steps
/// may be negative.
fn for_each_element<F>(
    start: &[usize],
    count: &[usize],
    step: &[i64],
    stride: &[isize],
    mut f: F,
) -> Result<()>
where
    F: FnMut(&[usize], isize) -> Result<()>,
{
    let rank = count.len();
    if rank == 0 {
        return f(&[], 0);
    }
    if count.iter().any(|c| *c == 0) {
        return Ok(());
    }
    let mut pos = vec![0usize; rank];
    let mut idx = start.to_vec();
    let mut off: isize = 0;
    loop {
        f(&idx, off)?;
        let mut axis = rank;
        loop {
            if axis == 0 {
                return Ok(());
            }
            axis -= 1;
            pos[axis] += 1;
            if pos[axis] < count[axis] {
                idx[axis] = (idx[axis] as i64 + step[axis]) as usize;
                off += stride[axis];
                break;
            }
            pos[axis] = 0;
            idx[axis] = start[axis];
            off -= stride[axis] * (count[axis] as isize - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Group;
    use crate::testing::{grid_variable, reference_window};

    fn shared() -> Arc<SharedResources> {
        SharedResources::for_created(Box::new(MemStore::new()))
    }

    #[test]
    fn test_row_major_round_trip() {
        let (shared, var) = grid_variable(3, 4);
        let values: Vec<i32> = (0..12).collect();
        let arr = ArrayD::from_shape_vec(IxDyn(&[3, 4]), values.clone()).unwrap();
        var.write_array(&[0, 0], &arr).unwrap();

        let back = var.read_array::<i32>(&[0, 0], &[3, 4]).unwrap();
        assert_eq!(back.into_raw_vec(), values);
        drop(shared);
    }

    #[test]
    fn test_negative_steps_mirror() {
        let (_shared, var) = grid_variable(3, 4);
        let arr = ArrayD::from_shape_vec(IxDyn(&[3, 4]), (0..12).collect()).unwrap();
        var.write_array(&[0, 0], &arr).unwrap();

        let dt = ExtendedDataType::numeric(NumericType::Int32);
        let mut raw = vec![0u8; 12 * 4];
        var.read(
            &[2, 3],
            &[3, 4],
            &[-1, -1],
            &natural_strides(&[3, 4]),
            &dt,
            &mut raw,
        )
        .unwrap();
        let got: Vec<i32> = raw.chunks_exact(4).map(i32::read_from).collect();
        let expected: Vec<i32> = (0..12).rev().collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_paths_agree_on_random_windows() {
        use rand::Rng;
        let (_shared, var) = grid_variable(6, 7);
        let values: Vec<i32> = (0..42).collect();
        let arr = ArrayD::from_shape_vec(IxDyn(&[6, 7]), values.clone()).unwrap();
        var.write_array(&[0, 0], &arr).unwrap();
        let dt = ExtendedDataType::numeric(NumericType::Int32);

        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let start = [rng.gen_range(0..4u64), rng.gen_range(0..5u64)];
            let step = [rng.gen_range(1..3i64), rng.gen_range(1..3i64)];
            let count = [
                rng.gen_range(1..=(6 - start[0] as usize).div_ceil(step[0] as usize)),
                rng.gen_range(1..=(7 - start[1] as usize).div_ceil(step[1] as usize)),
            ];
            let expected = reference_window(&values, &[6, 7], &start, &count, &step);

            // Packed strides pick the bulk or mapped call; a widened
            // element type forces the per-element traversal.
            let mut raw = vec![0u8; count[0] * count[1] * 4];
            var.read(&start, &count, &step, &natural_strides(&count), &dt, &mut raw)
                .unwrap();
            let fast: Vec<i32> = raw.chunks_exact(4).map(i32::read_from).collect();
            assert_eq!(fast, expected);

            let wide = ExtendedDataType::numeric(NumericType::Int64);
            let mut raw = vec![0u8; count[0] * count[1] * 8];
            var.read(&start, &count, &step, &natural_strides(&count), &wide, &mut raw)
                .unwrap();
            let slow: Vec<i32> = raw.chunks_exact(8).map(|c| i64::read_from(c) as i32).collect();
            assert_eq!(slow, expected);
        }
    }

    #[test]
    fn test_transposed_buffer_strides() {
        let (_shared, var) = grid_variable(3, 4);
        let arr = ArrayD::from_shape_vec(IxDyn(&[3, 4]), (0..12).collect()).unwrap();
        var.write_array(&[0, 0], &arr).unwrap();

        // Column-major destination: the mapped path handles it in one call.
        let dt = ExtendedDataType::numeric(NumericType::Int32);
        let mut raw = vec![0u8; 12 * 4];
        var.read(&[0, 0], &[3, 4], &[1, 1], &[1, 3], &dt, &mut raw)
            .unwrap();
        let got: Vec<i32> = raw.chunks_exact(4).map(i32::read_from).collect();
        assert_eq!(got[0], 0);
        assert_eq!(got[1], 4);
        assert_eq!(got[3], 1);
        assert_eq!(got[11], 11);
    }

    #[test]
    fn test_byte_unit_mapped_strides() {
        use crate::store::StorageFormat;
        // A store predating 4.4 takes mapped buffer strides in bytes; the
        // engine scales the element strides before the call.
        let shared = SharedResources::for_created(Box::new(MemStore::with_library_version(
            StorageFormat::V4,
            "4.3.3.1",
        )));
        let root = Group::root(&shared);
        let y = root.create_dimension("y", 3, &OptionList::new()).unwrap();
        let x = root.create_dimension("x", 4, &OptionList::new()).unwrap();
        let dt = ExtendedDataType::numeric(NumericType::Int32);
        let var = root
            .create_variable("grid", &[y, x], &dt, &OptionList::new())
            .unwrap();

        let arr = ArrayD::from_shape_vec(IxDyn(&[3, 4]), (0..12).collect()).unwrap();
        var.write_array(&[0, 0], &arr).unwrap();

        // Column-major destination goes through the mapped call.
        let mut raw = vec![0u8; 12 * 4];
        var.read(&[0, 0], &[3, 4], &[1, 1], &[1, 3], &dt, &mut raw)
            .unwrap();
        let got: Vec<i32> = raw.chunks_exact(4).map(i32::read_from).collect();
        assert_eq!(got[1], 4);
        assert_eq!(got[3], 1);
        assert_eq!(got[11], 11);

        // And back through the mapped write.
        let mut src = vec![0u8; 12 * 4];
        for (i, v) in got.iter().enumerate() {
            src[i * 4..(i + 1) * 4].copy_from_slice(&(v + 100).to_ne_bytes());
        }
        var.write(&[0, 0], &[3, 4], &[1, 1], &[1, 3], &dt, &src)
            .unwrap();
        let back = var.read_array::<i32>(&[0, 0], &[3, 4]).unwrap();
        let expected: Vec<i32> = (100..112).collect();
        assert_eq!(back.into_raw_vec(), expected);
    }

    #[test]
    fn test_widening_read_conversion() {
        let (_shared, var) = grid_variable(2, 2);
        let arr = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1, -2, 3, -4]).unwrap();
        var.write_array(&[0, 0], &arr).unwrap();

        let back = var.read_array::<f64>(&[0, 0], &[2, 2]).unwrap();
        assert_eq!(back.into_raw_vec(), vec![1.0, -2.0, 3.0, -4.0]);
    }

    #[test]
    fn test_signed_byte_widening_variable() {
        let shared = shared();
        let store = shared.store();
        let root = store.root();
        let d = store.def_dim(root, "n", 4, false).unwrap();
        let v = store.def_var(root, "b", NativeType::SChar, &[d]).unwrap();
        store
            .put_att_text(AttrTarget::Var(v), "_Unsigned", "false")
            .unwrap();
        let var = Variable::created(&shared, v).unwrap();
        assert_eq!(
            var.data_type().unwrap().numeric_type(),
            Some(NumericType::Int16)
        );

        let arr = ArrayD::from_shape_vec(IxDyn(&[4]), vec![-5i16, 7, -128, 127]).unwrap();
        var.write_array(&[0], &arr).unwrap();
        let back = var.read_array::<i16>(&[0], &[4]).unwrap();
        assert_eq!(back.into_raw_vec(), vec![-5, 7, -128, 127]);

        // The store really holds one byte per element.
        let mut raw = [0u8; 1];
        shared.store().get_var1(v, &[0], &mut raw).unwrap();
        assert_eq!(raw[0] as i8, -5);
    }

    #[test]
    fn test_complex_compound_round_trip() {
        let shared = shared();
        let root_group = Group::root(&shared);
        let n = root_group
            .create_dimension("n", 1, &OptionList::new())
            .unwrap();
        let dt = ExtendedDataType::numeric(NumericType::CFloat32);
        let var = root_group
            .create_variable("signal", &[n], &dt, &OptionList::new())
            .unwrap();
        assert_eq!(
            var.data_type().unwrap().numeric_type(),
            Some(NumericType::CFloat32)
        );

        let mut record = [0u8; 8];
        1.5f32.write_to(&mut record[..4]);
        (-2.5f32).write_to(&mut record[4..]);
        var.write(&[0], &[1], &[1], &[1], &dt, &record).unwrap();

        let mut back = [0u8; 8];
        var.read(&[0], &[1], &[1], &[1], &dt, &mut back).unwrap();
        assert_eq!(f32::read_from(&back[..4]), 1.5);
        assert_eq!(f32::read_from(&back[4..]), -2.5);
    }

    #[test]
    fn test_resize_monotonic_and_unlimited_only() {
        let shared = shared();
        let root = Group::root(&shared);
        let t = root
            .create_dimension("t", 2, &OptionList::new().set("UNLIMITED", "YES"))
            .unwrap();
        let x = root.create_dimension("x", 2, &OptionList::new()).unwrap();
        let dt = ExtendedDataType::numeric(NumericType::Float64);
        let var = root
            .create_variable("series", &[Arc::clone(&t), Arc::clone(&x)], &dt, &OptionList::new())
            .unwrap();

        var.resize(&[4, 2]).unwrap();
        assert_eq!(t.size().unwrap(), 4);

        // Shrinking and growing a fixed dimension are both rejected.
        assert!(matches!(var.resize(&[2, 2]), Err(Error::NotSupported(_))));
        assert!(matches!(var.resize(&[4, 4]), Err(Error::NotSupported(_))));
    }

    #[test]
    fn test_drop_materializes_grown_corner() {
        let shared = shared();
        let root = Group::root(&shared);
        let t = root
            .create_dimension("t", 2, &OptionList::new().set("UNLIMITED", "YES"))
            .unwrap();
        let dt = ExtendedDataType::numeric(NumericType::Int32);
        let var = root
            .create_variable("counts", &[t], &dt, &OptionList::new())
            .unwrap();
        var.resize(&[5]).unwrap();
        drop(var);

        let store = shared.store();
        let v = store.var_id(store.root(), "counts").unwrap();
        let d = store.dim_id(store.root(), "t").unwrap();
        assert_eq!(store.dim_len(d).unwrap(), 5);
        let mut raw = [0u8; 4];
        store.get_var1(v, &[4], &mut raw).unwrap();
        assert_eq!(i32::from_ne_bytes(raw), -2147483647);
    }

    #[test]
    fn test_fixed_width_string_round_trip() {
        let shared = shared();
        let root = Group::root(&shared);
        let n = root.create_dimension("n", 3, &OptionList::new()).unwrap();
        let dt = ExtendedDataType::string_with_max_length(5);
        let var = root
            .create_variable("names", &[n], &dt, &OptionList::new())
            .unwrap();

        var.write_strings(
            &[0],
            &[2],
            &[1],
            &[String::from("ab"), String::from("longer than five")],
        )
        .unwrap();
        let got = var.read_strings(&[0], &[3], &[1]).unwrap();
        assert_eq!(got, vec!["ab", "longe", ""]);

        // The storage row really is five bytes wide.
        let store = shared.store();
        let v = store.var_id(store.root(), "names").unwrap();
        let mut row = [0u8; 5];
        store.get_vara(v, &[0, 0], &[1, 5], &mut row).unwrap();
        assert_eq!(&row, b"ab\0\0\0");
    }

    #[test]
    fn test_variable_length_strings() {
        let shared = shared();
        let store = shared.store();
        let root = store.root();
        let d = store.def_dim(root, "n", 3, false).unwrap();
        let v = store.def_var(root, "tags", NativeType::Str, &[d]).unwrap();
        let var = Variable::created(&shared, v).unwrap();

        var.write_strings(
            &[1],
            &[2],
            &[1],
            &[String::from("alpha"), String::from("beta")],
        )
        .unwrap();
        let got = var.read_strings(&[0], &[3], &[1]).unwrap();
        assert_eq!(got, vec!["", "alpha", "beta"]);
    }

    #[test]
    fn test_nodata_round_trip_and_memoization() {
        let (_shared, var) = grid_variable(2, 2);
        var.set_raw_nodata(Some(&(-9999i32).to_ne_bytes())).unwrap();
        assert_eq!(var.nodata_as::<i32>().unwrap(), Some(-9999));

        // Unwritten cells read back as the pre-filled value.
        let back = var.read_array::<i32>(&[0, 0], &[2, 2]).unwrap();
        assert!(back.iter().all(|v| *v == -9999));

        var.set_raw_nodata(None).unwrap();
        assert_eq!(var.nodata_as::<i32>().unwrap(), None);
    }

    #[test]
    fn test_lossy_nodata_attribute_is_rejected() {
        let shared = shared();
        let store = shared.store();
        let root = store.root();
        let d = store.def_dim(root, "n", 1, false).unwrap();
        let v = store.def_var(root, "f", NativeType::Float, &[d]).unwrap();
        store
            .put_att_raw(
                AttrTarget::Var(v),
                "_FillValue",
                NativeType::Double,
                1,
                &1e300f64.to_ne_bytes(),
            )
            .unwrap();
        let var = Variable::create(&shared, v).unwrap();
        assert_eq!(var.raw_nodata().unwrap(), None);
    }

    #[test]
    fn test_default_fill_as_nodata() {
        let (_shared, var) = grid_variable(2, 2);
        assert_eq!(var.nodata_as::<i32>().unwrap(), None);
        var.set_use_default_fill_as_nodata(true);
        assert_eq!(var.nodata_as::<i32>().unwrap(), Some(-2147483647));
    }

    #[test]
    fn test_nodata_conflict_is_hard_failure() {
        let (shared, var) = grid_variable(2, 2);
        let store = shared.store();
        let target = AttrTarget::Var(var.id());
        store
            .put_att_raw(target, "_FillValue", NativeType::Int, 1, &1i32.to_ne_bytes())
            .unwrap();
        store
            .put_att_raw(target, "missing_value", NativeType::Int, 1, &2i32.to_ne_bytes())
            .unwrap();
        assert!(matches!(
            var.set_raw_nodata(Some(&3i32.to_ne_bytes())),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn test_advise_read_short_circuit() {
        let (shared, var) = grid_variable(4, 4);
        let arr = ArrayD::from_shape_vec(IxDyn(&[4, 4]), (0..16).collect()).unwrap();
        var.write_array(&[0, 0], &arr).unwrap();

        var.advise_read(&[1, 1], &[2, 2]).unwrap();

        // Mutate the store behind the cache's back; a contained read must
        // still see the materialized copy.
        let store = shared.store();
        let v = var.id();
        store.put_var1(v, &[1, 1], &(-1i32).to_ne_bytes()).unwrap();

        let cached = var.read_array::<i32>(&[1, 1], &[2, 2]).unwrap();
        assert_eq!(cached.into_raw_vec(), vec![5, 6, 9, 10]);

        // Outside the cached region the live store answers.
        let live = var.read_array::<i32>(&[0, 0], &[1, 1]).unwrap();
        assert_eq!(live.into_raw_vec(), vec![0]);

        // A write drops the cache.
        let one = ArrayD::from_shape_vec(IxDyn(&[1, 1]), vec![42]).unwrap();
        var.write_array(&[3, 3], &one).unwrap();
        let after = var.read_array::<i32>(&[1, 1], &[1, 1]).unwrap();
        assert_eq!(after.into_raw_vec(), vec![-1]);
    }

    #[test]
    fn test_rejected_write_keeps_prefill_and_cache() {
        let (shared, var) = grid_variable(2, 2);
        let dt = ExtendedDataType::numeric(NumericType::Int32);
        let stride = natural_strides(&[2, 2]);

        // An undersized buffer is rejected before any state changes.
        let short = vec![0u8; 4];
        assert!(var
            .write(&[0, 0], &[2, 2], &[1, 1], &stride, &dt, &short)
            .is_err());

        // The pre-fill window is still open: unwritten cells take the
        // new no-data value.
        var.set_raw_nodata(Some(&(-7i32).to_ne_bytes())).unwrap();
        let back = var.read_array::<i32>(&[0, 0], &[2, 2]).unwrap();
        assert_eq!(back.into_raw_vec(), vec![-7; 4]);

        // A rejected write keeps the advise-read copy as well.
        var.advise_read(&[0, 0], &[2, 2]).unwrap();
        assert!(var
            .write(&[0, 0], &[2, 2], &[1, 1], &stride, &dt, &short)
            .is_err());
        let store = shared.store();
        store
            .put_var1(var.id(), &[0, 0], &1i32.to_ne_bytes())
            .unwrap();
        let cached = var.read_array::<i32>(&[0, 0], &[2, 2]).unwrap();
        assert_eq!(cached.into_raw_vec(), vec![-7; 4]);
    }

    #[test]
    fn test_unit_scale_offset() {
        let (_shared, var) = grid_variable(2, 2);
        assert_eq!(var.unit(), "");
        var.set_unit("K").unwrap();
        assert_eq!(var.unit(), "K");

        assert_eq!(var.scale().unwrap(), None);
        var.set_scale(0.01, None).unwrap();
        var.set_offset(273.15, Some(NumericType::Float32)).unwrap();
        assert_eq!(var.scale().unwrap(), Some(0.01));
        assert_eq!(var.offset().unwrap(), Some(273.15f32 as f64));

        var.set_unit("").unwrap();
        assert_eq!(var.unit(), "");
    }

    #[test]
    fn test_attribute_listing_hides_bookkeeping() {
        let (_shared, var) = grid_variable(2, 2);
        var.set_unit("m").unwrap();
        var.set_raw_nodata(Some(&0i32.to_ne_bytes())).unwrap();
        var.create_attribute("long_name", 0, &ExtendedDataType::string())
            .unwrap();

        let names: Vec<String> = var
            .attributes(&OptionList::new())
            .unwrap()
            .iter()
            .map(|a| a.name())
            .collect();
        assert_eq!(names, vec!["long_name"]);

        let all: Vec<String> = var
            .attributes(&OptionList::new().set("SHOW_ALL", "YES"))
            .unwrap()
            .iter()
            .map(|a| a.name())
            .collect();
        assert!(all.contains(&String::from("units")));
        assert!(all.contains(&String::from("_FillValue")));
    }

    #[test]
    fn test_coordinate_variables() {
        let shared = shared();
        let root = Group::root(&shared);
        let y = root.create_dimension("y", 2, &OptionList::new()).unwrap();
        let x = root.create_dimension("x", 2, &OptionList::new()).unwrap();
        let dt = ExtendedDataType::numeric(NumericType::Float32);
        root.create_variable("lat", &[Arc::clone(&y)], &dt, &OptionList::new())
            .unwrap();
        root.create_variable("lon", &[Arc::clone(&x)], &dt, &OptionList::new())
            .unwrap();
        let temp = root
            .create_variable("temp", &[y, x], &dt, &OptionList::new())
            .unwrap();
        temp.create_attribute("coordinates", 0, &ExtendedDataType::string())
            .unwrap()
            .write_strings(&[String::from("lat lon")])
            .unwrap();

        let coords = temp.coordinate_variables().unwrap();
        let names: Vec<String> = coords.iter().map(|c| c.name().unwrap()).collect();
        assert_eq!(names, vec!["lat", "lon"]);
    }

    #[test]
    fn test_rename() {
        let (shared, var) = grid_variable(2, 2);
        var.rename("renamed").unwrap();
        assert_eq!(var.name().unwrap(), "renamed");
        assert_eq!(var.full_name().unwrap(), "/renamed");
        assert!(shared.store().var_id(shared.store().root(), "grid").is_none());
    }
}
