//! In-memory [`Store`] implementation.
//!
//! Backs the unit tests and the read-ahead cache, which materializes a
//! downloaded region as a pure in-memory store and re-reads from it. The
//! data model is deliberately literal: one record per group, dimension,
//! variable and user type, addressed by index, with variable payloads held
//! as flat row-major buffers that grow along resizable dimensions on write.

use parking_lot::Mutex;

use crate::context::imap_unit_is_elements;
use crate::errors::{Error, Result};
use crate::store::{
    AttrTarget, CompoundFieldInfo, DimId, GrpId, NativeType, StorageFormat, Store, UserTypeClass,
    UserTypeId, UserTypeInfo, VarId,
};
use crate::typemap::default_fill_value;

pub struct MemStore {
    inner: Mutex<Inner>,
    format: StorageFormat,
    version: String,
    imap_in_elements: bool,
}

struct Inner {
    define_mode: bool,
    groups: Vec<GroupData>,
    dims: Vec<DimData>,
    vars: Vec<VarData>,
    utypes: Vec<UserTypeData>,
}

struct GroupData {
    name: String,
    parent: Option<GrpId>,
    subgroups: Vec<GrpId>,
    dims: Vec<DimId>,
    vars: Vec<VarId>,
    utypes: Vec<UserTypeId>,
    atts: Vec<AttData>,
}

struct DimData {
    name: String,
    len: usize,
    unlimited: bool,
    group: GrpId,
}

struct VarData {
    name: String,
    group: GrpId,
    ty: NativeType,
    dims: Vec<DimId>,
    esize: usize,
    payload: Payload,
    /// Extent of the payload per dimension, which can lag behind the
    /// dimension length when another variable grew a shared resizable
    /// dimension.
    allocated: Vec<usize>,
    fill: Option<Vec<u8>>,
    has_written: bool,
    chunking: Option<Vec<usize>>,
    deflate: Option<u8>,
    shuffle: bool,
    checksum: bool,
    filter: Option<(u32, Vec<u32>)>,
    atts: Vec<AttData>,
}

enum Payload {
    Bytes(Vec<u8>),
    Strings(Vec<String>),
}

struct AttData {
    name: String,
    ty: NativeType,
    len: usize,
    payload: AttPayload,
}

enum AttPayload {
    Bytes(Vec<u8>),
    Text(String),
    Strings(Vec<String>),
}

struct UserTypeData {
    name: String,
    class: UserTypeClass,
    size: usize,
    base: Option<NativeType>,
    fields: Vec<CompoundFieldInfo>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::with_format(StorageFormat::V4)
    }

    pub fn with_format(format: StorageFormat) -> Self {
        Self::with_library_version(format, "4.9.2")
    }

    /// A store reporting an arbitrary library version string. Versions
    /// before 4.4 take mapped-access buffer strides in bytes, not elements.
    pub fn with_library_version(format: StorageFormat, version: &str) -> Self {
        MemStore {
            format,
            version: String::from(version),
            imap_in_elements: imap_unit_is_elements(version),
            inner: Mutex::new(Inner {
                define_mode: true,
                groups: vec![GroupData {
                    name: String::from("/"),
                    parent: None,
                    subgroups: vec![],
                    dims: vec![],
                    vars: vec![],
                    utypes: vec![],
                    atts: vec![],
                }],
                dims: vec![],
                vars: vec![],
                utypes: vec![],
            }),
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

fn product(counts: &[usize]) -> usize {
    counts.iter().product()
}

/// Row-major linear offset of `idx` within `shape`.
fn linear_offset(idx: &[usize], shape: &[usize]) -> usize {
    let mut off = 0;
    for (i, s) in idx.iter().zip(shape.iter()) {
        off = off * s + i;
    }
    off
}

impl Inner {
    fn group(&self, g: GrpId) -> Result<&GroupData> {
        self.groups
            .get(g.0 as usize)
            .ok_or_else(|| Error::store(format!("no such group id {}", g.0)))
    }

    fn group_mut(&mut self, g: GrpId) -> Result<&mut GroupData> {
        self.groups
            .get_mut(g.0 as usize)
            .ok_or_else(|| Error::store(format!("no such group id {}", g.0)))
    }

    fn dim(&self, d: DimId) -> Result<&DimData> {
        self.dims
            .get(d.0 as usize)
            .ok_or_else(|| Error::store(format!("no such dimension id {}", d.0)))
    }

    fn var(&self, v: VarId) -> Result<&VarData> {
        self.vars
            .get(v.0 as usize)
            .ok_or_else(|| Error::store(format!("no such variable id {}", v.0)))
    }

    fn var_mut(&mut self, v: VarId) -> Result<&mut VarData> {
        self.vars
            .get_mut(v.0 as usize)
            .ok_or_else(|| Error::store(format!("no such variable id {}", v.0)))
    }

    fn utype(&self, t: UserTypeId) -> Result<&UserTypeData> {
        self.utypes
            .get(t.0 as usize)
            .ok_or_else(|| Error::store(format!("no such user type id {}", t.0)))
    }

    /// `true` when `candidate` is `g` or one of its ancestors.
    fn is_visible_from(&self, g: GrpId, candidate: GrpId) -> bool {
        let mut cur = Some(g);
        while let Some(c) = cur {
            if c == candidate {
                return true;
            }
            cur = self.groups[c.0 as usize].parent;
        }
        false
    }

    fn type_size(&self, t: NativeType) -> Result<usize> {
        match t {
            NativeType::Str => Ok(std::mem::size_of::<usize>()),
            NativeType::User(id) => Ok(self.utype(id)?.size),
            other => other
                .builtin_size()
                .ok_or_else(|| Error::store("unsized native type")),
        }
    }

    fn fill_bytes(&self, var: &VarData) -> Vec<u8> {
        match &var.fill {
            Some(f) => f.clone(),
            None => default_fill_value(var.ty).unwrap_or_else(|| vec![0u8; var.esize]),
        }
    }

    fn atts(&self, target: AttrTarget) -> Result<&Vec<AttData>> {
        match target {
            AttrTarget::Group(g) => Ok(&self.group(g)?.atts),
            AttrTarget::Var(v) => Ok(&self.var(v)?.atts),
        }
    }

    fn atts_mut(&mut self, target: AttrTarget) -> Result<&mut Vec<AttData>> {
        match target {
            AttrTarget::Group(g) => Ok(&mut self.group_mut(g)?.atts),
            AttrTarget::Var(v) => Ok(&mut self.var_mut(v)?.atts),
        }
    }

    /// Validate a read/write window against the current dimension lengths.
    fn check_window(&self, var: &VarData, start: &[usize], count: &[usize]) -> Result<()> {
        if start.len() != var.dims.len() || count.len() != var.dims.len() {
            return Err(Error::store("index rank does not match variable rank"));
        }
        for (i, d) in var.dims.iter().enumerate() {
            let len = self.dim(*d)?.len;
            if count[i] == 0 || start[i] + count[i] > len {
                return Err(Error::store(format!(
                    "window [{}, +{}) exceeds dimension '{}' of length {}",
                    start[i],
                    count[i],
                    self.dim(*d)?.name,
                    len
                )));
            }
        }
        Ok(())
    }

    /// Grow dimension lengths and the payload so that the write window
    /// fits. Writes past the current extent are legal only along
    /// resizable dimensions.
    fn ensure_extent(&mut self, v: VarId, needed: &[usize]) -> Result<()> {
        let (dims, allocated) = {
            let var = self.var(v)?;
            (var.dims.clone(), var.allocated.clone())
        };
        let mut new_shape = allocated.clone();
        let mut grew = false;
        for (i, d) in dims.iter().enumerate() {
            let dim = self.dim(*d)?;
            if needed[i] > dim.len {
                if !dim.unlimited {
                    return Err(Error::store(format!(
                        "write past fixed dimension '{}' of length {}",
                        dim.name, dim.len
                    )));
                }
                self.dims[d.0 as usize].len = needed[i];
            }
            if needed[i] > new_shape[i] {
                new_shape[i] = needed[i];
                grew = true;
            }
        }
        if !grew {
            return Ok(());
        }
        let fill = self.fill_bytes(self.var(v)?);
        let var = self.var_mut(v)?;
        let new_count = product(&new_shape);
        match &mut var.payload {
            Payload::Bytes(old) => {
                let esize = var.esize;
                let mut fresh = Vec::with_capacity(new_count * esize);
                for _ in 0..new_count {
                    fresh.extend_from_slice(&fill);
                }
                // Re-index the old cells into the grown shape.
                let old_total = product(&allocated);
                let mut idx = vec![0usize; allocated.len()];
                for lin in 0..old_total {
                    let dst = linear_offset(&idx, &new_shape);
                    fresh[dst * esize..(dst + 1) * esize]
                        .copy_from_slice(&old[lin * esize..(lin + 1) * esize]);
                    for axis in (0..idx.len()).rev() {
                        idx[axis] += 1;
                        if idx[axis] < allocated[axis] {
                            break;
                        }
                        idx[axis] = 0;
                    }
                }
                *old = fresh;
            }
            Payload::Strings(old) => {
                let mut fresh = vec![String::new(); new_count];
                let old_total = product(&allocated);
                let mut idx = vec![0usize; allocated.len()];
                for lin in 0..old_total {
                    let dst = linear_offset(&idx, &new_shape);
                    fresh[dst] = std::mem::take(&mut old[lin]);
                    for axis in (0..idx.len()).rev() {
                        idx[axis] += 1;
                        if idx[axis] < allocated[axis] {
                            break;
                        }
                        idx[axis] = 0;
                    }
                }
                *old = fresh;
            }
        }
        var.allocated = new_shape;
        Ok(())
    }

    /// Copy one element out, substituting fill for cells the payload has
    /// not materialized yet.
    fn read_element(&self, v: VarId, idx: &[usize], out: &mut [u8]) -> Result<()> {
        let var = self.var(v)?;
        for (i, d) in var.dims.iter().enumerate() {
            if idx[i] >= self.dim(*d)?.len {
                return Err(Error::store(format!(
                    "index {} exceeds dimension '{}'",
                    idx[i],
                    self.dim(*d)?.name
                )));
            }
        }
        let materialized = idx.iter().zip(var.allocated.iter()).all(|(i, a)| i < a);
        match &var.payload {
            Payload::Bytes(data) => {
                if materialized {
                    let off = linear_offset(idx, &var.allocated) * var.esize;
                    out.copy_from_slice(&data[off..off + var.esize]);
                } else {
                    out.copy_from_slice(&self.fill_bytes(var));
                }
                Ok(())
            }
            Payload::Strings(_) => Err(Error::store("byte access to a string variable")),
        }
    }

    fn write_element(&mut self, v: VarId, idx: &[usize], data: &[u8]) -> Result<()> {
        let needed: Vec<usize> = idx.iter().map(|i| i + 1).collect();
        self.ensure_extent(v, &needed)?;
        let var = self.var_mut(v)?;
        match &mut var.payload {
            Payload::Bytes(buf) => {
                let off = linear_offset(idx, &var.allocated) * var.esize;
                buf[off..off + var.esize].copy_from_slice(data);
                var.has_written = true;
                Ok(())
            }
            Payload::Strings(_) => Err(Error::store("byte access to a string variable")),
        }
    }
}

/// Odometer over a count vector; calls `f` with each array index vector
/// (offset from `start` by `stride` steps), the position within the window,
/// and the running row-major ordinal.
fn for_each_index<F>(start: &[usize], count: &[usize], stride: &[isize], mut f: F) -> Result<()>
where
    F: FnMut(&[usize], &[usize], usize) -> Result<()>,
{
    let rank = count.len();
    let total = product(count);
    let mut pos = vec![0usize; rank];
    let mut idx = vec![0usize; rank];
    for lin in 0..total {
        for d in 0..rank {
            idx[d] = start[d] + pos[d] * stride[d] as usize;
        }
        f(&idx, &pos, lin)?;
        for axis in (0..rank).rev() {
            pos[axis] += 1;
            if pos[axis] < count[axis] {
                break;
            }
            pos[axis] = 0;
        }
    }
    Ok(())
}

fn check_strides(stride: &[isize], imap: &[isize]) -> Result<()> {
    if stride.iter().any(|s| *s < 1) {
        return Err(Error::store("array stride must be positive"));
    }
    if imap.iter().any(|m| *m < 0) {
        return Err(Error::store("negative buffer stride"));
    }
    Ok(())
}

impl Store for MemStore {
    fn library_version(&self) -> String {
        self.version.clone()
    }

    fn format(&self) -> StorageFormat {
        self.format
    }

    fn root(&self) -> GrpId {
        GrpId(0)
    }

    fn redef(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if self.format.distinguishes_modes() && inner.define_mode {
            return Err(Error::store("already in definition mode"));
        }
        inner.define_mode = true;
        Ok(())
    }

    fn enddef(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if self.format.distinguishes_modes() && !inner.define_mode {
            return Err(Error::store("not in definition mode"));
        }
        inner.define_mode = false;
        Ok(())
    }

    fn group_name(&self, g: GrpId) -> Result<String> {
        Ok(self.inner.lock().group(g)?.name.clone())
    }

    fn group_parent(&self, g: GrpId) -> Option<GrpId> {
        self.inner.lock().group(g).ok()?.parent
    }

    fn subgroups(&self, g: GrpId) -> Result<Vec<GrpId>> {
        Ok(self.inner.lock().group(g)?.subgroups.clone())
    }

    fn subgroup(&self, g: GrpId, name: &str) -> Option<GrpId> {
        let inner = self.inner.lock();
        let group = inner.group(g).ok()?;
        group
            .subgroups
            .iter()
            .copied()
            .find(|s| inner.groups[s.0 as usize].name == name)
    }

    fn def_group(&self, g: GrpId, name: &str) -> Result<GrpId> {
        let mut inner = self.inner.lock();
        let parent = inner.group(g)?;
        if parent
            .subgroups
            .iter()
            .any(|s| inner.groups[s.0 as usize].name == name)
        {
            return Err(Error::store(format!("group '{}' already exists", name)));
        }
        let id = GrpId(inner.groups.len() as u32);
        inner.groups.push(GroupData {
            name: name.to_string(),
            parent: Some(g),
            subgroups: vec![],
            dims: vec![],
            vars: vec![],
            utypes: vec![],
            atts: vec![],
        });
        inner.group_mut(g)?.subgroups.push(id);
        Ok(id)
    }

    fn rename_group(&self, g: GrpId, name: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if g == GrpId(0) {
            return Err(Error::store("cannot rename the root group"));
        }
        inner.group_mut(g)?.name = name.to_string();
        Ok(())
    }

    fn dim_ids(&self, g: GrpId) -> Result<Vec<DimId>> {
        Ok(self.inner.lock().group(g)?.dims.clone())
    }

    fn dim_id(&self, g: GrpId, name: &str) -> Option<DimId> {
        let inner = self.inner.lock();
        let group = inner.group(g).ok()?;
        group
            .dims
            .iter()
            .copied()
            .find(|d| inner.dims[d.0 as usize].name == name)
    }

    fn dim_name(&self, d: DimId) -> Result<String> {
        Ok(self.inner.lock().dim(d)?.name.clone())
    }

    fn dim_len(&self, d: DimId) -> Result<usize> {
        Ok(self.inner.lock().dim(d)?.len)
    }

    fn dim_group(&self, d: DimId) -> Result<GrpId> {
        Ok(self.inner.lock().dim(d)?.group)
    }

    fn def_dim(&self, g: GrpId, name: &str, len: usize, unlimited: bool) -> Result<DimId> {
        let mut inner = self.inner.lock();
        if inner
            .group(g)?
            .dims
            .iter()
            .any(|d| inner.dims[d.0 as usize].name == name)
        {
            return Err(Error::store(format!("dimension '{}' already exists", name)));
        }
        if unlimited
            && self.format != StorageFormat::V4
            && inner.dims.iter().any(|d| d.unlimited)
        {
            return Err(Error::store(
                "classic formats allow a single resizable dimension",
            ));
        }
        let id = DimId(inner.dims.len() as u32);
        inner.dims.push(DimData {
            name: name.to_string(),
            len,
            unlimited,
            group: g,
        });
        inner.group_mut(g)?.dims.push(id);
        Ok(id)
    }

    fn rename_dim(&self, d: DimId, name: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let g = inner.dim(d)?.group;
        let clash = inner
            .group(g)?
            .dims
            .iter()
            .any(|other| *other != d && inner.dims[other.0 as usize].name == name);
        if clash {
            return Err(Error::store(format!("dimension '{}' already exists", name)));
        }
        inner.dims[d.0 as usize].name = name.to_string();
        Ok(())
    }

    fn unlimited_dim_ids(&self, g: GrpId) -> Result<Vec<DimId>> {
        let inner = self.inner.lock();
        inner.group(g)?;
        let mut out = Vec::new();
        for (i, d) in inner.dims.iter().enumerate() {
            if d.unlimited && inner.is_visible_from(g, d.group) {
                out.push(DimId(i as u32));
            }
        }
        Ok(out)
    }

    fn var_ids(&self, g: GrpId) -> Result<Vec<VarId>> {
        Ok(self.inner.lock().group(g)?.vars.clone())
    }

    fn var_id(&self, g: GrpId, name: &str) -> Option<VarId> {
        let inner = self.inner.lock();
        let group = inner.group(g).ok()?;
        group
            .vars
            .iter()
            .copied()
            .find(|v| inner.vars[v.0 as usize].name == name)
    }

    fn var_name(&self, v: VarId) -> Result<String> {
        Ok(self.inner.lock().var(v)?.name.clone())
    }

    fn var_group(&self, v: VarId) -> Result<GrpId> {
        Ok(self.inner.lock().var(v)?.group)
    }

    fn var_type(&self, v: VarId) -> Result<NativeType> {
        Ok(self.inner.lock().var(v)?.ty)
    }

    fn var_dim_ids(&self, v: VarId) -> Result<Vec<DimId>> {
        Ok(self.inner.lock().var(v)?.dims.clone())
    }

    fn def_var(&self, g: GrpId, name: &str, t: NativeType, dims: &[DimId]) -> Result<VarId> {
        let mut inner = self.inner.lock();
        if inner
            .group(g)?
            .vars
            .iter()
            .any(|v| inner.vars[v.0 as usize].name == name)
        {
            return Err(Error::store(format!("variable '{}' already exists", name)));
        }
        let mut lens = Vec::with_capacity(dims.len());
        for d in dims {
            let dim = inner.dim(*d)?;
            if !inner.is_visible_from(g, dim.group) {
                return Err(Error::store(format!(
                    "dimension '{}' is not visible from this group",
                    dim.name
                )));
            }
            lens.push(dim.len);
        }
        let esize = inner.type_size(t)?;
        let total = product(&lens);
        let payload = match t {
            NativeType::Str => Payload::Strings(vec![String::new(); total]),
            _ => {
                let fill = default_fill_value(t).unwrap_or_else(|| vec![0u8; esize]);
                let mut buf = Vec::with_capacity(total * esize);
                for _ in 0..total {
                    buf.extend_from_slice(&fill);
                }
                Payload::Bytes(buf)
            }
        };
        let id = VarId(inner.vars.len() as u32);
        inner.vars.push(VarData {
            name: name.to_string(),
            group: g,
            ty: t,
            dims: dims.to_vec(),
            esize,
            payload,
            allocated: lens,
            fill: None,
            has_written: false,
            chunking: None,
            deflate: None,
            shuffle: false,
            checksum: false,
            filter: None,
            atts: vec![],
        });
        inner.group_mut(g)?.vars.push(id);
        Ok(id)
    }

    fn rename_var(&self, v: VarId, name: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let g = inner.var(v)?.group;
        let clash = inner
            .group(g)?
            .vars
            .iter()
            .any(|other| *other != v && inner.vars[other.0 as usize].name == name);
        if clash {
            return Err(Error::store(format!("variable '{}' already exists", name)));
        }
        inner.vars[v.0 as usize].name = name.to_string();
        Ok(())
    }

    fn var_chunking(&self, v: VarId) -> Result<Option<Vec<usize>>> {
        Ok(self.inner.lock().var(v)?.chunking.clone())
    }

    fn set_var_chunking(&self, v: VarId, chunks: &[usize]) -> Result<()> {
        let mut inner = self.inner.lock();
        if chunks.len() != inner.var(v)?.dims.len() {
            return Err(Error::store("chunking rank does not match variable rank"));
        }
        inner.var_mut(v)?.chunking = Some(chunks.to_vec());
        Ok(())
    }

    fn var_deflate(&self, v: VarId) -> Result<Option<u8>> {
        Ok(self.inner.lock().var(v)?.deflate)
    }

    fn set_var_deflate(&self, v: VarId, shuffle: bool, level: u8) -> Result<()> {
        let mut inner = self.inner.lock();
        let var = inner.var_mut(v)?;
        var.deflate = Some(level);
        var.shuffle = shuffle;
        Ok(())
    }

    fn set_var_filter(&self, v: VarId, filter_id: u32, params: &[u32]) -> Result<()> {
        self.inner.lock().var_mut(v)?.filter = Some((filter_id, params.to_vec()));
        Ok(())
    }

    fn set_var_checksum(&self, v: VarId, enabled: bool) -> Result<()> {
        self.inner.lock().var_mut(v)?.checksum = enabled;
        Ok(())
    }

    fn set_var_fill(&self, v: VarId, fill: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let var = inner.var_mut(v)?;
        if fill.len() != var.esize {
            return Err(Error::store("fill value size does not match element size"));
        }
        var.fill = Some(fill.to_vec());
        if !var.has_written {
            if let Payload::Bytes(buf) = &mut var.payload {
                let esize = var.esize;
                for cell in buf.chunks_exact_mut(esize) {
                    cell.copy_from_slice(fill);
                }
            }
        }
        Ok(())
    }

    fn type_id_by_name(&self, g: GrpId, name: &str) -> Option<UserTypeId> {
        let inner = self.inner.lock();
        let mut cur = Some(g);
        while let Some(c) = cur {
            let group = inner.group(c).ok()?;
            if let Some(t) = group
                .utypes
                .iter()
                .copied()
                .find(|t| inner.utypes[t.0 as usize].name == name)
            {
                return Some(t);
            }
            cur = group.parent;
        }
        None
    }

    fn user_type_info(&self, t: UserTypeId) -> Result<UserTypeInfo> {
        let inner = self.inner.lock();
        let ut = inner.utype(t)?;
        Ok(UserTypeInfo {
            name: ut.name.clone(),
            class: ut.class,
            size: ut.size,
            base: ut.base,
            field_count: ut.fields.len(),
        })
    }

    fn compound_field(&self, t: UserTypeId, index: usize) -> Result<CompoundFieldInfo> {
        let inner = self.inner.lock();
        inner
            .utype(t)?
            .fields
            .get(index)
            .cloned()
            .ok_or_else(|| Error::store("compound field index out of range"))
    }

    fn def_compound(&self, g: GrpId, name: &str, size: usize) -> Result<UserTypeId> {
        let mut inner = self.inner.lock();
        if inner
            .group(g)?
            .utypes
            .iter()
            .any(|t| inner.utypes[t.0 as usize].name == name)
        {
            return Err(Error::store(format!("type '{}' already exists", name)));
        }
        let id = UserTypeId(inner.utypes.len() as u32);
        inner.utypes.push(UserTypeData {
            name: name.to_string(),
            class: UserTypeClass::Compound,
            size,
            base: None,
            fields: vec![],
        });
        inner.group_mut(g)?.utypes.push(id);
        Ok(id)
    }

    fn insert_compound_field(
        &self,
        t: UserTypeId,
        name: &str,
        offset: usize,
        field: NativeType,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let fsize = inner.type_size(field)?;
        let ut = inner
            .utypes
            .get_mut(t.0 as usize)
            .ok_or_else(|| Error::store("no such user type"))?;
        if ut.class != UserTypeClass::Compound {
            return Err(Error::store("not a compound type"));
        }
        if offset + fsize > ut.size {
            return Err(Error::store("field does not fit in compound size"));
        }
        ut.fields.push(CompoundFieldInfo {
            name: name.to_string(),
            offset,
            datatype: field,
            rank: 0,
        });
        Ok(())
    }

    fn type_size(&self, t: NativeType) -> Result<usize> {
        self.inner.lock().type_size(t)
    }

    fn att_names(&self, target: AttrTarget) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        Ok(inner.atts(target)?.iter().map(|a| a.name.clone()).collect())
    }

    fn att_info(&self, target: AttrTarget, name: &str) -> Option<(NativeType, usize)> {
        let inner = self.inner.lock();
        inner
            .atts(target)
            .ok()?
            .iter()
            .find(|a| a.name == name)
            .map(|a| (a.ty, a.len))
    }

    fn get_att_raw(&self, target: AttrTarget, name: &str) -> Result<Vec<u8>> {
        let inner = self.inner.lock();
        let att = inner
            .atts(target)?
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| Error::store(format!("no attribute '{}'", name)))?;
        match &att.payload {
            AttPayload::Bytes(b) => Ok(b.clone()),
            AttPayload::Text(t) => Ok(t.as_bytes().to_vec()),
            AttPayload::Strings(_) => Err(Error::store("raw access to a string attribute")),
        }
    }

    fn put_att_raw(
        &self,
        target: AttrTarget,
        name: &str,
        t: NativeType,
        len: usize,
        data: &[u8],
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let esize = inner.type_size(t)?;
        if data.len() != len * esize {
            return Err(Error::store("attribute payload size mismatch"));
        }
        let atts = inner.atts_mut(target)?;
        atts.retain(|a| a.name != name);
        atts.push(AttData {
            name: name.to_string(),
            ty: t,
            len,
            payload: AttPayload::Bytes(data.to_vec()),
        });
        Ok(())
    }

    fn get_att_text(&self, target: AttrTarget, name: &str) -> Result<String> {
        let inner = self.inner.lock();
        let att = inner
            .atts(target)?
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| Error::store(format!("no attribute '{}'", name)))?;
        match &att.payload {
            AttPayload::Text(t) => Ok(t.clone()),
            AttPayload::Bytes(b) if att.ty == NativeType::Char => {
                Ok(String::from_utf8_lossy(b).into_owned())
            }
            AttPayload::Strings(s) if s.len() == 1 => Ok(s[0].clone()),
            _ => Err(Error::store("text access to a non-text attribute")),
        }
    }

    fn put_att_text(&self, target: AttrTarget, name: &str, text: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let atts = inner.atts_mut(target)?;
        atts.retain(|a| a.name != name);
        atts.push(AttData {
            name: name.to_string(),
            ty: NativeType::Char,
            len: text.len(),
            payload: AttPayload::Text(text.to_string()),
        });
        Ok(())
    }

    fn get_att_strings(&self, target: AttrTarget, name: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        let att = inner
            .atts(target)?
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| Error::store(format!("no attribute '{}'", name)))?;
        match &att.payload {
            AttPayload::Strings(s) => Ok(s.clone()),
            AttPayload::Text(t) => Ok(vec![t.clone()]),
            AttPayload::Bytes(_) => Err(Error::store("string access to a numeric attribute")),
        }
    }

    fn put_att_strings(&self, target: AttrTarget, name: &str, values: &[String]) -> Result<()> {
        let mut inner = self.inner.lock();
        let atts = inner.atts_mut(target)?;
        atts.retain(|a| a.name != name);
        atts.push(AttData {
            name: name.to_string(),
            ty: NativeType::Str,
            len: values.len(),
            payload: AttPayload::Strings(values.to_vec()),
        });
        Ok(())
    }

    fn rename_att(&self, target: AttrTarget, name: &str, new_name: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let atts = inner.atts_mut(target)?;
        if atts.iter().any(|a| a.name == new_name) {
            return Err(Error::store(format!("attribute '{}' already exists", new_name)));
        }
        match atts.iter_mut().find(|a| a.name == name) {
            Some(att) => {
                att.name = new_name.to_string();
                Ok(())
            }
            None => Err(Error::store(format!("no attribute '{}'", name))),
        }
    }

    fn del_att(&self, target: AttrTarget, name: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let atts = inner.atts_mut(target)?;
        let before = atts.len();
        atts.retain(|a| a.name != name);
        if atts.len() == before {
            return Err(Error::store(format!("no attribute '{}'", name)));
        }
        Ok(())
    }

    fn get_var1(&self, v: VarId, idx: &[usize], out: &mut [u8]) -> Result<()> {
        let inner = self.inner.lock();
        if idx.len() != inner.var(v)?.dims.len() {
            return Err(Error::store("index rank does not match variable rank"));
        }
        inner.read_element(v, idx, out)
    }

    fn put_var1(&self, v: VarId, idx: &[usize], data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if idx.len() != inner.var(v)?.dims.len() {
            return Err(Error::store("index rank does not match variable rank"));
        }
        inner.write_element(v, idx, data)
    }

    fn get_vara(&self, v: VarId, start: &[usize], count: &[usize], out: &mut [u8]) -> Result<()> {
        let inner = self.inner.lock();
        let var = inner.var(v)?;
        inner.check_window(var, start, count)?;
        let esize = var.esize;
        if out.len() < product(count) * esize {
            return Err(Error::store("output buffer too small"));
        }
        let ones = vec![1isize; count.len()];
        for_each_index(start, count, &ones, |idx, _, lin| {
            inner.read_element(v, idx, &mut out[lin * esize..(lin + 1) * esize])
        })
    }

    fn put_vara(&self, v: VarId, start: &[usize], count: &[usize], data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let (rank, esize) = {
            let var = inner.var(v)?;
            (var.dims.len(), var.esize)
        };
        if start.len() != rank || count.len() != rank {
            return Err(Error::store("index rank does not match variable rank"));
        }
        if data.len() < product(count) * esize {
            return Err(Error::store("input buffer too small"));
        }
        let needed: Vec<usize> = start.iter().zip(count.iter()).map(|(s, c)| s + c).collect();
        inner.ensure_extent(v, &needed)?;
        let ones = vec![1isize; count.len()];
        for_each_index(start, count, &ones, |idx, _, lin| {
            inner.write_element(v, idx, &data[lin * esize..(lin + 1) * esize])
        })
    }

    fn get_varm(
        &self,
        v: VarId,
        start: &[usize],
        count: &[usize],
        stride: &[isize],
        imap: &[isize],
        out: &mut [u8],
    ) -> Result<()> {
        check_strides(stride, imap)?;
        let inner = self.inner.lock();
        let var = inner.var(v)?;
        let esize = var.esize;
        // Window bounds with stride applied.
        for (i, d) in var.dims.iter().enumerate() {
            let last = start[i] + (count[i] - 1) * stride[i] as usize;
            if last >= inner.dim(*d)?.len {
                return Err(Error::store(format!(
                    "strided window exceeds dimension '{}'",
                    inner.dim(*d)?.name
                )));
            }
        }
        for_each_index(start, count, stride, |idx, pos, _| {
            let off: usize = pos
                .iter()
                .zip(imap.iter())
                .map(|(p, m)| p * *m as usize)
                .sum();
            let byte = if self.imap_in_elements { off * esize } else { off };
            inner.read_element(v, idx, &mut out[byte..byte + esize])
        })
    }

    fn put_varm(
        &self,
        v: VarId,
        start: &[usize],
        count: &[usize],
        stride: &[isize],
        imap: &[isize],
        data: &[u8],
    ) -> Result<()> {
        check_strides(stride, imap)?;
        let mut inner = self.inner.lock();
        let esize = inner.var(v)?.esize;
        let needed: Vec<usize> = start
            .iter()
            .zip(count.iter().zip(stride.iter()))
            .map(|(s, (c, st))| s + (c - 1) * *st as usize + 1)
            .collect();
        inner.ensure_extent(v, &needed)?;
        let in_elements = self.imap_in_elements;
        for_each_index(start, count, stride, |idx, pos, _| {
            let off: usize = pos
                .iter()
                .zip(imap.iter())
                .map(|(p, m)| p * *m as usize)
                .sum();
            let byte = if in_elements { off * esize } else { off };
            inner.write_element(v, idx, &data[byte..byte + esize])
        })
    }

    fn get_var1_string(&self, v: VarId, idx: &[usize]) -> Result<String> {
        let inner = self.inner.lock();
        let var = inner.var(v)?;
        for (i, d) in var.dims.iter().enumerate() {
            if idx[i] >= inner.dim(*d)?.len {
                return Err(Error::store("index exceeds dimension"));
            }
        }
        match &var.payload {
            Payload::Strings(data) => {
                let materialized = idx.iter().zip(var.allocated.iter()).all(|(i, a)| i < a);
                if materialized {
                    Ok(data[linear_offset(idx, &var.allocated)].clone())
                } else {
                    Ok(String::new())
                }
            }
            Payload::Bytes(_) => Err(Error::store("string access to a numeric variable")),
        }
    }

    fn put_var1_string(&self, v: VarId, idx: &[usize], value: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let needed: Vec<usize> = idx.iter().map(|i| i + 1).collect();
        inner.ensure_extent(v, &needed)?;
        let var = inner.var_mut(v)?;
        match &mut var.payload {
            Payload::Strings(data) => {
                data[linear_offset(idx, &var.allocated)] = value.to_string();
                var.has_written = true;
                Ok(())
            }
            Payload::Bytes(_) => Err(Error::store("string access to a numeric variable")),
        }
    }
}
