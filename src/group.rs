//! Group hierarchy: enumeration with name filters, creation of child
//! entities, and the virtual grouping of 1-D variables by shared
//! dimension.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::attribute::Attribute;
use crate::context::SharedResources;
use crate::dimension::Dimension;
use crate::errors::{Error, Result};
use crate::options::OptionList;
use crate::store::{AttrTarget, DimId, GrpId, NativeType};
use crate::typemap::create_or_get_type;
use crate::types::{DataClass, ExtendedDataType, NumericType};
use crate::variable::Variable;

/// Full path of a group, `/` for the root.
pub(crate) fn group_full_name(shared: &SharedResources, g: GrpId) -> Result<String> {
    let store = shared.store();
    let mut parts = Vec::new();
    let mut cur = g;
    while let Some(parent) = store.group_parent(cur) {
        parts.push(store.group_name(cur)?);
        cur = parent;
    }
    if parts.is_empty() {
        return Ok(String::from("/"));
    }
    parts.reverse();
    Ok(format!("/{}", parts.join("/")))
}

fn att_text(shared: &SharedResources, target: AttrTarget, name: &str) -> Option<String> {
    let store = shared.store();
    match store.get_att_text(target, name) {
        Ok(t) => Some(t),
        Err(_) => match store.get_att_strings(target, name) {
            Ok(vals) if vals.len() == 1 => Some(vals[0].clone()),
            _ => None,
        },
    }
}

/// A real group, or the virtual grouping of the 1-D variables sharing one
/// dimension.
pub enum GroupView {
    Native(Arc<Group>),
    ByDimension(Arc<VirtualGroup>),
}

impl GroupView {
    pub fn name(&self) -> Result<String> {
        match self {
            Self::Native(g) => g.name(),
            Self::ByDimension(g) => Ok(g.name().to_string()),
        }
    }

    pub fn variable_names(&self, options: &OptionList) -> Result<Vec<String>> {
        match self {
            Self::Native(g) => g.variable_names(options),
            Self::ByDimension(g) => g.variable_names(),
        }
    }

    pub fn open_variable(
        &self,
        name: &str,
        options: &OptionList,
    ) -> Result<Option<Arc<Variable>>> {
        match self {
            Self::Native(g) => g.open_variable(name, options),
            Self::ByDimension(g) => g.open_variable(name, options),
        }
    }
}

pub struct Group {
    shared: Arc<SharedResources>,
    id: GrpId,
}

impl Group {
    pub fn root(shared: &Arc<SharedResources>) -> Arc<Group> {
        Arc::new(Group {
            shared: Arc::clone(shared),
            id: shared.store().root(),
        })
    }

    pub fn name(&self) -> Result<String> {
        let _guard = self.shared.lock();
        self.shared.store().group_name(self.id)
    }

    pub fn full_name(&self) -> Result<String> {
        let _guard = self.shared.lock();
        group_full_name(&self.shared, self.id)
    }

    /// Structural facts about the underlying container.
    pub fn structural_info(&self) -> Vec<(String, String)> {
        vec![(
            String::from("NC_FORMAT"),
            self.shared.store().format().structural_name().to_string(),
        )]
    }

    /// Child group names. On a flat store, `GROUP_BY=SAME_DIMENSION`
    /// instead lists one virtual group per dimension indexing 1-D
    /// variables.
    pub fn group_names(&self, options: &OptionList) -> Result<Vec<String>> {
        let _guard = self.shared.lock();
        let store = self.shared.store();
        let subgroups = store.subgroups(self.id)?;
        if subgroups.is_empty() {
            if options
                .get("GROUP_BY")
                .is_some_and(|v| v.eq_ignore_ascii_case("SAME_DIMENSION"))
            {
                let mut seen = HashSet::new();
                let mut names = Vec::new();
                for name in self.variable_names(&OptionList::new())? {
                    if let Some(v) = store.var_id(self.id, &name) {
                        let dims = store.var_dim_ids(v)?;
                        if dims.len() == 1 {
                            let dim_name = store.dim_name(dims[0])?;
                            if seen.insert(dim_name.clone()) {
                                names.push(dim_name);
                            }
                        }
                    }
                }
                return Ok(names);
            }
            return Ok(vec![]);
        }
        subgroups
            .into_iter()
            .map(|g| store.group_name(g))
            .collect()
    }

    pub fn open_group(&self, name: &str, options: &OptionList) -> Result<Option<GroupView>> {
        let _guard = self.shared.lock();
        let store = self.shared.store();
        if store.subgroups(self.id)?.is_empty() {
            if options
                .get("GROUP_BY")
                .is_some_and(|v| v.eq_ignore_ascii_case("SAME_DIMENSION"))
                && self.group_names(options)?.iter().any(|n| n == name)
            {
                let this = Arc::new(Group {
                    shared: Arc::clone(&self.shared),
                    id: self.id,
                });
                return Ok(Some(GroupView::ByDimension(Arc::new(VirtualGroup {
                    group: this,
                    dim_name: name.to_string(),
                }))));
            }
            return Ok(None);
        }
        match store.subgroup(self.id, name) {
            Some(sub) => Ok(Some(GroupView::Native(Arc::new(Group {
                shared: Arc::clone(&self.shared),
                id: sub,
            })))),
            None => Ok(None),
        }
    }

    /// Variable names, filtered:
    /// - `SHOW_ALL` (default NO) disables every filter below;
    /// - `SHOW_ZERO_DIM` (default NO) includes scalar variables;
    /// - `SHOW_COORDINATES` (default YES) includes variables referenced by
    ///   a `coordinates` attribute;
    /// - `SHOW_BOUNDS` (default YES) likewise for `bounds`;
    /// - `SHOW_INDEXING` (default YES) includes 1-D variables named after
    ///   their dimension;
    /// - `SHOW_TIME` (default YES) includes variables whose standard name
    ///   is `time`;
    /// - `GROUP_BY=SAME_DIMENSION` hides 1-D variables, which surface in
    ///   the virtual groups instead.
    pub fn variable_names(&self, options: &OptionList) -> Result<Vec<String>> {
        let _guard = self.shared.lock();
        let store = self.shared.store();
        let vars = store.var_ids(self.id)?;
        let all = options.get_bool("SHOW_ALL", false);
        let zero_dim = all || options.get_bool("SHOW_ZERO_DIM", false);
        let coordinates = all || options.get_bool("SHOW_COORDINATES", true);
        let bounds = all || options.get_bool("SHOW_BOUNDS", true);
        let indexing = all || options.get_bool("SHOW_INDEXING", true);
        let time = all || options.get_bool("SHOW_TIME", true);
        let group_by_dim = options
            .get("GROUP_BY")
            .is_some_and(|v| v.eq_ignore_ascii_case("SAME_DIMENSION"));

        let mut ignored = HashSet::new();
        if !coordinates || !bounds {
            for v in &vars {
                let target = AttrTarget::Var(*v);
                if !coordinates {
                    if let Some(coords) = att_text(&self.shared, target, "coordinates") {
                        for token in coords.split_whitespace() {
                            ignored.insert(token.to_string());
                        }
                    }
                }
                if !bounds {
                    if let Some(b) = att_text(&self.shared, target, "bounds") {
                        if !b.is_empty() {
                            ignored.insert(b);
                        }
                    }
                }
            }
        }

        let mut names = Vec::new();
        for v in vars {
            let dims = store.var_dim_ids(v)?;
            if dims.is_empty() && !zero_dim {
                continue;
            }
            if dims.len() == 1 && group_by_dim {
                continue;
            }
            let name = store.var_name(v)?;
            if !indexing && dims.len() == 1 && store.dim_name(dims[0])? == name {
                continue;
            }
            if !time
                && att_text(&self.shared, AttrTarget::Var(v), "standard_name").as_deref()
                    == Some("time")
            {
                continue;
            }
            if ignored.contains(&name) {
                continue;
            }
            names.push(name);
        }
        Ok(names)
    }

    /// Open a variable. `USE_DEFAULT_FILL_AS_NODATA` (default NO) makes
    /// the format's default fill value act as the no-data value when no
    /// explicit one is recorded.
    pub fn open_variable(
        &self,
        name: &str,
        options: &OptionList,
    ) -> Result<Option<Arc<Variable>>> {
        let _guard = self.shared.lock();
        let v = match self.shared.store().var_id(self.id, name) {
            Some(v) => v,
            None => return Ok(None),
        };
        let var = Variable::create(&self.shared, v)?;
        var.set_use_default_fill_as_nodata(
            options.get_bool("USE_DEFAULT_FILL_AS_NODATA", false),
        );
        Ok(Some(var))
    }

    /// Dimensions declared directly in this group.
    pub fn dimensions(&self) -> Result<Vec<Arc<Dimension>>> {
        let _guard = self.shared.lock();
        self.shared
            .store()
            .dim_ids(self.id)?
            .into_iter()
            .map(|d| Dimension::open(&self.shared, d))
            .collect()
    }

    pub fn attribute(&self, name: &str) -> Result<Option<Arc<Attribute>>> {
        Attribute::open(&self.shared, AttrTarget::Group(self.id), name)
    }

    pub fn attributes(&self) -> Result<Vec<Arc<Attribute>>> {
        let _guard = self.shared.lock();
        let mut out = Vec::new();
        for name in self.shared.store().att_names(AttrTarget::Group(self.id))? {
            // Library bookkeeping, not user metadata.
            if name == "_NCProperties" {
                continue;
            }
            if let Some(att) = Attribute::open(&self.shared, AttrTarget::Group(self.id), &name)? {
                out.push(att);
            }
        }
        Ok(out)
    }

    /// Create a global attribute of `length` elements (0 for a scalar).
    pub fn create_attribute(
        &self,
        name: &str,
        length: usize,
        dt: &ExtendedDataType,
    ) -> Result<Arc<Attribute>> {
        Attribute::new(
            &self.shared,
            AttrTarget::Group(self.id),
            self.id,
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
        self.shared
            .store()
            .del_att(AttrTarget::Group(self.id), name)
    }

    pub fn create_group(&self, name: &str) -> Result<Arc<Group>> {
        if self.shared.read_only() {
            return Err(Error::ReadOnly);
        }
        if name.is_empty() {
            return Err(Error::invalid("empty group name"));
        }
        let _guard = self.shared.lock();
        self.shared.set_define_mode(true)?;
        let sub = self.shared.store().def_group(self.id, name)?;
        Ok(Arc::new(Group {
            shared: Arc::clone(&self.shared),
            id: sub,
        }))
    }

    /// Create a dimension. `UNLIMITED=YES` makes it resizable; its stored
    /// length still starts at `size`.
    pub fn create_dimension(
        &self,
        name: &str,
        size: u64,
        options: &OptionList,
    ) -> Result<Arc<Dimension>> {
        if self.shared.read_only() {
            return Err(Error::ReadOnly);
        }
        if name.is_empty() {
            return Err(Error::invalid("empty dimension name"));
        }
        let unlimited = options.get_bool("UNLIMITED", false);
        let size = usize::try_from(size).map_err(|_| Error::invalid("dimension size overflow"))?;
        let _guard = self.shared.lock();
        self.shared.set_define_mode(true)?;
        let d = self
            .shared
            .store()
            .def_dim(self.id, name, size, unlimited)?;
        let dim = Dimension::create(&self.shared, d, None, None)?;
        self.shared.cache_dimension(d, &dim);
        Ok(dim)
    }

    /// Create a variable over `dims`.
    ///
    /// Options: `NC_TYPE` forces the native type (`NC_CHAR`, `NC_BYTE`,
    /// `NC_INT64`, `NC_UINT64`); `BLOCKSIZE=n,n,...` sets chunking;
    /// `COMPRESS=DEFLATE` with `ZLEVEL` enables compression; `FILTER=id,p...`
    /// attaches a filter; `CHECKSUM=YES` enables checksums.
    ///
    /// A 1-D variable of bounded-string type is realized as fixed-width
    /// character storage with a synthetic trailing length dimension.
    pub fn create_variable(
        &self,
        name: &str,
        dims: &[Arc<Dimension>],
        dt: &ExtendedDataType,
        options: &OptionList,
    ) -> Result<Arc<Variable>> {
        if self.shared.read_only() {
            return Err(Error::ReadOnly);
        }
        if name.is_empty() {
            return Err(Error::invalid("empty variable name"));
        }
        let _guard = self.shared.lock();
        self.shared.set_define_mode(true)?;
        let store = self.shared.store();

        // A dimension wrapper is used by id only when it belongs to this
        // store; anything else contributes its name and size, resolving to
        // an existing same-named dimension here or creating one.
        let mut dim_ids: Vec<DimId> = Vec::with_capacity(dims.len());
        for dim in dims {
            if dim.belongs_to(&self.shared) {
                dim_ids.push(dim.id());
                continue;
            }
            let dim_name = dim.name()?;
            let size = usize::try_from(dim.size()?)
                .map_err(|_| Error::invalid("dimension size overflow"))?;
            match store.dim_id(self.id, &dim_name) {
                Some(existing) => {
                    let existing_len = store.dim_len(existing)?;
                    if existing_len != size {
                        warn!(
                            dimension = %dim_name,
                            requested = size,
                            existing = existing_len,
                            "a dimension with this name already exists with another size"
                        );
                    }
                    dim_ids.push(existing);
                }
                None => {
                    dim_ids.push(store.def_dim(self.id, &dim_name, size, dim.is_resizable()?)?)
                }
            }
        }
        let forced = options.get_default("NC_TYPE", "");
        let char_string = (forced.is_empty() || forced.eq_ignore_ascii_case("NC_CHAR"))
            && dims.len() == 1
            && dt.class() == DataClass::String
            && dt.max_string_length() > 0;

        let native = if char_string {
            let len_name = format!("{}_length", dims[0].name()?);
            let len_dim = match store.dim_id(self.id, &len_name) {
                Some(d) => d,
                None => store.def_dim(self.id, &len_name, dt.max_string_length(), false)?,
            };
            dim_ids.push(len_dim);
            NativeType::Char
        } else if forced.eq_ignore_ascii_case("NC_BYTE") {
            NativeType::SChar
        } else if forced.eq_ignore_ascii_case("NC_INT64") {
            NativeType::Int64
        } else if forced.eq_ignore_ascii_case("NC_UINT64") {
            NativeType::UInt64
        } else {
            create_or_get_type(store, self.id, dt)?
        };

        let v = store.def_var(self.id, name, native, &dim_ids)?;

        // Classic formats spell the unsigned byte as signed storage; mark
        // it so reads map back.
        if native == NativeType::SChar && dt.numeric_type() == Some(NumericType::UInt8) {
            store.put_att_text(AttrTarget::Var(v), "_Unsigned", "true")?;
        }

        if let Some(blocksize) = options.get("BLOCKSIZE") {
            // Chunking over the caller's axes; not applicable when a string
            // variable gained a synthetic length dimension.
            if dim_ids.len() == dims.len() {
                let chunks: Vec<usize> = blocksize
                    .split(',')
                    .map(|t| t.trim().parse::<usize>())
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|_| Error::invalid("invalid BLOCKSIZE value"))?;
                if chunks.len() != dims.len() {
                    return Err(Error::invalid("invalid number of values in BLOCKSIZE"));
                }
                if !chunks.is_empty() {
                    store.set_var_chunking(v, &chunks)?;
                }
            }
        }

        if options
            .get("COMPRESS")
            .is_some_and(|c| c.eq_ignore_ascii_case("DEFLATE"))
        {
            let level = match options.get("ZLEVEL") {
                Some(z) => match z.parse::<u8>() {
                    Ok(l) if (1..=9).contains(&l) => l,
                    _ => {
                        warn!(zlevel = %z, "ZLEVEL value not recognised, using default");
                        1
                    }
                },
                None => 1,
            };
            store.set_var_deflate(v, true, level)?;
        }

        if let Some(filter) = options.get("FILTER") {
            let tokens: Vec<u32> = filter
                .split(',')
                .map(|t| t.trim().parse::<u32>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|_| Error::invalid("invalid FILTER value"))?;
            if let Some((id, params)) = tokens.split_first() {
                store.set_var_filter(v, *id, params)?;
            }
        }

        if options.get_bool("CHECKSUM", false) {
            store.set_var_checksum(v, true)?;
        }

        let var = Variable::created(&self.shared, v)?;
        var.set_use_default_fill_as_nodata(
            options.get_bool("USE_DEFAULT_FILL_AS_NODATA", false),
        );
        Ok(var)
    }

    pub fn rename(&self, new_name: &str) -> Result<()> {
        if self.shared.read_only() {
            return Err(Error::ReadOnly);
        }
        if new_name.is_empty() {
            return Err(Error::invalid("empty name"));
        }
        let _guard = self.shared.lock();
        if self.shared.store().group_parent(self.id).is_none() {
            return Err(Error::unsupported("cannot rename the root group"));
        }
        self.shared.set_define_mode(true)?;
        self.shared.store().rename_group(self.id, new_name)
    }
}

/// The 1-D variables sharing one dimension, presented as a group.
pub struct VirtualGroup {
    group: Arc<Group>,
    dim_name: String,
}

impl VirtualGroup {
    pub fn name(&self) -> &str {
        &self.dim_name
    }

    pub fn variable_names(&self) -> Result<Vec<String>> {
        let shared = &self.group.shared;
        let _guard = shared.lock();
        let store = shared.store();
        let mut names = Vec::new();
        for name in self.group.variable_names(&OptionList::new())? {
            if let Some(v) = store.var_id(self.group.id, &name) {
                let dims = store.var_dim_ids(v)?;
                if dims.len() == 1 && store.dim_name(dims[0])? == self.dim_name {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    pub fn open_variable(
        &self,
        name: &str,
        options: &OptionList,
    ) -> Result<Option<Arc<Variable>>> {
        self.group.open_variable(name, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memstore::MemStore;

    fn shared() -> Arc<SharedResources> {
        SharedResources::for_created(Box::new(MemStore::new()))
    }

    #[test]
    fn test_foreign_dimension_is_resolved_by_name() {
        let a = shared();
        let n = Group::root(&a)
            .create_dimension("n", 3, &OptionList::new())
            .unwrap();

        let b = shared();
        let b_root = Group::root(&b);
        b_root
            .create_dimension("r", 42, &OptionList::new())
            .unwrap();

        // A wrapper from another store must not be read as a local id.
        let dt = ExtendedDataType::numeric(NumericType::Int32);
        let var = b_root
            .create_variable("v", &[n], &dt, &OptionList::new())
            .unwrap();

        let dims = var.dimensions().unwrap();
        assert_eq!(dims.len(), 1);
        assert_eq!(dims[0].name().unwrap(), "n");
        assert_eq!(dims[0].size().unwrap(), 3);

        let store = b.store();
        let root = store.root();
        assert!(store.dim_id(root, "n").is_some());
        let r = store.dim_id(root, "r").unwrap();
        assert_eq!(store.dim_len(r).unwrap(), 42);
    }

    #[test]
    fn test_foreign_dimension_reuses_same_named_local() {
        let a = shared();
        let n = Group::root(&a)
            .create_dimension("n", 3, &OptionList::new())
            .unwrap();

        let b = shared();
        let b_root = Group::root(&b);
        b_root
            .create_dimension("n", 5, &OptionList::new())
            .unwrap();

        // The local same-named dimension wins, size conflict or not.
        let dt = ExtendedDataType::numeric(NumericType::Int32);
        let var = b_root
            .create_variable("v", &[n], &dt, &OptionList::new())
            .unwrap();

        let dims = var.dimensions().unwrap();
        assert_eq!(dims[0].size().unwrap(), 5);
        assert_eq!(b.store().dim_ids(b.store().root()).unwrap().len(), 1);
    }

    #[test]
    fn test_hierarchy_and_full_names() {
        let shared = shared();
        let root = Group::root(&shared);
        let sub = root.create_group("model").unwrap();
        let leaf = sub.create_group("run1").unwrap();
        assert_eq!(root.full_name().unwrap(), "/");
        assert_eq!(sub.full_name().unwrap(), "/model");
        assert_eq!(leaf.full_name().unwrap(), "/model/run1");
        assert_eq!(root.group_names(&OptionList::new()).unwrap(), vec!["model"]);

        match root.open_group("model", &OptionList::new()).unwrap() {
            Some(GroupView::Native(g)) => assert_eq!(g.name().unwrap(), "model"),
            _ => panic!("expected a native group"),
        }
        assert!(root
            .open_group("absent", &OptionList::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_variable_name_filters() {
        let shared = shared();
        let root = Group::root(&shared);
        let y = root
            .create_dimension("y", 2, &OptionList::new())
            .unwrap();
        let x = root
            .create_dimension("x", 3, &OptionList::new())
            .unwrap();
        let dt = ExtendedDataType::numeric(NumericType::Float32);
        root.create_variable("y", &[Arc::clone(&y)], &dt, &OptionList::new())
            .unwrap();
        let temp = root
            .create_variable(
                "temp",
                &[Arc::clone(&y), Arc::clone(&x)],
                &dt,
                &OptionList::new(),
            )
            .unwrap();
        temp.create_attribute("coordinates", 0, &ExtendedDataType::string())
            .unwrap()
            .write_strings(&[String::from("lat lon")])
            .unwrap();
        root.create_variable("lat", &[Arc::clone(&y)], &dt, &OptionList::new())
            .unwrap();
        root.create_variable("scalar", &[], &dt, &OptionList::new())
            .unwrap();

        // Defaults: scalars hidden, everything else shown.
        let names = root.variable_names(&OptionList::new()).unwrap();
        assert_eq!(names, vec!["y", "temp", "lat"]);

        let names = root
            .variable_names(&OptionList::new().set("SHOW_ZERO_DIM", "YES"))
            .unwrap();
        assert!(names.contains(&String::from("scalar")));

        let names = root
            .variable_names(&OptionList::new().set("SHOW_COORDINATES", "NO"))
            .unwrap();
        assert!(!names.contains(&String::from("lat")));

        let names = root
            .variable_names(&OptionList::new().set("SHOW_INDEXING", "NO"))
            .unwrap();
        assert!(!names.contains(&String::from("y")));
        assert!(names.contains(&String::from("temp")));
    }

    #[test]
    fn test_virtual_groups_by_dimension() {
        let shared = shared();
        let root = Group::root(&shared);
        let station = root
            .create_dimension("station", 4, &OptionList::new())
            .unwrap();
        let time = root
            .create_dimension("time", 8, &OptionList::new())
            .unwrap();
        let dt = ExtendedDataType::numeric(NumericType::Float64);
        root.create_variable("elevation", &[Arc::clone(&station)], &dt, &OptionList::new())
            .unwrap();
        root.create_variable("pressure", &[Arc::clone(&time)], &dt, &OptionList::new())
            .unwrap();

        let by_dim = OptionList::new().set("GROUP_BY", "SAME_DIMENSION");
        let names = root.group_names(&by_dim).unwrap();
        assert_eq!(names, vec!["station", "time"]);

        match root.open_group("station", &by_dim).unwrap() {
            Some(GroupView::ByDimension(g)) => {
                assert_eq!(g.variable_names().unwrap(), vec!["elevation"]);
                assert!(g
                    .open_variable("elevation", &OptionList::new())
                    .unwrap()
                    .is_some());
            }
            _ => panic!("expected a virtual group"),
        }
    }

    #[test]
    fn test_create_variable_options() {
        let shared = shared();
        let root = Group::root(&shared);
        let y = root.create_dimension("y", 4, &OptionList::new()).unwrap();
        let x = root.create_dimension("x", 6, &OptionList::new()).unwrap();
        let dt = ExtendedDataType::numeric(NumericType::Int32);
        let opts = OptionList::new()
            .set("BLOCKSIZE", "2,3")
            .set("COMPRESS", "DEFLATE")
            .set("ZLEVEL", "6")
            .set("CHECKSUM", "YES");
        let var = root
            .create_variable("counts", &[y, x], &dt, &opts)
            .unwrap();
        assert_eq!(var.block_size().unwrap(), vec![2, 3]);

        let v = shared.store().var_id(shared.store().root(), "counts").unwrap();
        assert_eq!(shared.store().var_deflate(v).unwrap(), Some(6));
    }

    #[test]
    fn test_fixed_width_string_variable_creation() {
        let shared = shared();
        let root = Group::root(&shared);
        let n = root.create_dimension("n", 3, &OptionList::new()).unwrap();
        let dt = ExtendedDataType::string_with_max_length(10);
        let var = root
            .create_variable("names", &[n], &dt, &OptionList::new())
            .unwrap();
        // The caller sees one dimension; the length axis is internal.
        assert_eq!(var.dimensions().unwrap().len(), 1);
        assert_eq!(var.data_type().unwrap().max_string_length(), 10);

        let store = shared.store();
        let v = store.var_id(store.root(), "names").unwrap();
        assert_eq!(store.var_type(v).unwrap(), NativeType::Char);
        assert_eq!(store.var_dim_ids(v).unwrap().len(), 2);
    }

    #[test]
    fn test_group_attributes() {
        let shared = shared();
        let root = Group::root(&shared);
        root.create_attribute("title", 0, &ExtendedDataType::string())
            .unwrap()
            .write_strings(&[String::from("test set")])
            .unwrap();
        let names: Vec<String> = root
            .attributes()
            .unwrap()
            .iter()
            .map(|a| a.name())
            .collect();
        assert_eq!(names, vec!["title"]);
        assert_eq!(
            root.attribute("title")
                .unwrap()
                .unwrap()
                .read_as_string()
                .unwrap(),
            "test set"
        );
        root.delete_attribute("title").unwrap();
        assert!(root.attribute("title").unwrap().is_none());
    }
}
