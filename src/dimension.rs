//! Dimension wrapper: name, extent, axis classification, and the lookup
//! of the variable that indexes the dimension.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::context::SharedResources;
use crate::errors::{Error, Result};
use crate::group::group_full_name;
use crate::store::{AttrTarget, DimId, GrpId, NativeType, VarId};
use crate::variable::Variable;

/// Axis classification, derived from the indexing variable's conventional
/// metadata when the dimension is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DimensionKind {
    HorizontalX,
    HorizontalY,
    Vertical,
    Temporal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DimensionDirection {
    East,
    North,
    Up,
    Down,
}

pub struct Dimension {
    shared: Arc<SharedResources>,
    id: DimId,
    group: GrpId,
    /// Overrides the store's extent, for synthetic dimensions such as the
    /// string axis split off a fixed-width character variable.
    forced_size: Option<usize>,
    /// Pending growth from a variable resize. The store's own extent only
    /// catches up when data is written past it.
    logical_size: Mutex<Option<u64>>,
    kind: Mutex<Option<DimensionKind>>,
    direction: Mutex<Option<DimensionDirection>>,
}

impl Dimension {
    /// Open a dimension, reusing the live wrapper for this id if one
    /// exists so that renames are visible to every holder.
    pub(crate) fn open(shared: &Arc<SharedResources>, id: DimId) -> Result<Arc<Dimension>> {
        if let Some(dim) = shared.cached_dimension(id) {
            return Ok(dim);
        }
        let dim = Self::create(shared, id, None, None)?;
        // Cache before classification: classifying opens variables whose
        // dimension lists come back through here.
        shared.cache_dimension(id, &dim);
        dim.classify()?;
        Ok(dim)
    }

    /// Build a wrapper without classification, for synthetic dimensions
    /// with a forced extent or a kind known up front.
    pub(crate) fn create(
        shared: &Arc<SharedResources>,
        id: DimId,
        forced_size: Option<usize>,
        forced_kind: Option<DimensionKind>,
    ) -> Result<Arc<Dimension>> {
        let group = shared.store().dim_group(id)?;
        Ok(Arc::new(Dimension {
            shared: Arc::clone(shared),
            id,
            group,
            forced_size,
            logical_size: Mutex::new(None),
            kind: Mutex::new(forced_kind),
            direction: Mutex::new(None),
        }))
    }

    pub(crate) fn id(&self) -> DimId {
        self.id
    }

    /// Whether this wrapper's id is meaningful against the given context.
    /// Ids from another store live in an unrelated id space.
    pub(crate) fn belongs_to(&self, shared: &Arc<SharedResources>) -> bool {
        Arc::ptr_eq(&self.shared, shared)
    }

    pub(crate) fn group_id(&self) -> GrpId {
        self.group
    }

    pub fn name(&self) -> Result<String> {
        let _guard = self.shared.lock();
        self.shared.store().dim_name(self.id)
    }

    pub fn full_name(&self) -> Result<String> {
        let _guard = self.shared.lock();
        let prefix = group_full_name(&self.shared, self.group)?;
        let name = self.shared.store().dim_name(self.id)?;
        if prefix == "/" {
            Ok(format!("/{}", name))
        } else {
            Ok(format!("{}/{}", prefix, name))
        }
    }

    /// Current extent. Queried live so growth through any variable sharing
    /// the dimension is immediately visible; a pending resize that the
    /// store has not materialized yet is included.
    pub fn size(&self) -> Result<u64> {
        if let Some(forced) = self.forced_size {
            return Ok(forced as u64);
        }
        let _guard = self.shared.lock();
        let stored = self.shared.store().dim_len(self.id)? as u64;
        Ok(match *self.logical_size.lock() {
            Some(logical) if logical > stored => logical,
            _ => stored,
        })
    }

    /// The extent the store has actually materialized, ignoring pending
    /// growth.
    pub(crate) fn actual_size(&self) -> Result<u64> {
        let _guard = self.shared.lock();
        Ok(self.shared.store().dim_len(self.id)? as u64)
    }

    /// Record growth from a variable resize. Never shrinks.
    pub(crate) fn grow_to(&self, size: u64) {
        let mut logical = self.logical_size.lock();
        match *logical {
            Some(cur) if cur >= size => {}
            _ => *logical = Some(size),
        }
    }

    pub fn is_resizable(&self) -> Result<bool> {
        let _guard = self.shared.lock();
        Ok(self
            .shared
            .store()
            .unlimited_dim_ids(self.group)?
            .contains(&self.id))
    }

    pub fn kind(&self) -> Option<DimensionKind> {
        *self.kind.lock()
    }

    pub fn direction(&self) -> Option<DimensionDirection> {
        *self.direction.lock()
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
        self.shared.store().rename_dim(self.id, new_name)
    }

    /// The variable that indexes this dimension, if one can be identified.
    ///
    /// First preference is a same-named variable in the dimension's group,
    /// 1-D over this dimension (or 2-D fixed-width character, whose second
    /// axis is the string length). Failing that, a unique 1-D variable over
    /// this dimension qualifies, as does a variable designated through a
    /// sibling's `coordinates` attribute.
    pub fn indexing_variable(self: &Arc<Self>) -> Result<Option<Arc<Variable>>> {
        // The scan opens other variables, whose dimensions would scan in
        // turn; one level is enough.
        let _scan = match self.shared.begin_indexing_scan() {
            Some(scan) => scan,
            None => return Ok(None),
        };
        let _guard = self.shared.lock();
        let store = self.shared.store();
        let name = store.dim_name(self.id)?;

        if let Some(v) = store.var_id(self.group, &name) {
            let dims = store.var_dim_ids(v)?;
            let vtype = store.var_type(v)?;
            let char_string = dims.len() == 2 && vtype == NativeType::Char;
            if (dims.len() == 1 || char_string) && dims[0] == self.id {
                if char_string {
                    // The second axis must really be a string length, not a
                    // dimension with its own indexing variable.
                    let extra = store.dim_name(dims[1])?;
                    if store.var_id(self.group, &extra).is_some() {
                        return Ok(None);
                    }
                }
                return Ok(Some(Variable::create(&self.shared, v)?));
            }
        }

        let mut candidate: Option<VarId> = None;
        for v in store.var_ids(self.group)? {
            let dims = store.var_dim_ids(v)?;
            if dims.len() == 1 && dims[0] == self.id {
                // A lone 1-D variable over this dimension stands in, but
                // only when it is unambiguous.
                if candidate.is_some() {
                    return Ok(None);
                }
                candidate = Some(v);
                continue;
            }

            let coords = match store.get_att_strings(AttrTarget::Var(v), "coordinates") {
                Ok(vals) if vals.len() == 1 => vals[0].clone(),
                _ => match store.get_att_text(AttrTarget::Var(v), "coordinates") {
                    Ok(text) => text,
                    Err(_) => continue,
                },
            };
            let coord_names: Vec<&str> = coords.split_whitespace().collect();
            if coord_names.len() != dims.len() {
                continue;
            }
            for (i, d) in dims.iter().enumerate() {
                if *d != self.id {
                    continue;
                }
                // Some producers list coordinate variables in dimension
                // order, others in the reverse. Assume dimension order
                // unless the first listed coordinate is an X axis.
                let mut same_order = true;
                if coord_names.len() > 1 {
                    if let Some((_, cv)) = resolve_var(&self.shared, self.group, coord_names[0]) {
                        let cname = store.var_name(cv)?;
                        if var_is_longitude(&self.shared, cv, &cname)
                            || var_is_projection_x(&self.shared, cv, &cname)
                        {
                            same_order = false;
                            warn!(
                                variable = %cname,
                                "coordinates attribute appears reversed relative to dimensions"
                            );
                        }
                    }
                }
                let idx = if same_order {
                    i
                } else {
                    coord_names.len() - 1 - i
                };
                if let Some((_, cv)) = resolve_var(&self.shared, self.group, coord_names[idx]) {
                    return Ok(Some(Variable::create(&self.shared, cv)?));
                }
            }
        }

        match candidate {
            Some(v) => Ok(Some(Variable::create(&self.shared, v)?)),
            None => Ok(None),
        }
    }

    /// Derive the axis kind and direction from the indexing variable's
    /// conventional name and attributes.
    fn classify(self: &Arc<Self>) -> Result<()> {
        let var = match self.indexing_variable()? {
            Some(var) => var,
            None => return Ok(()),
        };
        let v = var.id();
        let _guard = self.shared.lock();
        let name = self.shared.store().var_name(v)?;
        let units = att_text(&self.shared, v, "units");
        if var_is_longitude(&self.shared, v, &name) || var_is_projection_x(&self.shared, v, &name) {
            *self.kind.lock() = Some(DimensionKind::HorizontalX);
            if units.as_deref() == Some("degrees_east") {
                *self.direction.lock() = Some(DimensionDirection::East);
            }
        } else if var_is_latitude(&self.shared, v, &name)
            || var_is_projection_y(&self.shared, v, &name)
        {
            *self.kind.lock() = Some(DimensionKind::HorizontalY);
            if units.as_deref() == Some("degrees_north") {
                *self.direction.lock() = Some(DimensionDirection::North);
            }
        } else if var_is_vertical(&self.shared, v, &name) {
            *self.kind.lock() = Some(DimensionKind::Vertical);
            match att_text(&self.shared, v, "positive").as_deref() {
                Some(p) if p.eq_ignore_ascii_case("up") => {
                    *self.direction.lock() = Some(DimensionDirection::Up)
                }
                Some(p) if p.eq_ignore_ascii_case("down") => {
                    *self.direction.lock() = Some(DimensionDirection::Down)
                }
                _ => {}
            }
        } else if var_is_temporal(&self.shared, v, &name) {
            *self.kind.lock() = Some(DimensionKind::Temporal);
        }
        Ok(())
    }
}

/// Find a variable by name in `g` or the closest ancestor declaring it.
pub(crate) fn resolve_var(
    shared: &SharedResources,
    g: GrpId,
    name: &str,
) -> Option<(GrpId, VarId)> {
    let store = shared.store();
    let mut cur = Some(g);
    while let Some(c) = cur {
        if let Some(v) = store.var_id(c, name) {
            return Some((c, v));
        }
        cur = store.group_parent(c);
    }
    None
}

fn att_text(shared: &SharedResources, v: VarId, name: &str) -> Option<String> {
    shared
        .store()
        .get_att_text(AttrTarget::Var(v), name)
        .ok()
        .filter(|s| !s.is_empty())
}

fn std_name(shared: &SharedResources, v: VarId) -> Option<String> {
    att_text(shared, v, "standard_name")
}

fn var_is_longitude(shared: &SharedResources, v: VarId, name: &str) -> bool {
    if std_name(shared, v).as_deref() == Some("longitude") {
        return true;
    }
    if matches!(
        att_text(shared, v, "units").as_deref(),
        Some("degrees_east" | "degree_east" | "degrees_E")
    ) {
        return true;
    }
    matches!(name.to_ascii_lowercase().as_str(), "lon" | "longitude")
}

fn var_is_latitude(shared: &SharedResources, v: VarId, name: &str) -> bool {
    if std_name(shared, v).as_deref() == Some("latitude") {
        return true;
    }
    if matches!(
        att_text(shared, v, "units").as_deref(),
        Some("degrees_north" | "degree_north" | "degrees_N")
    ) {
        return true;
    }
    matches!(name.to_ascii_lowercase().as_str(), "lat" | "latitude")
}

fn var_is_projection_x(shared: &SharedResources, v: VarId, name: &str) -> bool {
    std_name(shared, v).as_deref() == Some("projection_x_coordinate")
        || matches!(name.to_ascii_lowercase().as_str(), "x" | "xc")
}

fn var_is_projection_y(shared: &SharedResources, v: VarId, name: &str) -> bool {
    std_name(shared, v).as_deref() == Some("projection_y_coordinate")
        || matches!(name.to_ascii_lowercase().as_str(), "y" | "yc")
}

fn var_is_vertical(shared: &SharedResources, v: VarId, name: &str) -> bool {
    if matches!(
        std_name(shared, v).as_deref(),
        Some("depth" | "height" | "altitude" | "air_pressure")
    ) {
        return true;
    }
    if att_text(shared, v, "positive").is_some() {
        return true;
    }
    matches!(
        name.to_ascii_lowercase().as_str(),
        "z" | "lev" | "level" | "depth" | "height" | "altitude" | "plev"
    )
}

fn var_is_temporal(shared: &SharedResources, v: VarId, name: &str) -> bool {
    if std_name(shared, v).as_deref() == Some("time") {
        return true;
    }
    if let Some(units) = att_text(shared, v, "units") {
        if units.contains(" since ") {
            return true;
        }
    }
    matches!(name.to_ascii_lowercase().as_str(), "time" | "t")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memstore::MemStore;
    use crate::store::Store;

    fn shared_with<F: FnOnce(&MemStore)>(setup: F) -> Arc<SharedResources> {
        let store = MemStore::new();
        setup(&store);
        SharedResources::for_created(Box::new(store))
    }

    #[test]
    fn test_same_name_indexing_variable() {
        let shared = shared_with(|store| {
            let root = store.root();
            let t = store.def_dim(root, "time", 4, false).unwrap();
            store
                .def_var(root, "time", NativeType::Double, &[t])
                .unwrap();
        });
        let d = shared.store().dim_id(shared.store().root(), "time").unwrap();
        let dim = Dimension::open(&shared, d).unwrap();
        let idx = dim.indexing_variable().unwrap().unwrap();
        assert_eq!(idx.name().unwrap(), "time");
        assert_eq!(dim.kind(), Some(DimensionKind::Temporal));
    }

    #[test]
    fn test_unique_one_dim_candidate() {
        let shared = shared_with(|store| {
            let root = store.root();
            let d = store.def_dim(root, "station", 3, false).unwrap();
            store
                .def_var(root, "station_id", NativeType::Int, &[d])
                .unwrap();
        });
        let d = shared
            .store()
            .dim_id(shared.store().root(), "station")
            .unwrap();
        let dim = Dimension::open(&shared, d).unwrap();
        let idx = dim.indexing_variable().unwrap().unwrap();
        assert_eq!(idx.name().unwrap(), "station_id");
    }

    #[test]
    fn test_ambiguous_candidates_yield_none() {
        let shared = shared_with(|store| {
            let root = store.root();
            let d = store.def_dim(root, "station", 3, false).unwrap();
            store.def_var(root, "a", NativeType::Int, &[d]).unwrap();
            store.def_var(root, "b", NativeType::Int, &[d]).unwrap();
        });
        let d = shared
            .store()
            .dim_id(shared.store().root(), "station")
            .unwrap();
        let dim = Dimension::open(&shared, d).unwrap();
        assert!(dim.indexing_variable().unwrap().is_none());
    }

    #[test]
    fn test_classification_from_units() {
        let shared = shared_with(|store| {
            let root = store.root();
            let x = store.def_dim(root, "ni", 5, false).unwrap();
            let v = store.def_var(root, "ni", NativeType::Float, &[x]).unwrap();
            store
                .put_att_text(AttrTarget::Var(v), "units", "degrees_east")
                .unwrap();
        });
        let d = shared.store().dim_id(shared.store().root(), "ni").unwrap();
        let dim = Dimension::open(&shared, d).unwrap();
        assert_eq!(dim.kind(), Some(DimensionKind::HorizontalX));
        assert_eq!(dim.direction(), Some(DimensionDirection::East));
    }

    #[test]
    fn test_reversed_coordinates_attribute() {
        // `coordinates = "lon lat"` over dimensions [rows, cols]: the
        // first listed coordinate is an X axis, so the list is taken in
        // reverse and rows resolves to lat.
        let shared = shared_with(|store| {
            let root = store.root();
            let rows = store.def_dim(root, "rows", 3, false).unwrap();
            let cols = store.def_dim(root, "cols", 4, false).unwrap();
            store
                .def_var(root, "lat", NativeType::Double, &[rows, cols])
                .unwrap();
            store
                .def_var(root, "lon", NativeType::Double, &[rows, cols])
                .unwrap();
            let data = store
                .def_var(root, "data", NativeType::Float, &[rows, cols])
                .unwrap();
            store
                .put_att_text(AttrTarget::Var(data), "coordinates", "lon lat")
                .unwrap();
        });
        let d = shared.store().dim_id(shared.store().root(), "rows").unwrap();
        let dim = Dimension::open(&shared, d).unwrap();
        let idx = dim.indexing_variable().unwrap().unwrap();
        assert_eq!(idx.name().unwrap(), "lat");
    }

    #[test]
    fn test_identity_cache_and_rename() {
        let shared = shared_with(|store| {
            let root = store.root();
            store.def_dim(root, "y", 3, false).unwrap();
        });
        let d = shared.store().dim_id(shared.store().root(), "y").unwrap();
        let dim1 = Dimension::open(&shared, d).unwrap();
        let dim2 = Dimension::open(&shared, d).unwrap();
        assert!(Arc::ptr_eq(&dim1, &dim2));

        dim1.rename("rows").unwrap();
        assert_eq!(dim2.name().unwrap(), "rows");
        assert_eq!(dim2.full_name().unwrap(), "/rows");
    }
}
