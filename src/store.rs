//! The underlying-store contract.
//!
//! Everything above this trait (groups, dimensions, variables, attributes,
//! the transfer engine) is store-agnostic: it consumes the primitives below
//! and nothing else. The trait mirrors the native container library's call
//! families: introspection by id, single-element / contiguous-block /
//! strided-mapped data transfer, attribute get/put by native type, and the
//! definition/data mode transition.

use crate::errors::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GrpId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DimId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VarId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserTypeId(pub u32);

/// Native element type identifiers, as stored on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NativeType {
    /// Signed 8-bit integer. The classic format's only byte type, so it
    /// does double duty for unsigned data via the `_Unsigned` marker
    /// attribute.
    SChar,
    /// 8-bit character, used both for text attributes and for fixed-width
    /// character array storage.
    Char,
    Short,
    Int,
    Int64,
    UChar,
    UShort,
    UInt,
    UInt64,
    Float,
    Double,
    /// Variable-length string.
    Str,
    /// User-defined type (compound, enumeration, vlen, opaque).
    User(UserTypeId),
}

impl NativeType {
    /// Size in bytes of one element for the fixed-width builtins; `None`
    /// for strings and user-defined types (ask the store for those).
    pub fn builtin_size(self) -> Option<usize> {
        match self {
            Self::SChar | Self::Char | Self::UChar => Some(1),
            Self::Short | Self::UShort => Some(2),
            Self::Int | Self::UInt | Self::Float => Some(4),
            Self::Int64 | Self::UInt64 | Self::Double => Some(8),
            Self::Str | Self::User(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserTypeClass {
    Compound,
    Enum,
    Vlen,
    Opaque,
}

/// Introspection record for a user-defined type.
#[derive(Clone, Debug)]
pub struct UserTypeInfo {
    pub name: String,
    pub class: UserTypeClass,
    pub size: usize,
    /// Base type for enumerations.
    pub base: Option<NativeType>,
    pub field_count: usize,
}

/// One field of a compound user type.
#[derive(Clone, Debug)]
pub struct CompoundFieldInfo {
    pub name: String,
    pub offset: usize,
    pub datatype: NativeType,
    /// Per-field array rank; only scalar (rank 0) fields are supported by
    /// the type mapper.
    pub rank: usize,
}

/// Where an attribute hangs: a group (global attribute) or a variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttrTarget {
    Group(GrpId),
    Var(VarId),
}

/// The container flavor of an opened store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageFormat {
    Classic,
    SixtyFourBitOffset,
    Cdf5,
    V4,
    V4Classic,
}

impl StorageFormat {
    /// Classic-model flavors require an explicit definition/data mode
    /// transition; the v4-native layout does not.
    pub fn distinguishes_modes(self) -> bool {
        !matches!(self, Self::V4)
    }

    pub fn structural_name(self) -> &'static str {
        match self {
            Self::Classic => "CLASSIC",
            Self::SixtyFourBitOffset => "64BIT_OFFSET",
            Self::Cdf5 => "CDF5",
            Self::V4 => "NETCDF4",
            Self::V4Classic => "NETCDF4_CLASSIC",
        }
    }
}

/// The native container library, reduced to the primitives this layer
/// consumes. All methods take `&self`; implementations are internally
/// synchronized, and callers additionally serialize whole logical call
/// chains through the shared context's global lock.
pub trait Store: Send + Sync {
    /// Version string of the underlying library, used to resolve the
    /// mapped-access buffer-stride unit (bytes before 4.4, elements after).
    fn library_version(&self) -> String;

    fn format(&self) -> StorageFormat;

    fn root(&self) -> GrpId;

    // ---- definition/data mode ----

    fn redef(&self) -> Result<()>;
    fn enddef(&self) -> Result<()>;

    // ---- groups ----

    fn group_name(&self, g: GrpId) -> Result<String>;
    fn group_parent(&self, g: GrpId) -> Option<GrpId>;
    fn subgroups(&self, g: GrpId) -> Result<Vec<GrpId>>;
    fn subgroup(&self, g: GrpId, name: &str) -> Option<GrpId>;
    fn def_group(&self, g: GrpId, name: &str) -> Result<GrpId>;
    fn rename_group(&self, g: GrpId, name: &str) -> Result<()>;

    // ---- dimensions ----

    /// Dimensions declared directly in `g` (no ancestor dimensions).
    fn dim_ids(&self, g: GrpId) -> Result<Vec<DimId>>;
    fn dim_id(&self, g: GrpId, name: &str) -> Option<DimId>;
    fn dim_name(&self, d: DimId) -> Result<String>;
    /// Current length. For a resizable dimension this is the store's own
    /// record of how far any variable's storage actually extends.
    fn dim_len(&self, d: DimId) -> Result<usize>;
    fn dim_group(&self, d: DimId) -> Result<GrpId>;
    fn def_dim(&self, g: GrpId, name: &str, len: usize, unlimited: bool) -> Result<DimId>;
    fn rename_dim(&self, d: DimId, name: &str) -> Result<()>;
    /// Ids of the resizable ("unlimited") dimensions visible from `g`.
    fn unlimited_dim_ids(&self, g: GrpId) -> Result<Vec<DimId>>;

    // ---- variables ----

    fn var_ids(&self, g: GrpId) -> Result<Vec<VarId>>;
    fn var_id(&self, g: GrpId, name: &str) -> Option<VarId>;
    fn var_name(&self, v: VarId) -> Result<String>;
    fn var_group(&self, v: VarId) -> Result<GrpId>;
    fn var_type(&self, v: VarId) -> Result<NativeType>;
    fn var_dim_ids(&self, v: VarId) -> Result<Vec<DimId>>;
    fn def_var(&self, g: GrpId, name: &str, t: NativeType, dims: &[DimId]) -> Result<VarId>;
    fn rename_var(&self, v: VarId, name: &str) -> Result<()>;
    fn var_chunking(&self, v: VarId) -> Result<Option<Vec<usize>>>;
    fn set_var_chunking(&self, v: VarId, chunks: &[usize]) -> Result<()>;
    /// Deflate level if compression is enabled.
    fn var_deflate(&self, v: VarId) -> Result<Option<u8>>;
    fn set_var_deflate(&self, v: VarId, shuffle: bool, level: u8) -> Result<()>;
    fn set_var_filter(&self, v: VarId, filter_id: u32, params: &[u32]) -> Result<()>;
    fn set_var_checksum(&self, v: VarId, enabled: bool) -> Result<()>;
    /// Request that not-yet-allocated storage be materialized with this
    /// value (native representation) instead of the type default.
    fn set_var_fill(&self, v: VarId, fill: &[u8]) -> Result<()>;

    // ---- user-defined types ----

    fn type_id_by_name(&self, g: GrpId, name: &str) -> Option<UserTypeId>;
    fn user_type_info(&self, t: UserTypeId) -> Result<UserTypeInfo>;
    fn compound_field(&self, t: UserTypeId, index: usize) -> Result<CompoundFieldInfo>;
    fn def_compound(&self, g: GrpId, name: &str, size: usize) -> Result<UserTypeId>;
    fn insert_compound_field(
        &self,
        t: UserTypeId,
        name: &str,
        offset: usize,
        field: NativeType,
    ) -> Result<()>;
    /// Size in bytes of one element of `t`, user types included.
    fn type_size(&self, t: NativeType) -> Result<usize>;

    // ---- attributes ----

    fn att_names(&self, target: AttrTarget) -> Result<Vec<String>>;
    /// Native type and element count, or `None` if absent.
    fn att_info(&self, target: AttrTarget, name: &str) -> Option<(NativeType, usize)>;
    fn get_att_raw(&self, target: AttrTarget, name: &str) -> Result<Vec<u8>>;
    fn put_att_raw(
        &self,
        target: AttrTarget,
        name: &str,
        t: NativeType,
        len: usize,
        data: &[u8],
    ) -> Result<()>;
    fn get_att_text(&self, target: AttrTarget, name: &str) -> Result<String>;
    fn put_att_text(&self, target: AttrTarget, name: &str, text: &str) -> Result<()>;
    fn get_att_strings(&self, target: AttrTarget, name: &str) -> Result<Vec<String>>;
    fn put_att_strings(&self, target: AttrTarget, name: &str, values: &[String]) -> Result<()>;
    fn rename_att(&self, target: AttrTarget, name: &str, new_name: &str) -> Result<()>;
    fn del_att(&self, target: AttrTarget, name: &str) -> Result<()>;

    // ---- data transfer primitives ----

    /// Single element at an explicit index vector, native bytes.
    fn get_var1(&self, v: VarId, idx: &[usize], out: &mut [u8]) -> Result<()>;
    fn put_var1(&self, v: VarId, idx: &[usize], data: &[u8]) -> Result<()>;
    /// Contiguous hyper-rectangle, native bytes, row-major.
    fn get_vara(&self, v: VarId, start: &[usize], count: &[usize], out: &mut [u8]) -> Result<()>;
    fn put_vara(&self, v: VarId, start: &[usize], count: &[usize], data: &[u8]) -> Result<()>;
    /// Strided mapped access: per-dimension array step (`stride`, must be
    /// positive) and per-dimension buffer stride (`imap`). The unit of
    /// `imap` (bytes or elements) depends on the library version.
    fn get_varm(
        &self,
        v: VarId,
        start: &[usize],
        count: &[usize],
        stride: &[isize],
        imap: &[isize],
        out: &mut [u8],
    ) -> Result<()>;
    fn put_varm(
        &self,
        v: VarId,
        start: &[usize],
        count: &[usize],
        stride: &[isize],
        imap: &[isize],
        data: &[u8],
    ) -> Result<()>;
    /// String element accessors; the store owns no memory after the call
    /// returns (contents are copied out/in).
    fn get_var1_string(&self, v: VarId, idx: &[usize]) -> Result<String>;
    fn put_var1_string(&self, v: VarId, idx: &[usize], value: &str) -> Result<()>;
}
