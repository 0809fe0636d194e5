mod attribute;
mod context;
mod dimension;
mod errors;
mod group;
mod memstore;
mod options;
mod store;
mod typemap;
mod types;
mod variable;

#[cfg(test)]
mod testing;

pub use attribute::Attribute;
pub use context::SharedResources;
pub use dimension::Dimension;
pub use dimension::DimensionDirection;
pub use dimension::DimensionKind;
pub use errors::Error;
pub use errors::Result;
pub use group::Group;
pub use group::GroupView;
pub use group::VirtualGroup;
pub use memstore::MemStore;
pub use options::OptionList;
pub use store::AttrTarget;
pub use store::CompoundFieldInfo;
pub use store::DimId;
pub use store::GrpId;
pub use store::NativeType;
pub use store::StorageFormat;
pub use store::Store;
pub use store::UserTypeClass;
pub use store::UserTypeId;
pub use store::UserTypeInfo;
pub use store::VarId;
pub use types::Component;
pub use types::DataClass;
pub use types::Element;
pub use types::ExtendedDataType;
pub use types::NumericType;
pub use variable::Variable;
