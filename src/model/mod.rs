//! Identity and runtime records: resource names, assets, resources, groups
//! and the live table that ties them together.

mod asset;
mod group;
mod name;
mod resource;
mod table;

pub use asset::AssetInfo;
pub use group::{GroupProgress, ResourceGroup, ResourceGroupCollection};
pub use name::ResourceName;
pub use resource::{LoadType, ReadWriteEntry, ResourceInfo};
pub use table::{read_write_manifest_from, ResourceTable};
