// Storage: concurrent dict, value wrapper, logical database

pub mod db;
pub mod dict;
pub mod entity;

pub use db::Db;
pub use dict::Dict;
pub use entity::DataEntity;
