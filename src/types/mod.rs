mod permission;
mod schema;
mod value;

pub use permission::Permissions;
pub use schema::{Column, ColumnType};
pub use value::{Row, Value};
