pub mod builder;
pub mod dialect;

pub use builder::{
    ID_PARAMETER, RawExpressions, SqlExpr, Statement, build_delete, build_exists_by_id,
    build_exists_by_properties, build_insert, build_insert_with, build_select_by_id,
    build_select_by_properties, build_update, build_update_with,
};
pub use dialect::{Dialect, SqlServer, Sqlite};
