pub mod convert;
pub mod error;
pub mod types;
pub mod value;

pub use convert::{Identity, SqlValue, Symbolic};
pub use error::{DbError, Result};
pub use types::{DataType, Params, Row};
pub use value::Value;
