pub mod criteria;
pub mod crud;

pub use criteria::Criteria;
pub use crud::{CrudProvider, bind_record};
