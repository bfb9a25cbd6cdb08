//! Record values and their scope-partitioned field storage.

pub mod record;
pub(crate) mod scoped;

pub use record::{Record, RecordTypeRef};
