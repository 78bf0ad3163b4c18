pub mod extract;
pub mod sqlite;
pub mod traits;

pub use extract::{Extract, RowSet};
pub use sqlite::SqliteSourceReader;
pub use traits::SourceReader;
