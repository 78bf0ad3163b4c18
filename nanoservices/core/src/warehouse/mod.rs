pub mod dimensions;
pub mod facts;
pub mod store;

pub use dimensions::{reconcile_dimensions, DimensionKeys};
pub use facts::{load_facts, FailedRow, LoadReport};
pub use store::WarehouseStore;
