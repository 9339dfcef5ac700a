pub mod fake_catalog;
pub mod fixtures;

pub use fake_catalog::{CallEvent, CatalogCall, FakeCatalog, FakeCatalogStats};
