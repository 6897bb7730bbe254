//! Market inputs: cell normalization, the typed dataset and CSV ingestion.

pub mod dataset;
pub mod loader;
pub mod quote;

pub use dataset::{same_tenor, Dataset, MarketSlice, TenorQuotes, TENOR_TOLERANCE};
pub use loader::{load_dataset, load_dataset_from_reader, DatasetSchema};
pub use quote::{normalize_cell, parse_tenor_label, CellUnit, Quote};
