//! Core data types and I/O operations.

pub mod loaders;
pub mod track;
pub mod transforms;
pub mod writers;

pub use loaders::{load_track, ColumnRef, CsvLayout, LoaderError};
pub use track::{Channel, Position, Sample, Terrain, Timestamp, Track};
pub use writers::{write_html, write_selected_rows, write_track_csv, WriteError};
