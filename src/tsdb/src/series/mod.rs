pub mod series_file;
pub mod series_segment;
