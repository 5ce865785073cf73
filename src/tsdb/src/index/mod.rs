pub mod tsi1;

/// INDEX_FILE_NAME is the name of the per-shard measurement index file.
pub const INDEX_FILE_NAME: &'static str = "index";
