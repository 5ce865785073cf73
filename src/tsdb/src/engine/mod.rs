pub mod shard;

/// TMP_FILE_EXTENSION is the extension used for shard files that are still being written.
pub(crate) const TMP_FILE_EXTENSION: &'static str = "tmp";

/// TSM_FILE_EXTENSION is the extension used for shard data files.
pub(crate) const TSM_FILE_EXTENSION: &'static str = "tsm";
