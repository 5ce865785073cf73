//!
//! A shard data file is composed of four sections: header, blocks, index and the footer.
//!
//! ┌────────┬────────────────────────────────────┬─────────────┬──────────────┐
//! │ Header │               Blocks               │    Index    │    Footer    │
//! │5 bytes │              N bytes               │   N bytes   │   8 bytes    │
//! └────────┴────────────────────────────────────┴─────────────┴──────────────┘
//!
//! Header is a magic number identifying the file type followed by a version.
//!
//! Blocks are pairs of CRC32 and data. A block holds the values of one key,
//! all of the same field type:
//!
//! ┌──────┬─────────────────────────────────────────────────┐
//! │ Type │        snappy( Count │ (Time, Value) ... )       │
//! │1 byte│                    N bytes                      │
//! └──────┴─────────────────────────────────────────────────┘
//!
//! The index follows the blocks, ordered lexicographically by key and then by
//! time:
//!
//! ┌─────────┬─────────┬──────┬───────┬─────────┬─────────┬────────┬────────┬───┐
//! │ Key Len │   Key   │ Type │ Count │Min Time │Max Time │ Offset │  Size  │...│
//! │ 2 bytes │ N bytes │1 byte│2 bytes│ 8 bytes │ 8 bytes │8 bytes │4 bytes │   │
//! └─────────┴─────────┴──────┴───────┴─────────┴─────────┴────────┴────────┴───┘
//!
//! The footer stores the offset of the start of the index.
//!

pub mod block;
pub mod index;
pub mod reader;
pub mod writer;

/// MAGIC_NUMBER is written as the first 4 bytes of a data file to
/// identify the file as a shard data file
const MAGIC_NUMBER: u32 = 0x16D116D1;

/// VERSION indicates the version of the shard file format.
const VERSION: u8 = 1;

/// Block's header: | magic number(4B) | VERSION(1B) |
const HEADER: [u8; 5] = {
    let m = MAGIC_NUMBER.to_be_bytes();
    [m[0], m[1], m[2], m[3], VERSION]
};

/// size in bytes of an index entry
const INDEX_ENTRY_SIZE: usize = 28;

/// size in bytes used to store the count of index entries for a key
const INDEX_COUNT_SIZE: usize = 2;

/// Max number of blocks for a given key that can exist in a single file
const MAX_INDEX_ENTRIES: usize = (1 << (INDEX_COUNT_SIZE * 8)) - 1;

/// max length of a key in an index entry (measurement + tags + field)
pub const MAX_KEY_LENGTH: usize = (1 << (2 * 8)) - 1;

/// The threshold amount data written before we periodically fsync a shard file.
const FSYNC_EVERY: u64 = 25 * 1024 * 1024;

/// shard_file_name returns the data file name for a generation and sequence.
pub fn shard_file_name(generation: u32, sequence: u32) -> String {
    format!(
        "{:09}-{:09}.{}",
        generation,
        sequence,
        crate::engine::TSM_FILE_EXTENSION
    )
}

#[cfg(test)]
mod tests {
    use crate::engine::shard::{shard_file_name, HEADER, MAGIC_NUMBER};

    #[test]
    fn test_header_matches_magic() {
        assert_eq!(&HEADER[..4], MAGIC_NUMBER.to_be_bytes().as_slice());
    }

    #[test]
    fn test_shard_file_name() {
        assert_eq!(shard_file_name(1, 1), "000000001-000000001.tsm");
    }
}
