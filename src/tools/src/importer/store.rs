use common_base::value::Value;
use influxdb_tsdb::meta::{RetentionPolicyInfo, RetentionPolicySpec};
use influxdb_tsdb::{Server, ShardGroupWriter};

/// ShardGroup is an open shard group of the destination store.
pub trait ShardGroup {
    /// add_series registers a series key with the group.
    fn add_series(&mut self, key: &[u8]) -> anyhow::Result<()>;

    /// write appends values under a `series#!~#field` key.
    fn write(&mut self, key: &[u8], values: &[Value]) -> anyhow::Result<()>;
}

/// Store is the destination of an import.
///
/// A shard group is handed out by value from `start_shard_group` and given
/// back to `close_shard_group`, which consumes it.
pub trait Store {
    type Group: ShardGroup;

    fn open(&mut self) -> anyhow::Result<()>;

    /// retention_policy returns `None` if the database or the policy does not exist.
    fn retention_policy(&self, database: &str, rp: &str) -> anyhow::Result<Option<RetentionPolicyInfo>>;

    /// create_database creates the database and its retention policy.
    fn create_database(&mut self, database: &str, spec: &RetentionPolicySpec) -> anyhow::Result<()>;

    /// drop_retention_policy removes the policy together with its shard groups.
    fn drop_retention_policy(&mut self, database: &str, rp: &str) -> anyhow::Result<()>;

    fn start_shard_group(
        &mut self,
        database: &str,
        rp: &str,
        start: i64,
        end: i64,
    ) -> anyhow::Result<Self::Group>;

    fn close_shard_group(&mut self, group: Self::Group) -> anyhow::Result<()>;

    fn close(&mut self) -> anyhow::Result<()>;
}

impl ShardGroup for ShardGroupWriter {
    fn add_series(&mut self, key: &[u8]) -> anyhow::Result<()> {
        ShardGroupWriter::add_series(self, key)
    }

    fn write(&mut self, key: &[u8], values: &[Value]) -> anyhow::Result<()> {
        ShardGroupWriter::write(self, key, values)
    }
}

impl Store for Server {
    type Group = ShardGroupWriter;

    fn open(&mut self) -> anyhow::Result<()> {
        Server::open(self)
    }

    fn retention_policy(&self, database: &str, rp: &str) -> anyhow::Result<Option<RetentionPolicyInfo>> {
        Server::retention_policy(self, database, rp)
    }

    fn create_database(&mut self, database: &str, spec: &RetentionPolicySpec) -> anyhow::Result<()> {
        Server::create_database(self, database, spec)
    }

    fn drop_retention_policy(&mut self, database: &str, rp: &str) -> anyhow::Result<()> {
        Server::drop_retention_policy(self, database, rp)
    }

    fn start_shard_group(
        &mut self,
        database: &str,
        rp: &str,
        start: i64,
        end: i64,
    ) -> anyhow::Result<Self::Group> {
        Server::start_shard_group(self, database, rp, start, end)
    }

    fn close_shard_group(&mut self, group: Self::Group) -> anyhow::Result<()> {
        Server::close_shard_group(self, group)
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Server::close(self)
    }
}
