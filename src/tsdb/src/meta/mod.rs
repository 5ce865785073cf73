use std::time::Duration;

use serde::{Deserialize, Serialize};

mod client;

pub use client::MetaClient;

/// RetentionPolicySpec is the user-supplied definition of a retention policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicySpec {
    pub name: String,
    /// How long data is kept. `None` keeps data forever.
    pub duration: Option<Duration>,
    pub shard_group_duration: Duration,
    pub replica_n: Option<u32>,
}

impl RetentionPolicySpec {
    pub fn new(name: impl Into<String>, shard_group_duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration: None,
            shard_group_duration,
            replica_n: None,
        }
    }

    /// matches reports whether an existing policy was created with the same parameters.
    pub fn matches(&self, rpi: &RetentionPolicyInfo) -> bool {
        self.duration.unwrap_or(Duration::ZERO) == rpi.duration
            && self.replica_n.unwrap_or(1) == rpi.replica_n
            && self.shard_group_duration == rpi.shard_group_duration
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    pub id: u64,
}

/// ShardGroupInfo covers the half-open time range `[start_time, end_time)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardGroupInfo {
    pub id: u64,
    pub start_time: i64,
    pub end_time: i64,
    pub shards: Vec<ShardInfo>,
}

impl ShardGroupInfo {
    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        self.start_time < end && start < self.end_time
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicyInfo {
    pub name: String,
    pub replica_n: u32,
    /// Zero means infinite retention.
    pub duration: Duration,
    pub shard_group_duration: Duration,
    pub shard_groups: Vec<ShardGroupInfo>,
}

impl RetentionPolicyInfo {
    pub fn from_spec(spec: &RetentionPolicySpec) -> Self {
        Self {
            name: spec.name.clone(),
            replica_n: spec.replica_n.unwrap_or(1),
            duration: spec.duration.unwrap_or(Duration::ZERO),
            shard_group_duration: spec.shard_group_duration,
            shard_groups: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub default_retention_policy: String,
    pub retention_policies: Vec<RetentionPolicyInfo>,
}

impl DatabaseInfo {
    pub fn retention_policy(&self, name: &str) -> Option<&RetentionPolicyInfo> {
        self.retention_policies.iter().find(|rp| rp.name == name)
    }
}
