use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::meta::{DatabaseInfo, RetentionPolicyInfo, RetentionPolicySpec, ShardGroupInfo, ShardInfo};

const META_FILE: &'static str = "meta.json";
const META_TMP_FILE: &'static str = "meta.json.tmp";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Data {
    databases: Vec<DatabaseInfo>,
    max_shard_group_id: u64,
    max_shard_id: u64,
}

/// MetaClient holds the catalog of databases, retention policies and shard groups.
/// Every mutation is persisted before it returns.
pub struct MetaClient {
    dir: PathBuf,
    data: Data,
}

impl MetaClient {
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| anyhow!("unable to create meta dir {}: {}", dir.display(), e))?;

        let path = dir.join(META_FILE);
        let data = if path.exists() {
            let content = fs::read(&path)?;
            serde_json::from_slice(&content)
                .map_err(|e| anyhow!("corrupt meta file {}: {}", path.display(), e))?
        } else {
            Data::default()
        };

        Ok(Self { dir, data })
    }

    pub fn database(&self, name: &str) -> Option<&DatabaseInfo> {
        self.data.databases.iter().find(|db| db.name == name)
    }

    pub fn retention_policy(&self, database: &str, name: &str) -> anyhow::Result<Option<&RetentionPolicyInfo>> {
        let db = self
            .database(database)
            .ok_or_else(|| anyhow!("database not found: {}", database))?;
        Ok(db.retention_policy(name))
    }

    /// create_database creates the database if it does not already exist.
    pub fn create_database(&mut self, name: &str) -> anyhow::Result<&DatabaseInfo> {
        if name.is_empty() {
            return Err(anyhow!("database name required"));
        }

        if self.database(name).is_none() {
            self.data.databases.push(DatabaseInfo {
                name: name.to_string(),
                default_retention_policy: String::new(),
                retention_policies: vec![],
            });
            self.save()?;
        }

        self.database(name)
            .ok_or_else(|| anyhow!("database not found: {}", name))
    }

    /// create_retention_policy fails if a policy of the same name exists with
    /// different parameters; an identical policy is returned unchanged.
    pub fn create_retention_policy(
        &mut self,
        database: &str,
        spec: &RetentionPolicySpec,
        make_default: bool,
    ) -> anyhow::Result<&RetentionPolicyInfo> {
        if spec.name.is_empty() {
            return Err(anyhow!("retention policy name required"));
        }
        if spec.shard_group_duration.is_zero() {
            return Err(anyhow!("shard group duration must be positive"));
        }

        let db = self.database_mut(database)?;
        let matching = db
            .retention_policy(spec.name.as_str())
            .map(|rpi| spec.matches(rpi));
        match matching {
            Some(false) => {
                return Err(anyhow!(
                    "retention policy {} already exists with different parameters",
                    spec.name
                ));
            }
            Some(true) => {}
            None => {
                db.retention_policies.push(RetentionPolicyInfo::from_spec(spec));
                if make_default || db.default_retention_policy.is_empty() {
                    db.default_retention_policy = spec.name.clone();
                }
                self.save()?;
            }
        }

        self.retention_policy(database, spec.name.as_str())?
            .ok_or_else(|| anyhow!("retention policy not found: {}", spec.name))
    }

    /// drop_retention_policy removes the policy and returns it, including its shard groups.
    pub fn drop_retention_policy(&mut self, database: &str, name: &str) -> anyhow::Result<RetentionPolicyInfo> {
        let db = self.database_mut(database)?;
        let idx = db
            .retention_policies
            .iter()
            .position(|rp| rp.name == name)
            .ok_or_else(|| anyhow!("retention policy not found: {}", name))?;

        let rpi = db.retention_policies.remove(idx);
        if db.default_retention_policy == name {
            db.default_retention_policy.clear();
        }
        self.save()?;

        Ok(rpi)
    }

    pub fn shard_groups_by_time_range(
        &self,
        database: &str,
        rp: &str,
        start: i64,
        end: i64,
    ) -> anyhow::Result<Vec<ShardGroupInfo>> {
        let rpi = self
            .retention_policy(database, rp)?
            .ok_or_else(|| anyhow!("retention policy not found: {}", rp))?;

        Ok(rpi
            .shard_groups
            .iter()
            .filter(|sg| sg.overlaps(start, end))
            .cloned()
            .collect())
    }

    /// create_shard_group registers a new shard group covering exactly `[start, end)`.
    /// Overlapping an existing group is rejected rather than merged.
    pub fn create_shard_group(
        &mut self,
        database: &str,
        rp: &str,
        start: i64,
        end: i64,
    ) -> anyhow::Result<ShardGroupInfo> {
        if start >= end {
            return Err(anyhow!("invalid shard group range [{}, {})", start, end));
        }

        let existing = self.shard_groups_by_time_range(database, rp, start, end)?;
        if let Some(sg) = existing.first() {
            return Err(anyhow!(
                "shard group {} [{}, {}) overlaps requested range [{}, {})",
                sg.id,
                sg.start_time,
                sg.end_time,
                start,
                end
            ));
        }

        let sg = ShardGroupInfo {
            id: self.data.max_shard_group_id + 1,
            start_time: start,
            end_time: end,
            shards: vec![ShardInfo {
                id: self.data.max_shard_id + 1,
            }],
        };
        self.data.max_shard_group_id += 1;
        self.data.max_shard_id += 1;

        let rpi = self.retention_policy_mut(database, rp)?;
        rpi.shard_groups.push(sg.clone());
        rpi.shard_groups.sort_by_key(|x| x.start_time);
        self.save()?;

        Ok(sg)
    }

    pub fn delete_shard_group(&mut self, database: &str, rp: &str, id: u64) -> anyhow::Result<()> {
        let rpi = self.retention_policy_mut(database, rp)?;
        let before = rpi.shard_groups.len();
        rpi.shard_groups.retain(|sg| sg.id != id);
        if rpi.shard_groups.len() == before {
            return Err(anyhow!("shard group not found: {}", id));
        }
        self.save()
    }

    fn database_mut(&mut self, name: &str) -> anyhow::Result<&mut DatabaseInfo> {
        self.data
            .databases
            .iter_mut()
            .find(|db| db.name == name)
            .ok_or_else(|| anyhow!("database not found: {}", name))
    }

    fn retention_policy_mut(&mut self, database: &str, name: &str) -> anyhow::Result<&mut RetentionPolicyInfo> {
        self.database_mut(database)?
            .retention_policies
            .iter_mut()
            .find(|rp| rp.name == name)
            .ok_or_else(|| anyhow!("retention policy not found: {}", name))
    }

    fn save(&self) -> anyhow::Result<()> {
        let tmp = self.dir.join(META_TMP_FILE);
        let content = serde_json::to_vec_pretty(&self.data)?;

        let mut f = File::create(&tmp)?;
        f.write_all(content.as_slice())?;
        f.sync_all()?;
        drop(f);

        fs::rename(&tmp, self.dir.join(META_FILE))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::meta::{MetaClient, RetentionPolicySpec};

    fn spec(name: &str) -> RetentionPolicySpec {
        RetentionPolicySpec::new(name, Duration::from_secs(7 * 24 * 3600))
    }

    #[test]
    fn test_create_database_and_retention_policy() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = MetaClient::open(dir.path()).unwrap();

        client.create_database("db0").unwrap();
        let rpi = client.create_retention_policy("db0", &spec("rp0"), false).unwrap();
        assert_eq!(rpi.name, "rp0");
        assert_eq!(client.database("db0").unwrap().default_retention_policy, "rp0");

        // identical spec is accepted, a different one is rejected
        client.create_retention_policy("db0", &spec("rp0"), false).unwrap();
        let other = RetentionPolicySpec::new("rp0", Duration::from_secs(60));
        assert!(client.create_retention_policy("db0", &other, false).is_err());

        assert!(client.create_retention_policy("nodb", &spec("rp0"), false).is_err());
    }

    #[test]
    fn test_shard_groups() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = MetaClient::open(dir.path()).unwrap();
        client.create_database("db0").unwrap();
        client.create_retention_policy("db0", &spec("rp0"), false).unwrap();

        let sg1 = client.create_shard_group("db0", "rp0", 1000, 2000).unwrap();
        let sg2 = client.create_shard_group("db0", "rp0", 2000, 3000).unwrap();
        assert_ne!(sg1.id, sg2.id);
        assert_ne!(sg1.shards[0].id, sg2.shards[0].id);

        assert!(client.create_shard_group("db0", "rp0", 1500, 2500).is_err());
        assert!(client.create_shard_group("db0", "rp0", 5000, 5000).is_err());

        let groups = client.shard_groups_by_time_range("db0", "rp0", 0, 2001).unwrap();
        assert_eq!(groups.len(), 2);

        client.delete_shard_group("db0", "rp0", sg1.id).unwrap();
        assert!(client.delete_shard_group("db0", "rp0", sg1.id).is_err());
        client.create_shard_group("db0", "rp0", 1000, 2000).unwrap();
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut client = MetaClient::open(dir.path()).unwrap();
            client.create_database("db0").unwrap();
            client.create_retention_policy("db0", &spec("rp0"), true).unwrap();
            client.create_shard_group("db0", "rp0", 0, 10).unwrap();
        }

        let mut client = MetaClient::open(dir.path()).unwrap();
        let groups = client.shard_groups_by_time_range("db0", "rp0", 0, 10).unwrap();
        assert_eq!(groups.len(), 1);

        let sg = client.create_shard_group("db0", "rp0", 10, 20).unwrap();
        assert_eq!(sg.id, 2);

        let rpi = client.drop_retention_policy("db0", "rp0").unwrap();
        assert_eq!(rpi.shard_groups.len(), 2);
        assert!(client.retention_policy("db0", "rp0").unwrap().is_none());
        assert_eq!(client.database("db0").unwrap().default_retention_policy, "");
    }
}
