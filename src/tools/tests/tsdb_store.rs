use std::time::Duration;

use common_base::value::{FieldType, FieldValue, Value};
use influxdb_tools::command::import::{ImportCommand, ImportConfig};
use influxdb_tools::error::ImportError;
use influxdb_tools::format::binary::{Header, SeriesHeader, Writer};
use influxdb_tsdb::config::{Config, IndexVersion};
use influxdb_tsdb::engine::shard::reader::ShardReader;
use influxdb_tsdb::engine::shard::shard_file_name;
use influxdb_tsdb::index::tsi1::measurement_block::MeasurementBlock;
use influxdb_tsdb::index::INDEX_FILE_NAME;
use influxdb_tsdb::Server;

fn export() -> Vec<u8> {
    let mut w = Writer::new(vec![]);
    w.write_header(&Header::new("telegraf", "autogen", 3_600_000_000_000))
        .unwrap();

    w.write_bucket_header(0, 3_600_000_000_000).unwrap();
    w.write_series_header(&SeriesHeader::new(FieldType::Float, b"cpu,host=a", b"usage"))
        .unwrap();
    w.write_points(&[Value::float(10, 0.5), Value::float(20, 0.7)])
        .unwrap();
    w.write_series_footer().unwrap();
    w.write_series_header(&SeriesHeader::new(FieldType::String, b"syslog,host=a", b"msg"))
        .unwrap();
    w.write_points(&[Value::new(10, FieldValue::String(b"boot".to_vec()))])
        .unwrap();
    w.write_series_footer().unwrap();
    w.write_bucket_footer().unwrap();

    w.write_bucket_header(3_600_000_000_000, 7_200_000_000_000).unwrap();
    w.write_series_header(&SeriesHeader::new(FieldType::Unsigned, b"cpu,host=a", b"ticks"))
        .unwrap();
    w.write_points(&[Value::new(3_600_000_000_001, FieldValue::Unsigned(9))])
        .unwrap();
    w.write_series_footer().unwrap();
    w.write_bucket_footer().unwrap();

    w.into_inner()
}

fn server(dir: &std::path::Path, build_tsi: bool) -> Server {
    let mut config = Config::with_base_dir(dir);
    if build_tsi {
        config.data.index_version = IndexVersion::Tsi1;
    }
    Server::new(config)
}

fn import_config() -> ImportConfig {
    let mut config = ImportConfig::new("telegraf", "autogen");
    config.shard_duration = Duration::from_secs(3600);
    config
}

#[test]
fn test_import_into_tsdb() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = ImportCommand::new(server(dir.path(), true), import_config());
    cmd.run(export().as_slice()).unwrap();

    let mut server = cmd.into_store();
    server.open().unwrap();
    let rpi = server
        .retention_policy("telegraf", "autogen")
        .unwrap()
        .unwrap();
    assert_eq!(rpi.shard_group_duration, Duration::from_secs(3600));
    assert_eq!(rpi.shard_groups.len(), 2);
    assert_eq!(rpi.shard_groups[0].start_time, 0);
    assert_eq!(rpi.shard_groups[1].end_time, 7_200_000_000_000);

    let shard_id = rpi.shard_groups[0].shards[0].id;
    let shard_dir = server.shard_path("telegraf", "autogen", shard_id);
    let r = ShardReader::open(shard_dir.join(shard_file_name(1, 1))).unwrap();
    assert_eq!(
        r.read(b"cpu,host=a#!~#usage").unwrap(),
        vec![Value::float(10, 0.5), Value::float(20, 0.7)]
    );
    assert_eq!(
        r.read(b"syslog,host=a#!~#msg").unwrap(),
        vec![Value::new(10, FieldValue::String(b"boot".to_vec()))]
    );

    let block = MeasurementBlock::open(shard_dir.join(INDEX_FILE_NAME)).unwrap();
    assert_eq!(block.measurement_names(), vec![&b"cpu"[..], &b"syslog"[..]]);

    // the series file keeps one id per key across shard groups
    let shard_id = rpi.shard_groups[1].shards[0].id;
    let block = MeasurementBlock::open(
        server
            .shard_path("telegraf", "autogen", shard_id)
            .join(INDEX_FILE_NAME),
    )
    .unwrap();
    assert_eq!(block.series_ids(b"cpu"), Some(&[1_u64][..]));
}

#[test]
fn test_import_into_tsdb_twice() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = ImportCommand::new(server(dir.path(), false), import_config());
    cmd.run(export().as_slice()).unwrap();

    let mut cmd = ImportCommand::new(server(dir.path(), false), import_config());
    assert!(matches!(
        cmd.run(export().as_slice()),
        Err(ImportError::Conflict { .. })
    ));

    let mut config = import_config();
    config.replace = true;
    let mut cmd = ImportCommand::new(server(dir.path(), false), config);
    let stats = cmd.run(export().as_slice()).unwrap();
    assert_eq!(stats.points, 4);

    let mut server = cmd.into_store();
    server.open().unwrap();
    let rpi = server
        .retention_policy("telegraf", "autogen")
        .unwrap()
        .unwrap();
    assert_eq!(rpi.shard_groups.len(), 2);
}
