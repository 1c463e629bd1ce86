//! Message and record encoding microbenchmarks
//!
//! Run with: cargo bench --bench wire

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::net::Ipv4Addr;

extern crate tsmeta;

use tsmeta::ctable::codec::{decode_child_table, encode_child_table, CHILD_TABLE_RECORD_SIZE};
use tsmeta::ctable::ChildTable;
use tsmeta::types::{ColumnSchema, TableType};
use tsmeta::wire::{CreateTableMsg, VpeerDesc};

fn create_msg(columns: u16) -> CreateTableMsg {
  let mut schema: Vec<ColumnSchema> = (0..columns)
    .map(|idx| ColumnSchema::new(7, 8, idx, format!("col_{idx}")))
    .collect();
  schema.push(ColumnSchema::new(8, 32, columns, "location"));
  CreateTableMsg {
    table_id: "root.metrics.sensor_000123".to_string(),
    super_table_id: "root.metrics.sensor".to_string(),
    table_type: TableType::Child,
    num_of_columns: columns,
    num_of_tags: 1,
    sid: 123,
    sversion: 4,
    uid: 0x0000_0100_007b_0010,
    super_table_uid: 42,
    created_time: 1_700_000_000_000,
    vpeers: (1..=3)
      .map(|node| VpeerDesc {
        ip: Ipv4Addr::new(10, 0, 0, node),
        vnode: i32::from(node),
      })
      .collect(),
    schema,
    tag_data: vec![b'x'; 32],
  }
}

fn bench_create_message(c: &mut Criterion) {
  let mut group = c.benchmark_group("create_message");
  for columns in [4u16, 64, 512] {
    let msg = create_msg(columns);
    let encoded = msg.encode().expect("encode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_with_input(BenchmarkId::new("encode", columns), &msg, |b, msg| {
      b.iter(|| black_box(msg.encode().expect("encode")));
    });
    group.bench_with_input(BenchmarkId::new("decode", columns), &encoded, |b, bytes| {
      b.iter(|| black_box(CreateTableMsg::decode(bytes).expect("decode")));
    });
  }
  group.finish();
}

fn bench_record_codec(c: &mut Criterion) {
  let table = ChildTable {
    table_id: "root.metrics.sensor_000123".to_string(),
    super_table_id: "root.metrics.sensor".to_string(),
    table_type: TableType::Child,
    uid: 0x0000_0100_007b_0010,
    sid: 123,
    vg_id: 1,
    created_time: 1_700_000_000_000,
    super_table: None,
  };
  let mut buf = vec![0u8; CHILD_TABLE_RECORD_SIZE];
  encode_child_table(&table, &mut buf).expect("encode");

  let mut group = c.benchmark_group("record_codec");
  group.throughput(Throughput::Bytes(CHILD_TABLE_RECORD_SIZE as u64));
  group.bench_function("encode", |b| {
    let mut out = vec![0u8; CHILD_TABLE_RECORD_SIZE];
    b.iter(|| black_box(encode_child_table(&table, &mut out).expect("encode")));
  });
  group.bench_function("decode", |b| {
    b.iter(|| black_box(decode_child_table(&buf).expect("decode")));
  });
  group.finish();
}

criterion_group!(benches, bench_create_message, bench_record_codec);
criterion_main!(benches);
