use std::path::PathBuf;

use hashspill_core::{
    bucket_for_hash, framed_len, KeyHasher, PartitionedRelation, RapidKeyHasher, RelationConfig,
    Row, RowCodec, SpillError, TempDirAllocator, Value,
};

use crate::common::{maybe_setup_tracing, random_rows, rng_from_env, row_id, row_key};

fn replay_all(relation: &PartitionedRelation<RowCodec>) -> Vec<Row> {
    let mut rows = Vec::new();
    for partition in relation {
        for row in partition.get_data().unwrap() {
            rows.push(row.unwrap());
        }
    }
    rows
}

fn check_relation(relation: &PartitionedRelation<RowCodec>, input: &[Row], seed: u64) {
    // Every row lands in the bucket its key hashes to.
    for partition in relation {
        for row in partition.get_data().unwrap() {
            let row = row.unwrap();
            let hash = RapidKeyHasher.hash_key(&row_key(&row));
            assert_eq!(
                bucket_for_hash(hash, relation.len()),
                partition.idx(),
                "seed {seed}: row {} in the wrong partition",
                row_id(&row)
            );
        }
    }

    // Nothing lost, nothing duplicated.
    let mut replayed = replay_all(relation);
    replayed.sort_by_key(row_id);
    assert_eq!(replayed.len(), input.len(), "seed {seed}");
    assert!(replayed.iter().zip(input).all(|(a, b)| a == b), "seed {seed}");

    // Spilled chunks plus the in-memory tails account for every framed byte.
    let on_disk: usize = relation
        .iter()
        .flat_map(|p| p.chunk_sizes().iter().copied())
        .sum();
    let in_memory: usize = relation.iter().map(|p| p.buffered_bytes()).sum();
    let expected: usize = input.iter().map(|r| framed_len(&RowCodec, r)).sum();
    assert_eq!(on_disk + in_memory, expected, "seed {seed}");

    let stats = relation.stats();
    assert_eq!(stats.records_received, input.len() as u64);
    assert_eq!(stats.records_discarded, 0);
    assert_eq!(stats.bytes_spilled, on_disk as u64);
}

#[test]
fn test_default_config_end_to_end() {
    maybe_setup_tracing();
    let (mut rng, seed) = rng_from_env();
    let input = random_rows(&mut rng, 10_000);
    let allocator = TempDirAllocator::new().unwrap();
    let config = RelationConfig::default();
    assert_eq!(config.partition_count, 64);
    assert_eq!(config.block_size, 64_000);

    let mut relation =
        PartitionedRelation::build(input.clone(), row_key, RowCodec, &config, &allocator).unwrap();
    assert_eq!(relation.len(), 64);
    check_relation(&relation, &input, seed);

    // Replaying again yields the same content.
    let mut first = replay_all(&relation);
    let mut second = replay_all(&relation);
    first.sort_by_key(row_id);
    second.sort_by_key(row_id);
    assert_eq!(first, second);

    relation.close_all_partitions().unwrap();
}

#[test]
fn test_small_block_size_forces_spills() {
    maybe_setup_tracing();
    let (mut rng, seed) = rng_from_env();
    let input = random_rows(&mut rng, 10_000);
    let allocator = TempDirAllocator::new().unwrap();
    let config = RelationConfig {
        partition_count: 16,
        block_size: 512,
        ..RelationConfig::default()
    };

    let mut relation =
        PartitionedRelation::build(input.clone(), row_key, RowCodec, &config, &allocator).unwrap();
    let stats = relation.stats();
    assert_eq!(stats.spilled_partitions, 16, "seed {seed}");
    for partition in &relation {
        assert!(partition.is_spilled());
        assert!(partition.chunk_sizes().len() > 1);
        // Once spilled, close_input flushes the tail to disk as well.
        assert_eq!(partition.buffered_records(), 0);
        let file_len = std::fs::metadata(partition.path()).unwrap().len();
        assert_eq!(
            file_len,
            partition.chunk_sizes().iter().sum::<usize>() as u64
        );
    }
    check_relation(&relation, &input, seed);

    relation.close_all_partitions().unwrap();
}

#[test]
fn test_single_partition_keeps_input_order() {
    let allocator = TempDirAllocator::new().unwrap();
    let config = RelationConfig {
        partition_count: 1,
        block_size: 200,
        ..RelationConfig::default()
    };
    let input: Vec<Row> = (0..500)
        .map(|i| Row::new(vec![Value::Integer(i), Value::Integer(-i)]))
        .collect();

    let relation =
        PartitionedRelation::build(input.clone(), row_key, RowCodec, &config, &allocator).unwrap();
    assert!(relation.partition(0).unwrap().is_spilled());
    assert_eq!(replay_all(&relation), input);
}

#[test]
fn test_empty_input() {
    let allocator = TempDirAllocator::new().unwrap();
    let mut relation = PartitionedRelation::build(
        Vec::<Row>::new(),
        row_key,
        RowCodec,
        &RelationConfig::default(),
        &allocator,
    )
    .unwrap();
    for partition in &relation {
        assert!(partition.is_input_closed());
        assert!(partition.chunk_sizes().is_empty());
        assert_eq!(partition.get_data().unwrap().count(), 0);
    }
    relation.close_all_partitions().unwrap();
}

#[test]
fn test_negative_hashes_route_in_range() {
    let allocator = TempDirAllocator::new().unwrap();
    let config = RelationConfig {
        partition_count: 7,
        ..RelationConfig::default()
    };
    let input: Vec<Row> = (-1000i64..1000)
        .map(|i| Row::new(vec![Value::Integer(i), Value::Integer(i)]))
        .collect();
    let identity = |key: &i64| *key;

    let relation = PartitionedRelation::build_with_hasher(
        input,
        |row: &Row| row_id(row),
        &identity,
        RowCodec,
        &config,
        &allocator,
    )
    .unwrap();

    let mut total = 0;
    for partition in &relation {
        for row in partition.get_data().unwrap() {
            let id = row_id(&row.unwrap());
            assert_eq!(id.rem_euclid(7) as usize, partition.idx());
            total += 1;
        }
    }
    assert_eq!(total, 2000);
}

#[test]
fn test_zero_partitions_is_invalid_argument() {
    let allocator = TempDirAllocator::new().unwrap();
    let config = RelationConfig {
        partition_count: 0,
        ..RelationConfig::default()
    };
    let result =
        PartitionedRelation::build(Vec::<Row>::new(), row_key, RowCodec, &config, &allocator);
    assert!(matches!(result, Err(SpillError::InvalidArgument(_))));
    assert_eq!(std::fs::read_dir(allocator.path()).unwrap().count(), 0);
}

#[test]
fn test_close_all_removes_files() {
    maybe_setup_tracing();
    let (mut rng, _) = rng_from_env();
    let allocator = TempDirAllocator::new().unwrap();
    let config = RelationConfig {
        partition_count: 8,
        block_size: 256,
        ..RelationConfig::default()
    };
    let mut relation = PartitionedRelation::build(
        random_rows(&mut rng, 2_000),
        row_key,
        RowCodec,
        &config,
        &allocator,
    )
    .unwrap();

    let paths: Vec<PathBuf> = relation.iter().map(|p| p.path().to_path_buf()).collect();
    assert!(paths.iter().all(|p| p.exists()));

    relation.close_all_partitions().unwrap();
    assert!(paths.iter().all(|p| !p.exists()));
    assert_eq!(std::fs::read_dir(allocator.path()).unwrap().count(), 0);

    // Closed partitions refuse replay; closing again is harmless.
    for partition in &relation {
        assert!(matches!(
            partition.get_data(),
            Err(SpillError::InvalidState(_))
        ));
    }
    relation.close_all_partitions().unwrap();
}

#[test]
fn test_dropping_relation_removes_files() {
    let dir = tempfile::tempdir().unwrap();
    let allocator = TempDirAllocator::new_in(dir.path()).unwrap();
    let config = RelationConfig {
        partition_count: 4,
        block_size: 64,
        ..RelationConfig::default()
    };
    let input: Vec<Row> = (0..200)
        .map(|i| Row::new(vec![Value::Integer(i), Value::Integer(i)]))
        .collect();
    let relation = PartitionedRelation::build(input, row_key, RowCodec, &config, &allocator).unwrap();
    assert_eq!(std::fs::read_dir(allocator.path()).unwrap().count(), 4);
    drop(relation);
    assert_eq!(std::fs::read_dir(allocator.path()).unwrap().count(), 0);
}
