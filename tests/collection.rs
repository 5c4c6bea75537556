// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use column_data::allocator::{ColumnDataAllocator, BLOCK_SIZE};
use column_data::types::{DataType, DataValue, Interval};
use column_data::vector::{DataChunk, DataChunkBuilder, Vector};
use column_data::{
    ColumnDataCollection, Error, LocalScanState, ScanProperties, VECTOR_WIDTH,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

fn int32_chunk(values: &[Option<i32>]) -> DataChunk {
    let mut builder = DataChunkBuilder::new([DataType::Int32]);
    for value in values {
        builder.push_row([value.map(DataValue::Int32).unwrap_or(DataValue::Null)]);
    }
    builder.finish()
}

fn int32_collection(values: &[Option<i32>]) -> ColumnDataCollection {
    let mut collection = ColumnDataCollection::new(vec![DataType::Int32]);
    collection.append(&int32_chunk(values)).unwrap();
    collection
}

fn collect_rows(collection: &ColumnDataCollection) -> Vec<Vec<DataValue>> {
    let mut rows = Vec::new();
    for chunk in collection.chunks() {
        for row in 0..chunk.cardinality() {
            rows.push(chunk.row_values(row));
        }
    }
    rows
}

#[test]
fn s1_integers_single_chunk() {
    let collection = int32_collection(&[Some(1), Some(2), Some(3), None, Some(5)]);
    assert_eq!(collection.row_count(), 5);
    assert_eq!(collection.chunk_count(), 1);
    collection.verify();

    let rows = collect_rows(&collection);
    assert_eq!(
        rows,
        vec![
            vec![DataValue::Int32(1)],
            vec![DataValue::Int32(2)],
            vec![DataValue::Int32(3)],
            vec![DataValue::Null],
            vec![DataValue::Int32(5)],
        ]
    );
}

#[test]
fn s2_chunk_rollover() {
    let mut collection = ColumnDataCollection::new(vec![DataType::Int64]);
    let mut builder = DataChunkBuilder::new([DataType::Int64]);
    for i in 0..2500 {
        builder.push_row([DataValue::Int64(i)]);
    }
    collection.append(&builder.finish()).unwrap();
    collection.verify();

    assert_eq!(collection.row_count(), 2500);
    assert_eq!(collection.chunk_count(), 3);
    let sizes: Vec<usize> = collection.chunks().map(|c| c.cardinality()).collect();
    assert_eq!(sizes, vec![VECTOR_WIDTH, VECTOR_WIDTH, 452]);

    let rows = collect_rows(&collection);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row[0], DataValue::Int64(i as i64));
    }
}

#[test]
fn s3_strings_heap_path() {
    let long = "a-very-long-string-exceeding-inline-threshold-XXXXXXXXXXXXXXXXXXXXXX";
    let mut collection = ColumnDataCollection::new(vec![DataType::Varchar]);
    let mut builder = DataChunkBuilder::new([DataType::Varchar]);
    builder.push_row([DataValue::String("".into())]);
    builder.push_row([DataValue::String("short".into())]);
    builder.push_row([DataValue::String(long.into())]);
    builder.push_row([DataValue::Null]);
    collection.append(&builder.finish()).unwrap();

    let rows = collect_rows(&collection);
    assert_eq!(rows[0][0], DataValue::String("".into()));
    assert_eq!(rows[1][0], DataValue::String("short".into()));
    assert_eq!(rows[2][0], DataValue::String(long.into()));
    assert_eq!(rows[3][0], DataValue::Null);
}

fn list_of_int32(values: &[Option<Vec<i32>>]) -> DataChunk {
    let ty = DataType::List(Box::new(DataType::Int32));
    let mut builder = DataChunkBuilder::new([ty]);
    for value in values {
        let value = match value {
            Some(items) => DataValue::List(items.iter().copied().map(DataValue::Int32).collect()),
            None => DataValue::Null,
        };
        builder.push_row([value]);
    }
    builder.finish()
}

#[test]
fn s4_nested_list() {
    let ty = DataType::List(Box::new(DataType::Int32));
    let mut collection = ColumnDataCollection::new(vec![ty]);
    collection
        .append(&list_of_int32(&[
            Some(vec![1, 2]),
            Some(vec![]),
            Some(vec![3, 4, 5]),
            None,
        ]))
        .unwrap();

    let chunk = collection.chunks().next().unwrap();
    let column = chunk.column_at(0);
    assert_eq!(column.list_entry(0), Some((0, 2)));
    assert_eq!(column.list_entry(1), Some((2, 0)));
    assert_eq!(column.list_entry(2), Some((2, 3)));
    assert_eq!(column.list_entry(3), None);

    let child = column.list_child();
    assert_eq!(child.len(), 5);
    let child_values: Vec<DataValue> = (0..5).map(|i| child.get_value(i)).collect();
    assert_eq!(
        child_values,
        (1..=5).map(DataValue::Int32).collect::<Vec<_>>()
    );

    assert_eq!(
        chunk.row_values(3),
        vec![DataValue::Null],
        "a null list stays null"
    );
}

#[test]
fn s5_struct_of_int_and_varchar() {
    let ty = DataType::Struct(vec![
        ("a".into(), DataType::Int32),
        ("b".into(), DataType::Varchar),
    ]);
    let mut collection = ColumnDataCollection::new(vec![ty.clone()]);
    let mut builder = DataChunkBuilder::new([ty]);
    builder.push_row([DataValue::Struct(vec![
        DataValue::Int32(1),
        DataValue::String("a".into()),
    ])]);
    builder.push_row([DataValue::Struct(vec![
        DataValue::Null,
        DataValue::String("b".into()),
    ])]);
    builder.push_row([DataValue::Struct(vec![DataValue::Int32(2), DataValue::Null])]);
    collection.append(&builder.finish()).unwrap();

    let chunk = collection.chunks().next().unwrap();
    let column = chunk.column_at(0);
    // parent rows are all valid; nulls sit in the fields
    for row in 0..3 {
        assert!(!column.get_value(row).is_null());
    }
    assert_eq!(
        collect_rows(&collection),
        vec![
            vec![DataValue::Struct(vec![
                DataValue::Int32(1),
                DataValue::String("a".into())
            ])],
            vec![DataValue::Struct(vec![
                DataValue::Null,
                DataValue::String("b".into())
            ])],
            vec![DataValue::Struct(vec![DataValue::Int32(2), DataValue::Null])],
        ]
    );
}

#[test]
fn s6_parallel_scan() {
    let mut collection = ColumnDataCollection::new(vec![DataType::Int32]);
    for segment in 0..10 {
        let values: Vec<Option<i32>> = (0..VECTOR_WIDTH as i32)
            .map(|i| Some(segment * VECTOR_WIDTH as i32 + i))
            .collect();
        collection.combine(int32_collection(&values)).unwrap();
    }
    assert_eq!(collection.row_count(), 10 * VECTOR_WIDTH);
    assert_eq!(collection.chunk_count(), 10);

    let state = collection.init_parallel_scan();
    let (values, chunks_seen) = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let mut local = LocalScanState::default();
                    let mut out = collection.init_chunk();
                    let mut values = Vec::new();
                    let mut chunks = 0;
                    while collection.scan_parallel(&state, &mut local, &mut out) {
                        chunks += 1;
                        for row in 0..out.cardinality() {
                            match out.column_at(0).get_value(row) {
                                DataValue::Int32(v) => values.push(v),
                                other => panic!("unexpected value {other:?}"),
                            }
                        }
                    }
                    (values, chunks)
                })
            })
            .collect();
        let mut values = Vec::new();
        let mut chunks_seen = 0;
        for worker in workers {
            let (v, c) = worker.join().unwrap();
            values.extend(v);
            chunks_seen += c;
        }
        (values, chunks_seen)
    });

    // every chunk claimed exactly once, and the union of rows is the input
    assert_eq!(chunks_seen, collection.chunk_count());
    let mut values = values;
    values.sort_unstable();
    assert_eq!(values, (0..10 * VECTOR_WIDTH as i32).collect::<Vec<_>>());
}

#[test]
fn parallel_scan_single_worker_matches_sequential() {
    let values: Vec<Option<i32>> = (0..3000)
        .map(|i| (i % 7 != 0).then_some(i))
        .collect();
    let collection = int32_collection(&values);

    let state = collection.init_parallel_scan();
    let mut local = LocalScanState::default();
    let mut out = collection.init_chunk();
    let mut parallel_rows = Vec::new();
    while collection.scan_parallel(&state, &mut local, &mut out) {
        for row in 0..out.cardinality() {
            parallel_rows.push(out.row_values(row));
        }
    }
    assert_eq!(parallel_rows, collect_rows(&collection));
}

#[test]
fn value_and_validity_round_trip_randomized() {
    let mut rng = StdRng::seed_from_u64(42);
    let types = vec![DataType::Int32, DataType::Varchar, DataType::Float64];
    let mut collection = ColumnDataCollection::new(types.clone());

    let mut expected = Vec::new();
    let mut builder = DataChunkBuilder::new(types.clone());
    for _ in 0..3000 {
        let int = (!rng.gen_bool(0.2)).then(|| rng.gen_range(-1000..1000));
        let string = (!rng.gen_bool(0.2)).then(|| {
            let len = rng.gen_range(0..40);
            (0..len).map(|_| rng.gen_range('a'..='z')).collect::<String>()
        });
        let float = (!rng.gen_bool(0.2)).then(|| rng.gen::<f64>());
        let row = vec![
            int.map(DataValue::Int32).unwrap_or(DataValue::Null),
            string.map(DataValue::String).unwrap_or(DataValue::Null),
            float
                .map(|f| DataValue::Float64(f.into()))
                .unwrap_or(DataValue::Null),
        ];
        builder.push_row(row.clone());
        expected.push(row);
    }
    collection.append(&builder.finish()).unwrap();
    collection.verify();
    assert_eq!(collect_rows(&collection), expected);
}

#[test]
fn fixed_width_types_round_trip() {
    let types = vec![
        DataType::Bool,
        DataType::Int16,
        DataType::Int128,
        DataType::Interval,
        DataType::Decimal { width: 9, scale: 2 },
        DataType::Blob,
    ];
    let mut collection = ColumnDataCollection::new(types.clone());
    let mut builder = DataChunkBuilder::new(types);
    let rows = vec![
        vec![
            DataValue::Bool(true),
            DataValue::Int16(-7),
            DataValue::Int128(i128::MAX - 1),
            DataValue::Interval(Interval::new(14, 3, 5_000_000)),
            DataValue::Decimal(Decimal::new(-12345, 2)),
            DataValue::Blob(vec![0, 1, 2, 255]),
        ],
        vec![
            DataValue::Null,
            DataValue::Null,
            DataValue::Null,
            DataValue::Null,
            DataValue::Null,
            DataValue::Null,
        ],
        vec![
            DataValue::Bool(false),
            DataValue::Int16(i16::MIN),
            DataValue::Int128(-1),
            DataValue::Interval(Interval::new(0, -2, -1)),
            DataValue::Decimal(Decimal::new(99999, 2)),
            DataValue::Blob((0..64).collect()),
        ],
    ];
    for row in &rows {
        builder.push_row(row.clone());
    }
    collection.append(&builder.finish()).unwrap();
    assert_eq!(collect_rows(&collection), rows);
}

#[test]
fn chunk_boundary_exact_multiple() {
    let values: Vec<Option<i32>> = (0..2 * VECTOR_WIDTH as i32).map(Some).collect();
    let collection = int32_collection(&values);
    let sizes: Vec<usize> = collection.chunks().map(|c| c.cardinality()).collect();
    assert_eq!(sizes, vec![VECTOR_WIDTH, VECTOR_WIDTH]);
}

#[test]
fn multiple_appends_fill_partial_chunks() {
    let mut collection = ColumnDataCollection::new(vec![DataType::Int32]);
    let mut next = 0;
    for size in [100, VECTOR_WIDTH, 7, 900, 321] {
        let values: Vec<Option<i32>> = (0..size as i32).map(|i| Some(next + i)).collect();
        next += size as i32;
        collection.append(&int32_chunk(&values)).unwrap();
    }
    collection.verify();
    assert_eq!(collection.row_count(), 100 + VECTOR_WIDTH + 7 + 900 + 321);

    // rows come back in append order regardless of chunk boundaries
    let rows = collect_rows(&collection);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row[0], DataValue::Int32(i as i32));
    }
    // every chunk except the last is full
    let sizes: Vec<usize> = collection.chunks().map(|c| c.cardinality()).collect();
    for &size in &sizes[..sizes.len() - 1] {
        assert_eq!(size, VECTOR_WIDTH);
    }
}

#[test]
fn combine_is_associative() {
    let a = || int32_collection(&[Some(1), Some(2)]);
    let b = || int32_collection(&[None, Some(4)]);
    let c = || int32_collection(&[Some(5)]);

    let mut left = a();
    left.combine(b()).unwrap();
    left.combine(c()).unwrap();

    let mut right_tail = b();
    right_tail.combine(c()).unwrap();
    let mut right = a();
    right.combine(right_tail).unwrap();

    assert_eq!(collect_rows(&left), collect_rows(&right));
    ColumnDataCollection::result_equals(&left, &right).unwrap();
}

#[test]
fn scan_initialize_is_idempotent() {
    let values: Vec<Option<i32>> = (0..2500).map(|i| (i % 3 != 0).then_some(i)).collect();
    let collection = int32_collection(&values);

    let first: Vec<_> = collect_rows(&collection);
    let second: Vec<_> = collect_rows(&collection);
    assert_eq!(first, second);

    // a scan that keeps its pins produces the same batches
    let mut state =
        collection.init_scan_with(vec![0], ScanProperties::KeepPinned);
    let mut out = collection.init_scan_chunk(&state);
    let mut kept = Vec::new();
    while collection.scan(&mut state, &mut out) {
        for row in 0..out.cardinality() {
            kept.push(out.row_values(row));
        }
    }
    assert_eq!(kept, first);
}

#[test]
fn list_children_chain_past_vector_width() {
    // 1024 lists of 3 elements: the child chain spans three linked vectors
    let ty = DataType::List(Box::new(DataType::Int32));
    let mut collection = ColumnDataCollection::new(vec![ty]);
    let lists: Vec<Option<Vec<i32>>> = (0..VECTOR_WIDTH as i32)
        .map(|i| Some(vec![3 * i, 3 * i + 1, 3 * i + 2]))
        .collect();
    collection.append(&list_of_int32(&lists)).unwrap();

    let chunk = collection.chunks().next().unwrap();
    let column = chunk.column_at(0);
    let child_total = column.list_child().len() as u64;
    assert_eq!(child_total, 3 * VECTOR_WIDTH as u64);
    for row in 0..chunk.cardinality() {
        let (offset, length) = column.list_entry(row).unwrap();
        assert!(offset + length <= child_total);
    }
    for (row, expected) in lists.iter().enumerate() {
        let expected = expected.as_ref().unwrap();
        assert_eq!(
            chunk.row_values(row)[0],
            DataValue::List(expected.iter().copied().map(DataValue::Int32).collect())
        );
    }
}

#[test]
fn list_append_split_across_chunks() {
    // one append spanning a chunk boundary: each chunk's child chain is
    // self-contained
    let ty = DataType::List(Box::new(DataType::Int32));
    let mut collection = ColumnDataCollection::new(vec![ty]);
    let lists: Vec<Option<Vec<i32>>> = (0..1500)
        .map(|i| {
            if i % 11 == 0 {
                None
            } else {
                Some(vec![i, i + 1])
            }
        })
        .collect();
    collection.append(&list_of_int32(&lists)).unwrap();
    assert_eq!(collection.chunk_count(), 2);

    for chunk in collection.chunks() {
        let column = chunk.column_at(0);
        let child_total = column.list_child().len() as u64;
        for row in 0..chunk.cardinality() {
            if let Some((offset, length)) = column.list_entry(row) {
                assert!(offset + length <= child_total);
            }
        }
    }

    let rows = collect_rows(&collection);
    for (i, row) in rows.iter().enumerate() {
        let expected = match &lists[i] {
            Some(items) => DataValue::List(items.iter().copied().map(DataValue::Int32).collect()),
            None => DataValue::Null,
        };
        assert_eq!(row[0], expected);
    }
}

#[test]
fn list_of_structs_round_trip() {
    let ty = DataType::List(Box::new(DataType::Struct(vec![
        ("id".into(), DataType::Int32),
        ("name".into(), DataType::Varchar),
    ])));
    let mut collection = ColumnDataCollection::new(vec![ty.clone()]);
    let mut builder = DataChunkBuilder::new([ty]);
    let mut expected = Vec::new();
    for i in 0..600 {
        let value = if i % 13 == 0 {
            DataValue::Null
        } else {
            DataValue::List(
                (0..i % 5)
                    .map(|j| {
                        DataValue::Struct(vec![
                            DataValue::Int32(i * 10 + j),
                            if j == 0 {
                                DataValue::Null
                            } else {
                                DataValue::String(format!("row-{i}-{j}"))
                            },
                        ])
                    })
                    .collect(),
            )
        };
        builder.push_row([value.clone()]);
        expected.push(vec![value]);
    }
    collection.append(&builder.finish()).unwrap();
    assert_eq!(collect_rows(&collection), expected);
}

#[test]
fn constant_and_dictionary_sources() {
    let mut collection = ColumnDataCollection::new(vec![DataType::Int32, DataType::Varchar]);

    let ints = Vector::constant(DataType::Int32, &DataValue::Int32(7), 100);
    let mut base = Vector::new(DataType::Varchar);
    base.push(&DataValue::String("x".into()));
    base.push(&DataValue::Null);
    let strings = base.into_dictionary((0..100).map(|i| (i % 2) as u32).collect());
    let chunk: DataChunk = [ints, strings].into_iter().collect();
    collection.append(&chunk).unwrap();

    let rows = collect_rows(&collection);
    assert_eq!(rows.len(), 100);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row[0], DataValue::Int32(7));
        if i % 2 == 0 {
            assert_eq!(row[1], DataValue::String("x".into()));
        } else {
            assert_eq!(row[1], DataValue::Null);
        }
    }
}

#[test]
fn append_after_seal_fails() {
    let mut source = int32_collection(&[Some(1)]);
    let mut copy = ColumnDataCollection::new_from(&mut source);
    assert!(source.is_sealed());
    assert!(matches!(
        source.append(&int32_chunk(&[Some(2)])),
        Err(Error::InvalidState(_))
    ));

    // the new collection shares the allocator but starts empty and open
    copy.append(&int32_chunk(&[Some(2)])).unwrap();
    assert_eq!(copy.row_count(), 1);

    // reset reopens a sealed collection
    source.reset();
    assert_eq!(source.row_count(), 0);
    source.append(&int32_chunk(&[Some(3)])).unwrap();
    assert_eq!(
        collect_rows(&source),
        vec![vec![DataValue::Int32(3)]]
    );
}

#[test]
fn schema_mismatch_is_rejected() {
    let mut collection = ColumnDataCollection::new(vec![DataType::Int32]);
    let mut builder = DataChunkBuilder::new([DataType::Int64]);
    builder.push_row([DataValue::Int64(1)]);
    assert!(matches!(
        collection.append(&builder.finish()),
        Err(Error::SchemaMismatch { .. })
    ));

    let mut other = ColumnDataCollection::new(vec![DataType::Varchar]);
    let mut b = DataChunkBuilder::new([DataType::Varchar]);
    b.push_row([DataValue::String("x".into())]);
    other.append(&b.finish()).unwrap();
    assert!(matches!(
        collection.combine(other),
        Err(Error::SchemaMismatch { .. })
    ));
}

#[test]
fn allocator_budget_surfaces_out_of_memory() {
    let allocator = Arc::new(ColumnDataAllocator::with_budget(1024));
    let mut collection =
        ColumnDataCollection::with_allocator(allocator, vec![DataType::Int32]);
    assert!(matches!(
        collection.append(&int32_chunk(&[Some(1)])),
        Err(Error::OutOfMemory { .. })
    ));

    let allocator = Arc::new(ColumnDataAllocator::with_budget(4 * BLOCK_SIZE));
    let mut collection =
        ColumnDataCollection::with_allocator(allocator, vec![DataType::Int32]);
    collection.append(&int32_chunk(&[Some(1)])).unwrap();
}

#[test]
fn fetch_chunk_resolves_global_index() {
    let values: Vec<Option<i32>> = (0..2500).map(Some).collect();
    let mut collection = int32_collection(&values);
    collection
        .combine(int32_collection(&[Some(9000)]))
        .unwrap();

    let mut out = collection.init_chunk();
    collection.fetch_chunk(2, &mut out).unwrap();
    assert_eq!(out.cardinality(), 452);
    assert_eq!(out.column_at(0).get_value(0), DataValue::Int32(2048));

    collection.fetch_chunk(3, &mut out).unwrap();
    assert_eq!(out.cardinality(), 1);
    assert_eq!(out.column_at(0).get_value(0), DataValue::Int32(9000));

    assert!(matches!(
        collection.fetch_chunk(4, &mut out),
        Err(Error::Internal(_))
    ));
}

#[test]
fn result_equals_detects_mismatches() {
    let a = int32_collection(&[Some(1), None, Some(3)]);
    let b = int32_collection(&[Some(1), None, Some(3)]);
    ColumnDataCollection::result_equals(&a, &b).unwrap();

    // a difference on the right side must be reported
    let c = int32_collection(&[Some(1), None, Some(4)]);
    let message = ColumnDataCollection::result_equals(&a, &c).unwrap_err();
    assert!(message.contains("row: 2"), "unexpected message: {message}");

    let short = int32_collection(&[Some(1)]);
    assert_eq!(
        ColumnDataCollection::result_equals(&a, &short).unwrap_err(),
        "row count mismatch"
    );
}

#[test]
fn row_view_indexes_across_chunks() {
    let values: Vec<Option<i32>> = (0..1500).map(Some).collect();
    let collection = int32_collection(&values);
    let rows = collection.rows();
    assert_eq!(rows.len(), 1500);
    assert_eq!(rows.get_value(0, 1337), DataValue::Int32(1337));
    assert_eq!(rows.get(1337).row_index(), 1337);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.value(0), DataValue::Int32(i as i32));
    }
}

#[test]
fn column_projection_scan() {
    let types = vec![DataType::Int32, DataType::Varchar];
    let mut collection = ColumnDataCollection::new(types.clone());
    let mut builder = DataChunkBuilder::new(types);
    for i in 0..10 {
        builder.push_row([DataValue::Int32(i), DataValue::String(format!("s{i}"))]);
    }
    collection.append(&builder.finish()).unwrap();

    let mut state = collection.init_scan_with(vec![1], ScanProperties::default());
    let mut out = collection.init_scan_chunk(&state);
    assert!(collection.scan(&mut state, &mut out));
    assert_eq!(out.column_count(), 1);
    assert_eq!(out.column_at(0).get_value(3), DataValue::String("s3".into()));
    assert!(!collection.scan(&mut state, &mut out));
}
