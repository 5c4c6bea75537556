// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! An in-memory columnar collection.
//!
//! [`ColumnDataCollection`] accumulates typed batches by appending them into
//! segments of fixed-width chunks, and re-emits them through sequential or
//! parallel scans. Nested types (lists, structs) and variable-length strings
//! are supported, with out-of-line payloads owned by per-segment heaps.
//!
//! ```
//! use column_data::types::{DataType, DataValue};
//! use column_data::vector::DataChunkBuilder;
//! use column_data::ColumnDataCollection;
//!
//! let mut collection = ColumnDataCollection::new(vec![DataType::Int32]);
//! let mut builder = DataChunkBuilder::new([DataType::Int32]);
//! builder.push_row([DataValue::Int32(1)]);
//! builder.push_row([DataValue::Null]);
//! collection.append(&builder.finish()).unwrap();
//!
//! let mut state = collection.init_scan();
//! let mut chunk = collection.init_scan_chunk(&state);
//! while collection.scan(&mut state, &mut chunk) {
//!     println!("{chunk}");
//! }
//! ```

#![deny(unused_must_use)]

pub mod allocator;
mod collection;
mod copy;
mod error;
mod heap;
pub mod layout;
mod row;
mod scan;
mod segment;
pub mod types;
pub mod vector;

pub use self::collection::{ColumnDataAppendState, ColumnDataCollection};
pub use self::error::{Error, Result};
pub use self::layout::VECTOR_WIDTH;
pub use self::row::{Row, RowCollection};
pub use self::scan::{Chunks, LocalScanState, ParallelScanState, ScanProperties, ScanState};
