// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! In-process column vectors.
//!
//! A [`Vector`] holds up to one batch worth of values for a single column:
//! fixed-width payloads in a byte buffer, a validity bitmap, a vector-local
//! heap for out-of-line strings, and child vectors for nested types. Vectors
//! may be flat, constant, or dictionary-encoded; [`Vector::to_unified`]
//! canonicalizes all three into a `(data, selection, validity)` view so that
//! consumers are decoupled from the physical layout.

mod data_chunk;
pub use data_chunk::*;

use bitvec::prelude::BitSlice;
use bitvec::vec::BitVec;

use crate::layout::{
    read_list_entry, read_string_entry, write_list_entry, write_string_entry, StringEntry,
    ENTRY_SIZE, STRING_INLINE_LENGTH,
};
use crate::types::{DataType, DataValue, Interval, PhysicalType};

/// How a vector's logical rows map onto its physical entries.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoding {
    /// Row `i` is entry `i`.
    Flat,
    /// Every row is entry `0`.
    Constant,
    /// Row `i` is entry `sel[i]`.
    Dictionary(Vec<u32>),
}

/// A column of values.
pub struct Vector {
    data_type: DataType,
    physical: PhysicalType,
    encoding: Encoding,
    /// Logical number of rows.
    len: usize,
    /// Physical entries, `physical.size()` bytes each.
    data: Vec<u8>,
    /// One bit per physical entry.
    valid: BitVec,
    /// Out-of-line string payloads of this vector.
    heap: Vec<u8>,
    /// List element vector or struct field vectors.
    pub(crate) children: Vec<Vector>,
}

impl Vector {
    /// Creates an empty flat vector, including empty child vectors for
    /// nested types.
    pub fn new(data_type: DataType) -> Self {
        let children = match &data_type {
            DataType::List(child) => vec![Vector::new((**child).clone())],
            DataType::Struct(fields) => fields
                .iter()
                .map(|(_, ty)| Vector::new(ty.clone()))
                .collect(),
            _ => Vec::new(),
        };
        let physical = data_type.physical_type();
        Vector {
            data_type,
            physical,
            encoding: Encoding::Flat,
            len: 0,
            data: Vec::new(),
            valid: BitVec::new(),
            heap: Vec::new(),
            children,
        }
    }

    /// A vector repeating `value` for `len` rows.
    pub fn constant(data_type: DataType, value: &DataValue, len: usize) -> Self {
        let mut vector = Vector::new(data_type);
        vector.push(value);
        vector.encoding = Encoding::Constant;
        vector.len = len;
        vector
    }

    /// Re-reads this flat vector through a selection vector.
    pub fn into_dictionary(mut self, sel: Vec<u32>) -> Self {
        assert!(self.is_flat(), "dictionary base must be flat");
        self.len = sel.len();
        self.encoding = Encoding::Dictionary(sel);
        self
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn physical_type(&self) -> PhysicalType {
        self.physical
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.encoding, Encoding::Flat)
    }

    /// The element vector of a list. Panics on non-list vectors.
    pub fn list_child(&self) -> &Vector {
        assert_eq!(self.physical, PhysicalType::List);
        &self.children[0]
    }

    /// The field vectors of a struct. Panics on non-struct vectors.
    pub fn struct_children(&self) -> &[Vector] {
        assert_eq!(self.physical, PhysicalType::Struct);
        &self.children
    }

    /// Clears all rows, keeping the type tree.
    pub fn reset(&mut self) {
        self.encoding = Encoding::Flat;
        self.len = 0;
        self.data.clear();
        self.valid.clear();
        self.heap.clear();
        for child in &mut self.children {
            child.reset();
        }
    }

    fn physical_index(&self, idx: usize) -> usize {
        match &self.encoding {
            Encoding::Flat => idx,
            Encoding::Constant => 0,
            Encoding::Dictionary(sel) => sel[idx] as usize,
        }
    }

    /// Appends a value to a flat vector.
    ///
    /// The value must match the vector's logical type; pushing `Null` onto a
    /// struct vector keeps the field vectors aligned by pushing `Null` into
    /// each of them.
    pub fn push(&mut self, value: &DataValue) {
        assert!(self.is_flat(), "push requires a flat vector");
        if value.is_null() {
            self.push_null();
            return;
        }
        match (&self.data_type, value) {
            (DataType::Bool, DataValue::Bool(v)) => self.data.push(*v as u8),
            (DataType::Int8, DataValue::Int8(v)) => self.data.extend_from_slice(&v.to_le_bytes()),
            (DataType::Int16, DataValue::Int16(v)) => self.data.extend_from_slice(&v.to_le_bytes()),
            (DataType::Int32, DataValue::Int32(v)) => self.data.extend_from_slice(&v.to_le_bytes()),
            (DataType::Int64, DataValue::Int64(v)) => self.data.extend_from_slice(&v.to_le_bytes()),
            (DataType::Int128, DataValue::Int128(v)) => {
                self.data.extend_from_slice(&v.to_le_bytes())
            }
            (DataType::UInt8, DataValue::UInt8(v)) => self.data.extend_from_slice(&v.to_le_bytes()),
            (DataType::UInt16, DataValue::UInt16(v)) => {
                self.data.extend_from_slice(&v.to_le_bytes())
            }
            (DataType::UInt32, DataValue::UInt32(v)) => {
                self.data.extend_from_slice(&v.to_le_bytes())
            }
            (DataType::UInt64, DataValue::UInt64(v)) => {
                self.data.extend_from_slice(&v.to_le_bytes())
            }
            (DataType::Float32, DataValue::Float32(v)) => {
                self.data.extend_from_slice(&v.0.to_le_bytes())
            }
            (DataType::Float64, DataValue::Float64(v)) => {
                self.data.extend_from_slice(&v.0.to_le_bytes())
            }
            (DataType::Decimal { scale, .. }, DataValue::Decimal(v)) => {
                let mut value = *v;
                value.rescale(*scale as u32);
                let mantissa = value.mantissa().to_le_bytes();
                self.data.extend_from_slice(&mantissa[..self.physical.size()]);
            }
            (DataType::Interval, DataValue::Interval(v)) => {
                self.data.extend_from_slice(&v.months.to_le_bytes());
                self.data.extend_from_slice(&v.days.to_le_bytes());
                self.data.extend_from_slice(&v.micros.to_le_bytes());
            }
            (DataType::Varchar, DataValue::String(v)) => return self.push_bytes(v.as_bytes()),
            (DataType::Blob, DataValue::Blob(v)) => return self.push_bytes(v),
            (DataType::List(_), DataValue::List(values)) => {
                let child = &mut self.children[0];
                let offset = child.len() as u64;
                for value in values {
                    child.push(value);
                }
                let start = self.data.len();
                self.data.resize(start + ENTRY_SIZE, 0);
                write_list_entry(&mut self.data[start..], offset, values.len() as u64);
            }
            (DataType::Struct(_), DataValue::Struct(values)) => {
                assert_eq!(values.len(), self.children.len(), "struct arity mismatch");
                for (child, value) in self.children.iter_mut().zip(values) {
                    child.push(value);
                }
            }
            (ty, value) => panic!("failed to push value: type mismatch ({ty:?}, {value:?})"),
        }
        self.valid.push(true);
        self.len += 1;
    }

    /// Appends a null row: a zeroed entry with its validity bit cleared.
    ///
    /// Struct fields are padded with nulls to stay aligned with the parent;
    /// a null list contributes no child elements.
    pub(crate) fn push_null(&mut self) {
        self.data.resize(self.data.len() + self.physical.size(), 0);
        if self.physical == PhysicalType::Struct {
            for child in &mut self.children {
                child.push(&DataValue::Null);
            }
        }
        self.valid.push(false);
        self.len += 1;
    }

    /// Appends a string/blob payload, inlining short ones and spilling long
    /// ones to the vector-local heap.
    pub(crate) fn push_bytes(&mut self, payload: &[u8]) {
        debug_assert_eq!(self.physical, PhysicalType::Varchar);
        let heap_offset = if payload.len() > STRING_INLINE_LENGTH {
            let offset = self.heap.len() as u64;
            self.heap.extend_from_slice(payload);
            offset
        } else {
            0
        };
        let inline = if payload.len() <= STRING_INLINE_LENGTH {
            payload
        } else {
            &[]
        };
        let start = self.data.len();
        self.data.resize(start + ENTRY_SIZE, 0);
        write_string_entry(&mut self.data[start..], payload.len(), inline, heap_offset);
        self.valid.push(true);
        self.len += 1;
    }

    /// Appends a list entry whose offsets are already resolved against this
    /// vector's child.
    pub(crate) fn push_list_entry(&mut self, offset: u64, length: u64, valid: bool) {
        debug_assert_eq!(self.physical, PhysicalType::List);
        let start = self.data.len();
        self.data.resize(start + ENTRY_SIZE, 0);
        if valid {
            write_list_entry(&mut self.data[start..], offset, length);
        }
        self.valid.push(valid);
        self.len += 1;
    }

    /// Appends a payload-free row; used for struct vectors.
    pub(crate) fn push_validity(&mut self, valid: bool) {
        debug_assert_eq!(self.physical.size(), 0);
        self.valid.push(valid);
        self.len += 1;
    }

    /// Bulk-appends `count` raw fixed-width entries with their validity.
    pub(crate) fn extend_fixed(
        &mut self,
        data: &[u8],
        count: usize,
        mut valid: impl FnMut(usize) -> bool,
    ) {
        let size = self.physical.size();
        debug_assert!(size > 0 && data.len() >= count * size);
        self.data.extend_from_slice(&data[..count * size]);
        for i in 0..count {
            self.valid.push(valid(i));
        }
        self.len += count;
    }

    /// Reads the value at `idx`, materializing nested values recursively.
    pub fn get_value(&self, idx: usize) -> DataValue {
        assert!(idx < self.len, "row index out of bounds");
        let idx = self.physical_index(idx);
        if !self.valid[idx] {
            return DataValue::Null;
        }
        let size = self.physical.size();
        let entry = &self.data[idx * size..(idx + 1) * size];
        match &self.data_type {
            DataType::Bool => DataValue::Bool(entry[0] != 0),
            DataType::Int8 => DataValue::Int8(i8::from_le_bytes(entry.try_into().unwrap())),
            DataType::Int16 => DataValue::Int16(i16::from_le_bytes(entry.try_into().unwrap())),
            DataType::Int32 => DataValue::Int32(i32::from_le_bytes(entry.try_into().unwrap())),
            DataType::Int64 => DataValue::Int64(i64::from_le_bytes(entry.try_into().unwrap())),
            DataType::Int128 => DataValue::Int128(i128::from_le_bytes(entry.try_into().unwrap())),
            DataType::UInt8 => DataValue::UInt8(entry[0]),
            DataType::UInt16 => DataValue::UInt16(u16::from_le_bytes(entry.try_into().unwrap())),
            DataType::UInt32 => DataValue::UInt32(u32::from_le_bytes(entry.try_into().unwrap())),
            DataType::UInt64 => DataValue::UInt64(u64::from_le_bytes(entry.try_into().unwrap())),
            DataType::Float32 => {
                DataValue::Float32(f32::from_le_bytes(entry.try_into().unwrap()).into())
            }
            DataType::Float64 => {
                DataValue::Float64(f64::from_le_bytes(entry.try_into().unwrap()).into())
            }
            DataType::Decimal { scale, .. } => {
                let mut mantissa = [0u8; 16];
                mantissa[..size].copy_from_slice(entry);
                // sign-extend the truncated little-endian mantissa
                if entry[size - 1] & 0x80 != 0 {
                    mantissa[size..].fill(u8::MAX);
                }
                DataValue::Decimal(rust_decimal::Decimal::from_i128_with_scale(
                    i128::from_le_bytes(mantissa),
                    *scale as u32,
                ))
            }
            DataType::Interval => DataValue::Interval(Interval::new(
                i32::from_le_bytes(entry[0..4].try_into().unwrap()),
                i32::from_le_bytes(entry[4..8].try_into().unwrap()),
                i64::from_le_bytes(entry[8..16].try_into().unwrap()),
            )),
            DataType::Varchar => {
                let payload = self.entry_payload(idx);
                // SAFETY: only valid UTF-8 enters varchar vectors.
                DataValue::String(unsafe { std::str::from_utf8_unchecked(payload) }.to_string())
            }
            DataType::Blob => DataValue::Blob(self.entry_payload(idx).to_vec()),
            DataType::List(_) => {
                let (offset, length) = read_list_entry(entry);
                let child = &self.children[0];
                DataValue::List(
                    (offset..offset + length)
                        .map(|i| child.get_value(i as usize))
                        .collect(),
                )
            }
            DataType::Struct(_) => DataValue::Struct(
                self.children
                    .iter()
                    .map(|child| child.get_value(idx))
                    .collect(),
            ),
        }
    }

    /// The raw `(offset, length)` entry of a list row, or `None` for null
    /// rows. Offsets index into [`Vector::list_child`].
    pub fn list_entry(&self, idx: usize) -> Option<(u64, u64)> {
        assert_eq!(self.physical, PhysicalType::List);
        assert!(idx < self.len, "row index out of bounds");
        let idx = self.physical_index(idx);
        self.valid[idx]
            .then(|| read_list_entry(&self.data[idx * ENTRY_SIZE..(idx + 1) * ENTRY_SIZE]))
    }

    fn entry_payload(&self, physical_idx: usize) -> &[u8] {
        let entry = &self.data[physical_idx * ENTRY_SIZE..(physical_idx + 1) * ENTRY_SIZE];
        match read_string_entry(entry) {
            StringEntry::Inline(payload) => payload,
            StringEntry::Heap { offset, len } => {
                &self.heap[offset as usize..offset as usize + len]
            }
        }
    }

    /// Canonicalizes this vector into a `(data, selection, validity)` view.
    pub fn to_unified(&self) -> UnifiedFormat<'_> {
        let sel = match &self.encoding {
            Encoding::Flat => Sel::Identity,
            Encoding::Constant => Sel::Zero,
            Encoding::Dictionary(sel) => Sel::Slice(sel),
        };
        UnifiedFormat {
            data: &self.data,
            heap: &self.heap,
            validity: self.valid.as_bitslice(),
            sel,
        }
    }

    /// Materializes a flat copy of this vector.
    pub fn flatten(&self) -> Vector {
        let mut flat = Vector::new(self.data_type.clone());
        for idx in 0..self.len {
            flat.push(&self.get_value(idx));
        }
        flat
    }
}

enum Sel<'a> {
    Identity,
    Zero,
    Slice(&'a [u32]),
}

/// Canonicalized read view of a vector, independent of its encoding.
pub struct UnifiedFormat<'a> {
    pub(crate) data: &'a [u8],
    pub(crate) heap: &'a [u8],
    validity: &'a BitSlice,
    sel: Sel<'a>,
}

impl UnifiedFormat<'_> {
    /// Maps a logical row index to a physical entry index.
    pub fn index(&self, idx: usize) -> usize {
        match self.sel {
            Sel::Identity => idx,
            Sel::Zero => 0,
            Sel::Slice(sel) => sel[idx] as usize,
        }
    }

    pub fn is_valid(&self, physical_idx: usize) -> bool {
        self.validity.get(physical_idx).map_or(true, |bit| *bit)
    }
}
