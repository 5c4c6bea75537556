// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use thiserror::Error;

use crate::types::DataType;

/// The error type of collection operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("schema mismatch: expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        expected: Vec<DataType>,
        found: Vec<DataType>,
    },
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("out of memory: allocating {requested} bytes would exceed the budget of {budget} bytes")]
    OutOfMemory { requested: usize, budget: usize },
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn internal(message: impl ToString) -> Self {
        Error::Internal(message.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
