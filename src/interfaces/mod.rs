//! Batch input and output of the `paygate` binary.

pub mod csv;
