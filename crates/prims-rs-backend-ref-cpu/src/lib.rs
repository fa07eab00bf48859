//! Reference CPU backend for `prims-rs`.
//!
//! Executes every primitive over dense host storage with one canonical
//! representation per type category. Correctness and readability take
//! priority over speed; this backend exists to pin down semantics and to
//! back the integration tests.

pub mod cpu;

pub use cpu::{CpuBackend, CpuTensor, Storage};
