//! # Architecture Abstraction Layer
//!
//! Hardware boundary of the kernel. Implements the Cortex-M port (ARMv7-M
//! and ARMv8-M Mainline); extensible to other architectures by adding
//! sibling modules.

pub mod cortex_m;
