//! Learning algorithms.

pub mod ddpg;
