// pybundle-aio/src/lib.rs
pub mod checksum;
pub mod extract;
pub mod fs;
pub mod process;
