//! Block sealing seam; the consensus puzzle lives outside this crate

pub mod producer;

pub use producer::{BlockProducer, HashSealer};
