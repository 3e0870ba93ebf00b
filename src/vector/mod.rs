pub mod client;

pub use client::{DocumentInput, DocumentMetadata, VectorClient, VectorError};
