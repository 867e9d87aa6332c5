//! # hub2s3
//!
//! Mirrors a Hugging Face model repository into an S3 bucket: the bucket
//! region is checked, the repository is staged on local disk, then every
//! staged file is uploaded and removed locally once it is stored.
//!
//! The library is primarily used by the hub2s3 binary, but can also be used
//! for integration testing with S3-compatible storage.

#![forbid(unsafe_code)]

pub mod cli;
pub mod model;
pub mod services;
pub mod settings;
pub mod utils;
