//! This module provides the pipeline stages and the clients for the model hub
//! and the object store they talk to

pub mod fetcher;
pub mod model_hub;
pub mod object_store;
pub mod orchestrator;
pub mod region_validator;
pub mod reporter;
pub mod s3_object_store;
pub mod uploader;
