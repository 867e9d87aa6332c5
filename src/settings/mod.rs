//! This module provides the job configuration and optional static credentials

pub mod file_credentials;
pub mod job_settings;
