//! This module provides common objects used throughout the entire application

pub mod error;
pub mod run_state;
pub mod transfer_event;
pub mod transfer_job;
pub mod upload_record;
pub mod upload_summary;
