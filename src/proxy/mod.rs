//! Proxy config module for extracting and checking config links
//!
//! This module provides functionality for:
//! - Extracting config links from free text and stamping a display label
//! - Resolving a link to the host and port it connects to
//! - Checking endpoint liveness with bounded concurrency

pub mod extractor;
pub mod models;
pub mod prober;
pub mod resolver;

pub use extractor::RecordExtractor;
pub use models::{ConnectionRecord, LivenessStatus, ProbeResult, ProbeTarget, Scheme};
pub use prober::{LivenessProber, ProberConfig};
pub use resolver::EndpointResolver;
