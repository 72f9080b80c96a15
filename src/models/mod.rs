//! A/B-testing wire and result types
//!
//! Request side: fetch parameters supplied by callers and the body posted to
//! the experiment endpoint. Response side: experiments as returned by the
//! endpoint, which are also what the experiment cache stores, and the
//! per-parameter result handed back to callers.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{FetchParams, FetchRequest};
pub use responses::{Experiment, ExperimentResponse, ExperimentResult, Variable};
