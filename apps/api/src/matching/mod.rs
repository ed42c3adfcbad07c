//! Resume / job matching on top of the LLM client.
//!
//! `matcher` scores one pair, `batch` fans a job out over many resumes, `extraction`
//! pulls structured fields from free text and `ats` is the deterministic keyword and
//! formatting report. `store` persists results; `handlers` exposes all of it over HTTP.

pub mod ats;
pub mod batch;
pub mod extraction;
pub mod handlers;
pub mod matcher;
pub mod prompts;
pub mod store;
