//! Object store seam: existence probes and uploads.

pub mod backend;
pub mod object;

pub use backend::{content_type_for, RemoteExistenceChecker, RemoteState, Uploader};
pub use object::{ObjectStore, S3Settings};
