//! Uniform `CreateAction`/`Upload`/`Retrieve` execution API (C7, §2, §4.7):
//! the [`ExecutionApi`] trait plus a [`LocalApi`] backend (runs commands on
//! this machine against a local CAS) and a [`BazelApi`] backend (speaks the
//! trimmed REAPI subset of §6.1 to a remote endpoint).

mod api;
mod bazel;
mod bytestream;
mod dispatch;
mod error;
mod local;
mod server;

pub use api::{CacheMode, ExecutionAction, ExecutionApi, ExecutionResult};
pub use bazel::BazelApi;
pub use bytestream::{ReadRequest, WriteRequest, CHUNK_SIZE};
pub use dispatch::{BackendDescription, DispatchList};
pub use error::{ExecutionApiError, ExecutionApiResult};
pub use local::LocalApi;
pub use server::{serve, LocalReapiServer};
