//! # Tower Race
//!
//! `tower-race` puts the [`race_core`] engine behind the
//! [Tower](https://github.com/tower-rs/tower) `Service` abstraction.
//!
//! ## The Managed Stack
//! [`managed_submit_service`] composes everything an ingress path needs:
//!
//! 1. **Backpressure**: [`SubmitService`] reserves queue room in `poll_ready`, so a
//!    full queue holds callers back instead of dropping their submissions.
//! 2. **Validation**: [`ValidateLayer`] rejects non-positive subject ids with
//!    `RaceError::InvalidSubject`.
//! 3. **Timeouts**: Waiting for queue room is bounded, failing with
//!    `RaceError::Timeout`.
//! 4. **Error Mapping**: Internal Tower errors are converted into the cloneable
//!    [`RaceError`] domain.
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`RaceError`], the HTTP router in [`http`],
//!   the load generator in [`mock`] and the `race_server` binary.

mod error;
mod layer;
mod managed_layer;
mod service;
mod utils;

#[cfg(feature = "axum")]
pub mod http;
#[cfg(feature = "axum")]
pub mod mock;


pub use error::RaceError;
pub use layer::ValidateFuture;
pub use layer::ValidateLayer;
pub use layer::ValidateService;
pub use managed_layer::ManagedSubmitLayer;
pub use service::Receipt;
pub use service::SubmitService;
pub use utils::ServiceBuilderExt;
pub use utils::managed_submit_service;
