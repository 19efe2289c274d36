//! HTTP transport for the reconciliation core.
//!
//! Every remote call goes through one [`Client`]: typed JSON requests, uniform
//! headers, and classification of each response into a typed value or one of
//! the three [`convergence::TransportError`] kinds. On top of the client this
//! crate implements the ports defined by `convergence`: [`TaskStatusProbe`] and
//! [`FetchProbe`] for the readiness poller, and [`UseCaseLinks`] for the set
//! reconciler.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** URL building, header policy, serialisation, redirect
//! detection, and diagnostic echo all live here. The `convergence` crate sees
//! only `TransportError`, `Probe`, and `MembershipOps`.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`client`] | `Client`, JSON calls, pagination |
//! | [`request`] | `RequestDescriptor`, `Reply`, `Page`, status classification |
//! | [`multipart`] | `FilePart`, `Client::upload` |
//! | [`probes`] | `TaskStatusProbe`, `FetchProbe`, `Client::wait_for_task` |
//! | [`links`] | `UseCaseLinks` |
//! | [`config`] | `ClientConfig`, `Settings::from_env` |
//!
//! ## Configuration
//!
//! The environment is read in exactly one place, [`Settings::from_env`]:
//!
//! - `DATAROBOT_API_KEY`: bearer credential (required).
//! - `DATAROBOT_ENDPOINT`: API base URL.
//! - `DATAROBOT_TRACE_CONTEXT`: value of the consumer trace header.
//! - `DATAROBOT_TIMEOUT_MINUTES`: readiness-poll budget.
//! - `TRACE_API_CALLS=1`, or `TF_LOG`/`TF_LOG_PROVIDER` set to `DEBUG` or
//!   `TRACE`: diagnostic echo of failed calls.

pub mod client;
pub mod config;
mod echo;
pub mod links;
pub mod multipart;
pub mod probes;
pub mod request;

pub use client::{Client, TRACE_CONTEXT_HEADER};
pub use config::{ClientConfig, ConfigError, Settings, DEFAULT_ENDPOINT, DEFAULT_USER_AGENT};
pub use links::UseCaseLinks;
pub use multipart::{FilePart, DEFAULT_FILE_FIELD, FILE_PATH_FIELD};
pub use probes::{FetchProbe, ObjectState, TaskOutcome, TaskStatus, TaskStatusProbe};
pub use request::{is_no_content, redirected, Page, Redirected, Reply, RequestDescriptor, MAX_ERROR_BODY};

/// HTTP method type accepted by [`Client::execute`] and [`Client::upload`].
pub use reqwest::Method;
