//! HTTP native transfer facility for bgdl.
//!
//! Implements [`NativeTransferPort`](bgdl_core::NativeTransferPort) with
//! `reqwest`. Transfers are journaled in the staging directory so a restarted
//! process finds them again and can resume partially received payloads.

mod config;
mod error;
mod facility;
mod journal;
mod throttle;

pub use config::{DEFAULT_USER_AGENT, HttpFacilityConfig, JOURNAL_FILE};
pub use error::{HttpFacilityError, HttpResult};
pub use facility::HttpTransferFacility;
pub use throttle::ProgressThrottle;
