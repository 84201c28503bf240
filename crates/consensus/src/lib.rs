#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/refcell/concord/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

mod fetch;
pub use fetch::{GET_BLOCK_BY_NUMBER, fetch_block};

mod http;
pub use http::{DEFAULT_RATE_LIMIT_COOLDOWN, DEFAULT_TIMEOUT, HttpBackend, HttpBackendConfig};

pub mod metrics;

mod poller;
pub use poller::{
    ConsensusPoller, ConsensusPollerBuilder, ConsensusSnapshot, DEFAULT_GROUP_NAME,
    DEFAULT_POLL_INTERVAL,
};

mod resolver;
pub use resolver::{DEEP_WALK_BACK, Resolution};

mod scheduler;
pub use scheduler::{NoopScheduler, PollingScheduler, Scheduler};

mod state;
pub use state::{BackendSnapshot, BackendState};

mod tracker;
pub use tracker::InMemoryTracker;
