#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/refcell/concord/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub use alloy_primitives::BlockNumber;

mod block;
pub use block::{BlockHead, BlockTag, decode_quantity};

mod error;
pub use error::{BackendError, FetchError};
