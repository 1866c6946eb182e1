//! Core type definitions using newtype patterns for type safety.
//!
//! Targets and port ranges are validated once at construction so the
//! engine never sees malformed input.

mod port;
mod scan_id;
mod target;

pub use port::{PortRange, PortRangeError, DEFAULT_PORT_RANGE, MAX_PORT};
pub use scan_id::ScanId;
pub use target::{Target, TargetError, MAX_HOSTNAME_LEN, MAX_LABEL_LEN};
