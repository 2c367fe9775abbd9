//! Domain services for gpscanon-gi

pub mod guard;
pub mod snapshot;

pub use guard::{check_profile_delete, check_profile_update};
pub use snapshot::{build_snapshot, recover_snapshot};
