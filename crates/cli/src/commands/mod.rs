pub mod ls;
pub mod rm;
pub mod scan;
pub mod snapshots;
pub mod status;
pub mod sync;
