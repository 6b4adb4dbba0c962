//! Domain - Pure Data Structures
//!
//! These types carry no I/O and represent the measurement domain.

pub mod bucket;
pub mod live_feed;
pub mod range;
pub mod reading;

pub use bucket::{Bucket, bucket_floor};
pub use live_feed::LiveFeed;
pub use range::ReportRange;
pub use reading::Reading;
