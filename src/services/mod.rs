//! Service Layer
//!
//! The ingestion pipeline and everything around it: transports, local
//! storage, remote sync and reporting.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   chunks   ┌──────────────────────────────────────┐
//! │  Transport   │──────────▶ │ Session (reader, watchdog, signal)   │
//! │ BLE/Classic  │            │   Pipeline: parser ▶ bucketer        │
//! └──────────────┘            └──────────┬───────────────┬───────────┘
//!                               closed   │               │  closed
//!                               bucket   ▼               ▼  bucket
//!                              ┌──────────────┐  ┌────────────────┐
//!                              │  LocalStore  │  │  RemoteSync    │
//!                              │  (durable)   │  │ (best effort)  │
//!                              └──────┬───────┘  └───────┬────────┘
//!                                     └──────┬───────────┘
//!                                            ▼
//!                                ReportService (reconcile + filter)
//! ```
//!
//! Everything reports back to the host through [`ServiceEvent`].

mod bucketer;
mod events;
mod kv;
mod parser;
mod pipeline;
mod reconcile;
mod remote;
mod report;
mod session;
mod store;
mod transport;

#[cfg(test)]
mod testing;

pub use bucketer::*;
pub use events::*;
pub use kv::*;
pub use parser::*;
pub use pipeline::*;
pub use reconcile::*;
pub use remote::*;
pub use report::*;
pub use session::*;
pub use store::*;
pub use transport::*;
