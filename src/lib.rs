// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod diff;
pub mod fetch;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod notify;
pub mod poller;
pub mod session;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::diff::DiffOptions;
pub use crate::model::{
    ChangeEvent, ChangeField, FieldValue, QuotaState, Snapshot, SurveyState, SurveyStatus,
};
pub use crate::notify::{
    DeliveryReport, NotificationSink, SubscriberRef, SubscriptionLookup,
};
pub use crate::poller::{Poller, PollerOptions, SnapshotStore};
pub use crate::session::{Session, SessionManager};
