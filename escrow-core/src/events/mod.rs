//! Domain events and their dispatch
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐  Vec<DomainEvent>  ┌──────────────┐
//! │  Operation   │───────────────────▶│  Dispatcher  │
//! │ (CAS commit) │                    └──────┬───────┘
//! └──────────────┘                           │
//!                    ┌───────────────────────┼────────────────────┐
//!                    ▼                       ▼                    ▼
//!             ┌─────────────┐        ┌──────────────┐     ┌──────────────┐
//!             │  Audit log  │        │   Notifier   │     │  Event bus   │
//!             │ (admin only)│        │(fire&forget) │     │ (broadcast)  │
//!             └─────────────┘        └──────────────┘     └──────────────┘
//! ```

pub mod bus;
pub mod dispatcher;
pub mod types;

pub use bus::{EventBus, EventFilter, FilteredReceiver, SharedEventBus, DEFAULT_CHANNEL_CAPACITY};
pub use dispatcher::{DispatchReport, EventDispatcher};
pub use types::{DomainEvent, Outcome};
