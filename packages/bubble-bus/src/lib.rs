//! # Bubble Bus
//!
//! A process-local publish/subscribe registry for matchmaking facts
//! (a group became complete, two groups matched).
//!
//! ```text
//! FormationDetector ──publish(BubbleFormed)──┐
//!                                            ▼
//!                                        EventBus ──► handler 1 (stream relay)
//!                                            ▲    ──► handler 2 (badge counter)
//! DecisionEngine ───publish(MatchCreated)────┘    ──► handler n
//! ```
//!
//! ## Guarantees
//!
//! - **Synchronous**: `publish` returns after every handler has run.
//! - **Ordered**: handlers run in subscription order.
//! - **Isolated**: a handler that errors or panics is logged and skipped,
//!   later handlers still run.
//! - **No replay**: a handler subscribed after `publish` returned never sees
//!   that event. Durable state lives in the candidate store.
//!
//! The bus is an owned value, cloned by handle. There is no global instance.

mod bus;
mod event;

pub use bus::{EventBus, Subscription, SubscriptionId};
pub use event::Event;
