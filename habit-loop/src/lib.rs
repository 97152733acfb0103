//! Habit Loop - the daily visit loop for Omairi
//!
//! Turns location updates and visit evidence into streaks and rewards:
//!
//! - **Proximity**: location updates detect nearby landmarks
//! - **Eligibility**: one verified visit per local day (configurable)
//! - **Streaks**: consecutive local days, derived from the visit ledger
//! - **Rewards**: every recorded visit yields a reward bundle, queued for minting
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐   fixes   ┌──────────────────────────────────────┐
//! │ LocationWatch  │──────────▶│        HabitLoopController           │
//! └────────────────┘           │                                      │
//! ┌────────────────┐  midnight │  Idle ⇄ Nearby → Eligible → Visiting │
//! │ DayBoundary    │──────────▶│                     │                │
//! │ Scheduler      │           │        ┌────────────┼────────────┐   │
//! └────────────────┘           │        ▼            ▼            ▼   │
//!                              │  VisitAttestor  VisitLedger  Rewards │
//!                              └──────────────────────────────────────┘
//!                                               │ LoopEvent
//!                                               ▼
//!                                          subscribers
//! ```

pub mod config;
pub mod controller;
pub mod scheduler;
pub mod streak;
pub mod types;
pub mod watch;
pub mod weather;

pub use config::{ConfigError, DailyVisitPolicy, GeneralConfig, HabitLoopConfig};
pub use controller::{HabitLoopController, HabitLoopControllerBuilder};
pub use scheduler::DayBoundaryScheduler;
pub use types::*;
pub use watch::{ChannelLocationSource, LocationFeed, LocationWatch};
pub use weather::{FixedWeather, WeatherProvider};
