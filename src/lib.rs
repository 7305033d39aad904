mod database;
pub mod duration;
mod engine;
mod models;
mod scheduler;
mod view;

pub use crate::database::Database;
pub use crate::engine::{
    Clock, LiveTimer, SystemClock, TimerKey, TimerPhase, TimerRegistry, TransitionEvent,
    TransitionKind, TransitionSink,
};
pub use crate::models::{Category, Profile, TimerError, TimerListing};
pub use crate::scheduler::TickScheduler;
pub use crate::view::{CardUpdate, CategoryChoice, PresentationSurface, PresentationSync};


/// Инициализация логирования: по умолчанию info (если RUST_LOG не задан),
/// чтобы [TIMER]/[DB]/[TICK] были видны
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
