//! Services that wire the protection tiers together.

mod guard;
mod recovery;
mod scheduler;

pub use guard::{DataGuard, IntegrityCheck, StartupReport};
pub use recovery::{RecoveryChain, RecoverySource};
pub use scheduler::BackgroundJobs;
