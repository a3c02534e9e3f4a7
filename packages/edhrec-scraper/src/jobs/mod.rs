//! The two-phase scraping pipeline: a discovery run over the ranked
//! commander list, then one independently scheduled detail job per
//! commander.

pub mod detail;
pub mod discovery;

pub use detail::DetailJob;
pub use discovery::DiscoveryJob;
