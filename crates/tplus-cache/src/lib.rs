pub mod analysis;
pub mod clock;

pub use analysis::{AnalysisCache, CacheEntry, CacheKey};
pub use clock::{Clock, ManualClock, SystemClock};
