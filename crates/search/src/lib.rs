mod error;
mod filter;
mod grouping;
mod ladder;
mod records;
mod window;

pub use error::{Result, SearchError};
pub use filter::{QueryFilter, QuerySource};
pub use grouping::{group_and_rank, ExclusionRuleSet, ExclusionRules};
pub use ladder::{
    AdaptiveSearch, AttemptStat, LadderStep, RelaxationLadder, SearchOutcome, BASE_STEP_LABEL,
    FILL_IN_STEP_LABEL,
};
pub use records::{extract_records, RecordFields};
pub use window::{TimeWindow, WindowUnit};
