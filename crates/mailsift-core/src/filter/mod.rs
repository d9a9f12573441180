//! Rule-based message filtering: models, predicate matching, action
//! execution, and the engine that ties them to the store.

pub mod engine;
pub mod executor;
pub mod matcher;
pub mod model;
pub mod repository;

pub use engine::{AppliedFilter, FilterEngine, FilterRun};
pub use executor::{ActionExecutor, ActionOutcome};
pub use model::{
    ConditionField, ConditionOperator, Filter, FilterAction, FilterActionKind, FilterCondition,
    NewFilter,
};
pub use repository::{FilterRepository, FilterStats};
