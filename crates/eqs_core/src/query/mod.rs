//! Query language, execution and results
//!
//! A [`QueryModel`] names reference points, an optional [`AreaOfInterest`],
//! filter conditions and weighted scoring criteria. The [`QueryExecutor`]
//! turns it into a ranked [`QueryResult`].

mod area;
mod executor;
mod model;
mod result;

pub use area::{AreaOfInterest, AreaShape, AreaType};
pub use executor::QueryExecutor;
pub use model::{
    ConditionKind, ConditionSpec, CriterionKind, CriterionSpec, Normalization, QueryModel, ReferencePoint,
};
pub use result::{Candidate, QueryResult, QueryStatus};
