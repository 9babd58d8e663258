//! Store query construction: clause AST plus the claim-specific builders.

pub mod clauses;
pub mod mark_claimed;

pub use clauses::{BoolClause, QueryClause, RangeBound, TaskField, TaskSort, TimeRef};
pub use mark_claimed::{ClaimUpdateScript, FieldUpdates};
