// ============================================================================
// Queries
// ============================================================================
//
// Predicates filter list elements and objects by key path. They are built
// either with the constructors on `Predicate` or parsed from text:
//
//     intCol > 3 AND stringCol BEGINSWITH[c] 'a'
//     objectCol.boolCol == false OR self IN {1, 2, 3}
//
// `Results` is the live, filterable collection of a class's objects.
//
// ============================================================================

mod parser;
pub mod pattern;
pub mod predicate;
pub mod results;

pub use predicate::{CompareOp, Predicate};
pub use results::Results;
