pub mod builder;
pub mod condition;

pub use builder::{DeleteBuilder, InsertBuilder, SelectBuilder, UpdateBuilder};
pub use condition::{
    Condition, Conjunction, Direction, Operand, Operator, OrderBy, OrderByCondition, Predicate,
    WhereCondition, validate_identifier,
};
