// src/query/mod.rs
//! Query core: request parameters -> typed filters -> predicates -> recipes,
//! pages and CSV exports.

pub mod export;
pub mod page;
pub mod pipeline;
pub mod predicate;
pub mod recipes;
pub mod spec;

pub use page::{Page, PageRequest};
pub use predicate::{compile, Condition, Predicate};
pub use spec::{parse, FilterSpec};
