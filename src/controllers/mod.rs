//! State owners that sit between views and the query cache.

pub mod detail;
pub mod mutation;
pub mod table;

pub use detail::{DetailController, DetailEvent, DetailSnapshot};
pub use mutation::{LinkField, MutationController, MutationError, MutationState};
pub use table::{PageSizePolicy, TableController, TableEvent};
