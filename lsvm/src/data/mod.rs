pub(crate) mod example;
mod group;
mod store;

pub use example::{BlockSpan, Example};
pub use group::{CollapsedGroup, collapse};
pub use store::ExampleStore;
