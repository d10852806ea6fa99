mod repository;
mod schema;

pub use repository::{FeedUpdate, Repository};
