pub mod aggregation_store;
pub mod views;

pub use aggregation_store::AggregationStore;
pub use views::{FeedItem, LikerView};
