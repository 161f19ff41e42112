pub mod errors;
pub mod frame;
pub mod jsonl;
pub mod model;
pub mod products;

pub use errors::ParserError;
pub use frame::records_to_frame;
pub use jsonl::parse_review_lines;
pub use model::{MalformedLinePolicy, Record, ReviewBatch, SkippedLine};
pub use products::parse_product_array;
