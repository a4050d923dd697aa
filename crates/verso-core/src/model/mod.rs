pub mod document;
pub mod ids;

pub use document::Document;
pub use ids::{DocId, SessionId};
