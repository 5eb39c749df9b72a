pub mod model;
pub mod queries;
pub mod repository;
pub mod schema;

// Re-export commonly used types
pub use model::*;
pub use repository::AudioRepository;
