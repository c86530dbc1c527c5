mod api_key;
mod publish_history;
mod publish_status;
mod resource;
mod template;

pub use api_key::ApiKeyMemoryPersistence;
pub use publish_history::PublishHistoryMemoryPersistence;
pub use publish_status::PublishStatusMemoryPersistence;
pub use resource::ResourceMemoryPersistence;
pub use template::TemplateMemoryPersistence;
