mod api_key;
mod publish_history;
mod publish_status;
mod resource;
mod template;

pub use api_key::ApiKeyRelationalPersistence;
pub use publish_history::PublishHistoryRelationalPersistence;
pub use publish_status::PublishStatusRelationalPersistence;
pub use resource::ResourceRelationalPersistence;
pub use template::TemplateRelationalPersistence;
