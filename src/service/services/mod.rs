mod publish_history;
mod publish_status;
mod resource;
mod template;

pub use publish_history::PublishHistoryService;
pub use publish_status::{LedgerChange, PublishStatusService};
pub use resource::ResourceService;
pub use template::TemplateService;
