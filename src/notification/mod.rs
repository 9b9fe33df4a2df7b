// Notification pipeline: matching, recipient resolution, dispatch queue,
// and the consumer loop that drains it.

pub mod dispatch;
pub mod matcher;
pub mod pipeline;
pub mod resolver;
pub mod template;
pub mod worker;

pub use dispatch::{DispatchQueue, SendReceipt, SendResult};
pub use matcher::{match_event, ConfigCache, ConfigSnapshot};
pub use pipeline::NotificationPipeline;
pub use resolver::{RecipientResolver, ResolvedRecipient};
pub use template::{PlaceholderRenderer, TemplateRenderer};
pub use worker::{ChannelTransport, DispatchWorker};
