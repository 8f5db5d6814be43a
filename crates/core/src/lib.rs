pub mod advisor;
pub mod config;
pub mod dialogue;
pub mod domain;
pub mod errors;
pub mod faq;
pub mod gateway;
pub mod intent;
pub mod policy;
pub mod session;

pub use advisor::{Advisor, AdvisorVerdict, NoopAdvisor};
pub use config::{AppConfig, BrandConfig, ConfigError, LoadOptions};
pub use dialogue::{DialogueController, DialogueError, Stage, TurnOutcome, STAGE_ORDER};
pub use domain::customer::{Customer, CustomerId};
pub use domain::faq::FaqEntry;
pub use domain::manual::Manual;
pub use domain::order::OrderStatus;
pub use domain::ticket::{MessageRole, Ticket, TicketId, TicketMessage, TicketStatus};
pub use errors::GatewayError;
pub use faq::{FaqCache, FaqMatch, FaqMatcher};
pub use gateway::{FaqSource, SupportGateway};
pub use intent::{detect, DetectedIntent, Intent};
pub use policy::{infer_issue_label, is_allowed, normalize_issue, IssueCode};
pub use session::{
    InMemorySessionStore, PendingTicketOffer, RepeatGuard, SessionFacts, SessionStore,
};
