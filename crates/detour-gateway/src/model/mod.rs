mod error;
mod event;
mod health;
mod mapping;
mod node;
mod resolve;

pub use error::ErrorResponse;
pub use event::{ContentEvent, EventQuery, EventResponse};
pub use health::HealthResponse;
pub use mapping::{ListMappingsQuery, MappingRequest, MappingResponse, RedirectRequest, WriteQuery};
pub use node::{NodeRequest, VanityRequest, VanityResponse};
pub use resolve::{PropagationQuery, ResolveQuery};
