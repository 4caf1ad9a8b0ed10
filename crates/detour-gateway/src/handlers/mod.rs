mod dispatch;
mod events;
mod health;
mod mappings;
mod nodes;
mod resolve;

pub use dispatch::dispatch_handler;
pub use events::event_handler;
pub use health::health_handler;
pub use mappings::{
    create_mapping_handler, delete_mapping_handler, get_mapping_handler, list_mappings_handler,
    update_mapping_handler,
};
pub use nodes::{delete_node_handler, put_node_handler, vanity_handler};
pub use resolve::{propagation_handler, resolve_handler};
