pub mod coordinator;
pub mod request;

pub use coordinator::Coordinator;
pub use request::RequestContext;
