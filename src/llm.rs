//! Text-generation backends and the provider selection policy.

pub mod cleanup;
pub mod dummy;
pub mod hosted;
pub mod local;
pub mod provider;
pub mod routing;

pub use dummy::DummyGenerator;
pub use hosted::HostedBackend;
pub use local::LocalBackend;
pub use provider::{Backend, BackendReply, BackendSet, BackendStatus};
pub use routing::Availability;
