//! DNS resolution: the dispatcher and its upstream tier.

pub mod dispatcher;
pub mod upstream;

pub use dispatcher::{Answer, Dispatcher, ResolverContext, Source};
pub use upstream::{UpstreamClient, UpstreamLookup, UpstreamServer};
