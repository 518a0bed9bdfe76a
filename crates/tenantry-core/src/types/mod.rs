pub mod context;
pub mod fact;
pub mod stream;

pub use context::ActorContext;
pub use fact::{Fact, FactDraft, FactId, FactMetadata, NewFact, StreamId};
pub use stream::StreamType;
