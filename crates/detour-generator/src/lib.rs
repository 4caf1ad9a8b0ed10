pub mod seq;

use std::sync::Arc;

use detour_core::MappingId;

pub use seq::{SeqGenerator, SeqSettings};

/// Trait for generating mapping identifiers.
///
/// Implementations are pure generators that don't interact with storage.
/// Stores assume every generated id is unique.
pub trait Generator: Send + Sync + 'static {
    type Output: Into<MappingId>;
    /// Generates a value that can be converted into a unique mapping id.
    fn generate(&self) -> Self::Output;

    /// Generates the next id as a [`MappingId`].
    fn next_id(&self) -> MappingId {
        self.generate().into()
    }
}

/// A shared generator hands out ids from a single sequence.
impl<G: Generator> Generator for Arc<G> {
    type Output = G::Output;

    fn generate(&self) -> Self::Output {
        G::generate(self)
    }
}
