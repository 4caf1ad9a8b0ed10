use crate::Generator;
use detour_core::MappingId;
use std::sync::atomic::{AtomicU64, Ordering};
use typed_builder::TypedBuilder;

/// Configures a [`SeqGenerator`].
///
/// For several writers sharing one store, give each writer the same
/// `stride` and a distinct `offset` below it (writer 0 of 4 uses offset 0,
/// writer 1 uses offset 1, ...).
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct SeqSettings {
    /// First id handed out.
    #[builder(default = 1)]
    pub offset: u64,
    /// Distance between consecutive ids.
    #[builder(default = 1)]
    pub stride: u64,
}

/// Sequential mapping id generator.
///
/// Guarantees uniqueness within a single instance without touching storage.
#[derive(Debug)]
pub struct SeqGenerator {
    next: AtomicU64,
    stride: u64,
}

impl Clone for SeqGenerator {
    fn clone(&self) -> Self {
        Self {
            next: AtomicU64::new(self.next.load(Ordering::SeqCst)),
            stride: self.stride,
        }
    }
}

impl SeqGenerator {
    /// Creates a generator counting 1, 2, 3, ...
    pub fn new() -> Self {
        Self::with_settings(SeqSettings::builder().build())
    }

    pub fn with_settings(settings: SeqSettings) -> Self {
        Self {
            next: AtomicU64::new(settings.offset),
            stride: settings.stride.max(1),
        }
    }

    /// Creates a generator that continues after the highest id already in use.
    pub fn resume_after(last: Option<MappingId>) -> Self {
        let offset = last.map_or(1, |id| id.get() + 1);
        Self::with_settings(SeqSettings::builder().offset(offset).build())
    }
}

impl Default for SeqGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for SeqGenerator {
    type Output = MappingId;

    fn generate(&self) -> Self::Output {
        MappingId::new(self.next.fetch_add(self.stride, Ordering::SeqCst))
    }
}
