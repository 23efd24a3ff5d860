//! Target format → strategy lookup.
//!
//! The registry is a fixed table with one slot per [`ImageKind`], filled once
//! at startup and read-only afterwards, so concurrent lookups need no locking.
//! A kind whose slot is empty resolves to [`UnsupportedFormat`].

use crate::format::{ImageKind, UnsupportedFormat};
use crate::imaging::{ImageBackend, RustBackend};
use crate::strategy::{EncoderStrategy, FormatStrategy};
use std::sync::Arc;

pub struct StrategyRegistry {
    slots: [Option<Box<dyn FormatStrategy>>; ImageKind::COUNT],
}

impl StrategyRegistry {
    /// A registry with no strategies; every lookup fails.
    pub fn empty() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Register `strategy` under its target format, replacing any previous one.
    pub fn register(mut self, strategy: Box<dyn FormatStrategy>) -> Self {
        let slot = strategy.target().index();
        self.slots[slot] = Some(strategy);
        self
    }

    /// One [`EncoderStrategy`] per enabled format, all sharing `backend`.
    ///
    /// Formats without an encoder are skipped with a warning.
    pub fn with_backend(backend: Arc<dyn ImageBackend>, enabled: &[ImageKind]) -> Self {
        enabled.iter().fold(Self::empty(), |registry, &kind| {
            if !kind.has_encoder() {
                log::warn!("no encoder available for {kind}, not registering it");
                return registry;
            }
            registry.register(Box::new(EncoderStrategy::new(kind, backend.clone())))
        })
    }

    /// Every encodable format backed by [`RustBackend`].
    pub fn standard() -> Self {
        Self::with_backend(Arc::new(RustBackend::new()), &ImageKind::ALL)
    }

    pub fn get(&self, kind: ImageKind) -> Result<&dyn FormatStrategy, UnsupportedFormat> {
        self.slots[kind.index()]
            .as_deref()
            .ok_or_else(|| UnsupportedFormat(kind.to_string()))
    }

    pub fn supports(&self, kind: ImageKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    /// Registered formats in declaration order.
    pub fn formats(&self) -> Vec<ImageKind> {
        ImageKind::ALL
            .into_iter()
            .filter(|&kind| self.supports(kind))
            .collect()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
