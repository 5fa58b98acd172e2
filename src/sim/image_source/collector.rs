use std::collections::BTreeSet;

use crate::sim::rays::{ReflectionBatch, ReflectionProcessor, ReflectionTable};

/// Gathers candidate reflection sequences from the traced rays.
///
/// The first `order` bounces of every ray of a batch are copied into a
/// [`ReflectionTable`]. Once the table is complete, every prefix of every
/// path (lengths `1..=order`) becomes a candidate triangle sequence.
pub struct ImageSourceCollector {
    order: usize,
    table: Option<ReflectionTable>,
    candidates: BTreeSet<Vec<usize>>,
}

impl ImageSourceCollector {
    pub fn new(order: usize) -> Self {
        Self {
            order,
            table: None,
            candidates: BTreeSet::new(),
        }
    }

    fn harvest(&mut self, table: &ReflectionTable) {
        for ray in 0..table.rays() {
            let Ok(path) = table.path(ray) else {
                return;
            };
            let mut prefix = Vec::with_capacity(self.order);
            for reflection in path.iter().map_while(Option::as_ref) {
                prefix.push(reflection.triangle);
                self.candidates.insert(prefix.clone());
            }
        }
    }
}

impl ReflectionProcessor for ImageSourceCollector {
    /// Unique triangle sequences, sorted (shorter prefixes first).
    type Output = Vec<Vec<usize>>;

    fn required_depth(&self) -> usize {
        self.order
    }

    fn process(&mut self, batch: &ReflectionBatch<'_>) {
        if batch.depth >= self.order {
            return;
        }
        if batch.depth == 0 {
            self.table = Some(ReflectionTable::new(batch.reflections.len(), self.order));
        }
        let Some(mut table) = self.table.take() else {
            return;
        };
        if let Err(err) = table.push(batch) {
            log::warn!("Dropping reflection batch: {}", err);
            return;
        }
        if table.is_complete() {
            self.harvest(&table);
        } else {
            self.table = Some(table);
        }
    }

    fn finish(self) -> Self::Output {
        log::debug!(
            "Image-source candidates: {} unique sequences up to order {}",
            self.candidates.len(),
            self.order
        );
        self.candidates.into_iter().collect()
    }
}
