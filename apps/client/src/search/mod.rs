//! Scheduling engine: due review units served from materialized views.

pub mod lookup;
pub mod views;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use vocab_core::{ReviewUnit, SearchOptions, WordEntity, DUE_VIEW};

use crate::error::Result;
use crate::store::EntityStore;
use crate::views::{KeyRange, QueryOptions, Reduce, ViewKey, ViewMaterializer};
pub use lookup::{WordLookup, WORDS_INDEX};
pub use views::DueUnitsView;

#[derive(Clone)]
pub struct SchedulingEngine {
    store: EntityStore,
    views: ViewMaterializer,
}

impl SchedulingEngine {
    pub fn new(store: EntityStore, views: ViewMaterializer) -> Self {
        Self { store, views }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Units due at `as_of`, ordered by reoccur time then order key.
    pub fn search<U: ReviewUnit>(
        &self,
        options: &SearchOptions,
        as_of: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<U>> {
        self.search_excluding(options, as_of, limit, &HashSet::new())
    }

    /// Like [`search`](Self::search), skipping units whose key is in `exclude`.
    pub fn search_excluding<U: ReviewUnit>(
        &self,
        options: &SearchOptions,
        as_of: DateTime<Utc>,
        limit: Option<usize>,
        exclude: &HashSet<String>,
    ) -> Result<Vec<U>> {
        let design_id = self.prepare::<U>(options)?;
        let filtered = options.search_level_enabled || !exclude.is_empty();
        let rows = self.views.query(
            &design_id,
            DUE_VIEW,
            &due_range(options, as_of),
            &QueryOptions {
                limit: if filtered { None } else { limit },
                include_docs: true,
                ..Default::default()
            },
        )?;

        let mut units = Vec::new();
        for row in rows {
            if limit.is_some_and(|limit| units.len() >= limit) {
                break;
            }
            let Some(doc) = row.doc else {
                continue;
            };
            let mut unit: U = serde_json::from_value(row.value)?;
            if !options.level_matches(unit.answer_level()) || exclude.contains(&unit.key()) {
                continue;
            }
            unit.attach(doc.to_entity::<WordEntity>()?);
            units.push(unit);
        }
        debug!(
            unit = U::UNIT,
            mode = options.mode.as_str(),
            found = units.len(),
            "searched due units"
        );
        Ok(units)
    }

    /// Number of units due at `as_of`.
    pub fn count_due<U: ReviewUnit>(
        &self,
        options: &SearchOptions,
        as_of: DateTime<Utc>,
    ) -> Result<u64> {
        if options.search_level_enabled {
            // The reducer cannot see levels.
            return Ok(self.search::<U>(options, as_of, None)?.len() as u64);
        }
        let design_id = self.prepare::<U>(options)?;
        let count = self
            .views
            .reduce(&design_id, DUE_VIEW, &due_range(options, as_of))?;
        Ok(count.as_u64().unwrap_or(0))
    }

    fn prepare<U: ReviewUnit>(&self, options: &SearchOptions) -> Result<String> {
        options.validate()?;
        let design_id = options.design_id(U::UNIT);
        self.views.ensure_view(
            &design_id,
            DUE_VIEW,
            Arc::new(DueUnitsView::<U>::new(options.clone())),
            Some(Reduce::Count),
        )?;
        Ok(design_id)
    }
}

fn due_range(options: &SearchOptions, as_of: DateTime<Utc>) -> KeyRange {
    let (after, before) = options.reoccur_window(as_of);
    KeyRange::between(
        after.map(|after| ViewKey::lower(after.timestamp_millis())),
        Some(ViewKey::upper(before.timestamp_millis())),
    )
}
