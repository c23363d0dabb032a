//! Map function that projects words into due review units.

use std::marker::PhantomData;

use vocab_core::{Document, EntityKind, ReviewUnit, SearchOptions, WordEntity};

use crate::views::{MapView, ViewEmit, ViewKey};

/// Emits every candidate unit of a word keyed by `(reoccur_at, order key)`.
pub struct DueUnitsView<U> {
    options: SearchOptions,
    _unit: PhantomData<fn() -> U>,
}

impl<U: ReviewUnit> DueUnitsView<U> {
    pub fn new(options: SearchOptions) -> Self {
        Self {
            options,
            _unit: PhantomData,
        }
    }
}

impl<U: ReviewUnit> MapView for DueUnitsView<U> {
    fn signature(&self) -> String {
        format!("{}:v1:{}", U::UNIT, self.options.design_id(U::UNIT))
    }

    fn map(&self, doc: &Document) -> Vec<ViewEmit> {
        if doc.deleted || EntityKind::of_id(&doc.id) != Some(EntityKind::Word) {
            return Vec::new();
        }
        let Ok(word) = doc.to_entity::<WordEntity>() else {
            return Vec::new();
        };

        U::candidates(&word, &self.options)
            .into_iter()
            .filter_map(|unit| {
                let key = ViewKey::new(unit.reoccur_at().timestamp_millis(), unit.order_key());
                let value = serde_json::to_value(&unit).ok()?;
                Some(ViewEmit { key, value })
            })
            .collect()
    }
}
