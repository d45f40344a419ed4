// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use deskpilot_items::Item;

use super::Callback;

/// Keeps only the `n` most recent screenshots in the view sent to the model.
///
/// For each evicted `computer_call_output`, the paired `computer_call` and a
/// single `reasoning` item immediately before it are evicted too, so the
/// token context collapses cleanly instead of leaving orphaned calls.
pub struct ImageRetention {
    only_n_most_recent_images: usize,
}

impl ImageRetention {
    pub fn new(only_n_most_recent_images: usize) -> Self {
        Self { only_n_most_recent_images }
    }

    fn apply(&self, items: Vec<Item>) -> Vec<Item> {
        let output_indices: Vec<usize> = items
            .iter()
            .enumerate()
            .filter_map(|(i, it)| matches!(it, Item::ComputerCallOutput { .. }).then_some(i))
            .collect();
        if output_indices.len() <= self.only_n_most_recent_images {
            return items;
        }

        let cutoff = output_indices.len() - self.only_n_most_recent_images;
        let mut to_remove = std::collections::HashSet::new();
        for &idx in &output_indices[..cutoff] {
            to_remove.insert(idx);

            let call_id = items[idx].call_id().map(str::to_string);
            if idx == 0 {
                continue;
            }
            let prev = idx - 1;
            let paired = matches!(
                &items[prev],
                Item::ComputerCall { call_id: cid, .. } if Some(cid.as_str()) == call_id.as_deref()
            );
            if paired {
                to_remove.insert(prev);
                if prev > 0 && matches!(items[prev - 1], Item::Reasoning { .. }) {
                    to_remove.insert(prev - 1);
                }
            }
        }

        items
            .into_iter()
            .enumerate()
            .filter_map(|(i, it)| (!to_remove.contains(&i)).then_some(it))
            .collect()
    }
}

#[async_trait]
impl Callback for ImageRetention {
    async fn on_llm_start(&self, items: Vec<Item>) -> Vec<Item> {
        self.apply(items)
    }
}
