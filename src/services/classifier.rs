//! AI-assisted category classification for extracted invoice lines.
//!
//! One batch request covers every distinct line on the invoice. New-category
//! suggestions are created idempotently: a within-batch cache by code, then
//! the category table, then an insert with a re-read fallback on the unique
//! index. A failed or ungradeable call degrades to "no categorization for
//! this batch" — never a partial mapping.

use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::entities::product_category;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::extraction::parser;
use crate::extraction::prompts;
use crate::extraction::types::{ClassificationEntry, ExtractedItem};
use crate::extraction::vision::VisionClient;
use crate::services::categories;

pub struct CategoryClassifier {
    db: Arc<DatabaseConnection>,
    vision: Arc<dyn VisionClient>,
    event_sender: EventSender,
}

impl CategoryClassifier {
    pub fn new(
        db: Arc<DatabaseConnection>,
        vision: Arc<dyn VisionClient>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            vision,
            event_sender,
        }
    }

    /// Classify a batch of lines. Returns a map from original item index to
    /// category id; absent indices carry no categorization.
    #[instrument(skip(self, items), fields(batch = items.len()))]
    pub async fn classify_batch(&self, items: &[ExtractedItem]) -> HashMap<usize, Uuid> {
        // Distinct items only: identical references are asked about once and
        // the answer fans out to every index sharing the reference.
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, (usize, Vec<usize>)> = HashMap::new();
        for (idx, item) in items.iter().enumerate() {
            let key = if !item.reference.is_empty() {
                format!("r:{}", item.reference)
            } else if !item.designation.is_empty() {
                format!("d:{}", item.designation)
            } else {
                continue;
            };
            groups
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    (idx, Vec::new())
                })
                .1
                .push(idx);
        }

        if order.is_empty() {
            return HashMap::new();
        }

        let known = match categories::list_active(self.db.as_ref()).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "category listing failed; batch left uncategorized");
                return HashMap::new();
            }
        };
        let known_ids: HashMap<Uuid, ()> = known.iter().map(|c| (c.id, ())).collect();
        let catalog: Vec<(Uuid, String, String)> = known
            .iter()
            .map(|c| (c.id, c.code.clone(), c.name.clone()))
            .collect();

        let distinct: Vec<&ExtractedItem> = order.iter().map(|k| &items[groups[k].0]).collect();
        let prompt = prompts::classification_prompt(&distinct, &catalog);

        let raw = match self.vision.classify(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "classification call failed; batch left uncategorized");
                return HashMap::new();
            }
        };

        let Some(entries) = parser::parse_first::<Vec<ClassificationEntry>>(&raw) else {
            warn!("classification reply was ungradeable; batch left uncategorized");
            return HashMap::new();
        };

        if entries.len() != order.len() {
            warn!(
                expected = order.len(),
                got = entries.len(),
                "classification reply entry count mismatch; batch left uncategorized"
            );
            return HashMap::new();
        }

        // Reference-tagged entries match by reference, so a reordered reply
        // still lands on the right lines. Designation-only groups carry no
        // reference to echo and fall back to reply position.
        let mut by_reference: HashMap<&str, &ClassificationEntry> = HashMap::new();
        for entry in &entries {
            if let Some(reference) = entry.reference.as_deref().filter(|r| !r.is_empty()) {
                by_reference.insert(reference, entry);
            }
        }

        // Within-batch cache: two lines proposing the same new code must end
        // up in one category row.
        let mut created_by_code: HashMap<String, Uuid> = HashMap::new();
        let mut assignments = HashMap::new();

        for (pos, key) in order.iter().enumerate() {
            let entry = match key.strip_prefix("r:") {
                Some(reference) => match by_reference.get(reference) {
                    Some(&entry) => entry,
                    None => {
                        warn!(reference, "classification reply carries no entry for reference");
                        continue;
                    }
                },
                None => &entries[pos],
            };
            let category_id = match self.resolve_entry(entry, &known_ids, &mut created_by_code).await
            {
                Ok(id) => id,
                Err(e) => {
                    warn!(error = %e, "category resolution failed for one entry");
                    None
                }
            };
            if let Some(id) = category_id {
                for &idx in &groups[key].1 {
                    assignments.insert(idx, id);
                }
            }
        }

        assignments
    }

    async fn resolve_entry(
        &self,
        entry: &ClassificationEntry,
        known_ids: &HashMap<Uuid, ()>,
        created_by_code: &mut HashMap<String, Uuid>,
    ) -> Result<Option<Uuid>, ServiceError> {
        if let Some(id) = entry.category_id {
            if known_ids.contains_key(&id) {
                return Ok(Some(id));
            }
            warn!(%id, "model referenced an unknown category id");
        }

        let Some(code) = entry
            .new_category_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        else {
            return Ok(None);
        };

        if let Some(&id) = created_by_code.get(code) {
            return Ok(Some(id));
        }

        let name = entry
            .new_category_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(code);

        let (row, created) = categories::find_or_create_by_code(self.db.as_ref(), code, name).await?;
        created_by_code.insert(code.to_string(), row.id);

        if created {
            let _ = self
                .event_sender
                .send(Event::CategoryCreated {
                    category_id: row.id,
                    code: row.code.clone(),
                })
                .await;
        }

        Ok(Some(row.id))
    }
}

/// Convenience for handlers exposing the category tree.
pub async fn list_categories(
    db: &DatabaseConnection,
) -> Result<Vec<product_category::Model>, ServiceError> {
    categories::list_active(db).await
}
