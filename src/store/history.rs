// src/store/history.rs
// Append-only change history. Field updates and their audit entries commit
// in one transaction; entries are never mutated or deleted.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::{ProviderStore, StoreError, normalize_phone, query};
use super::types::{
    ChangeDetails, HistoryEntry, PreviousName, PreviousOwner, ProviderField,
};

impl ProviderStore {
    /// Update one field and record the change, atomically. The history
    /// entry carries the value being replaced.
    pub async fn record_change(
        &self,
        provider_id: Uuid,
        field: ProviderField,
        new_value: &str,
        details: &ChangeDetails,
    ) -> Result<HistoryEntry, StoreError> {
        let mut tx = self.pool().begin().await?;

        // Column names come from the closed ProviderField set.
        let select = format!("SELECT {} AS value FROM providers WHERE id = ?", field.column());
        let row = sqlx::query(&select)
            .bind(provider_id.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound(provider_id))?;
        let old_value: Option<String> = row.try_get("value")?;

        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            provider_id,
            change_kind: details.change_kind,
            field_name: field.column().to_string(),
            old_value: old_value.clone(),
            new_value: Some(new_value.to_string()),
            effective_date: details.effective_date.unwrap_or_else(Utc::now),
            source: details.source.clone(),
            notes: details.notes.clone(),
            recorded_at: Utc::now(),
            recorded_by: details.recorded_by.clone(),
        };
        insert_entry(&mut tx, &entry).await?;

        let update = format!(
            "UPDATE providers SET {} = ?, last_updated = ? WHERE id = ?",
            field.column()
        );
        sqlx::query(&update)
            .bind(new_value)
            .bind(Utc::now())
            .bind(provider_id.to_string())
            .execute(&mut *tx)
            .await?;

        // Keep the comparison column in sync with the displayed number.
        if field == ProviderField::Phone {
            sqlx::query("UPDATE providers SET phone_normalized = ? WHERE id = ?")
                .bind(normalize_phone(new_value))
                .bind(provider_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(entry)
    }

    /// Record a historical event that does not alter the current record,
    /// such as an ownership change recovered from research into the
    /// provider's past. Current-state updates go through `record_change`.
    pub async fn append_history(
        &self,
        provider_id: Uuid,
        field_name: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
        details: &ChangeDetails,
    ) -> Result<HistoryEntry, StoreError> {
        if self.get(provider_id).await?.is_none() {
            return Err(StoreError::NotFound(provider_id));
        }

        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            provider_id,
            change_kind: details.change_kind,
            field_name: field_name.to_string(),
            old_value: old_value.map(str::to_string),
            new_value: new_value.map(str::to_string),
            effective_date: details.effective_date.unwrap_or_else(Utc::now),
            source: details.source.clone(),
            notes: details.notes.clone(),
            recorded_at: Utc::now(),
            recorded_by: details.recorded_by.clone(),
        };

        let mut tx = self.pool().begin().await?;
        insert_entry(&mut tx, &entry).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Complete history, newest effective date first.
    pub async fn get_history(&self, provider_id: Uuid) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows = sqlx::query(query::SELECT_HISTORY)
            .bind(provider_id.to_string())
            .fetch_all(self.pool())
            .await?;

        rows.iter().map(HistoryEntry::from_row).collect()
    }

    /// Names this provider previously went by, from name-change entries.
    pub async fn previous_names(&self, provider_id: Uuid) -> Result<Vec<PreviousName>, StoreError> {
        let rows = sqlx::query(query::SELECT_NAME_HISTORY)
            .bind(provider_id.to_string())
            .fetch_all(self.pool())
            .await?;

        let mut names = Vec::new();
        for row in &rows {
            let entry = HistoryEntry::from_row(row)?;
            if let Some(name) = entry.old_value {
                names.push(PreviousName {
                    name,
                    change_kind: entry.change_kind,
                    effective_date: entry.effective_date,
                    source: entry.source,
                });
            }
        }
        Ok(names)
    }

    /// Previous owners and parent organizations, from ownership entries.
    pub async fn previous_owners(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<PreviousOwner>, StoreError> {
        let rows = sqlx::query(query::SELECT_OWNER_HISTORY)
            .bind(provider_id.to_string())
            .fetch_all(self.pool())
            .await?;

        let mut owners = Vec::new();
        for row in &rows {
            let entry = HistoryEntry::from_row(row)?;
            if let Some(owner) = entry.old_value {
                owners.push(PreviousOwner {
                    owner,
                    effective_date: entry.effective_date,
                    source: entry.source,
                    notes: entry.notes,
                });
            }
        }
        Ok(owners)
    }
}

async fn insert_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    entry: &HistoryEntry,
) -> Result<(), StoreError> {
    sqlx::query(query::INSERT_HISTORY)
        .bind(entry.id.to_string())
        .bind(entry.provider_id.to_string())
        .bind(entry.change_kind.as_str())
        .bind(&entry.field_name)
        .bind(&entry.old_value)
        .bind(&entry.new_value)
        .bind(entry.effective_date)
        .bind(&entry.source)
        .bind(&entry.notes)
        .bind(entry.recorded_at)
        .bind(&entry.recorded_by)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
