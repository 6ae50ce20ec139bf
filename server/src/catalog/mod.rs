//! Slot administration and the cached public listing.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use crate::cache::{Listing, ListingKey, SlotCache};
use crate::ledger::admission;
use crate::models::slot::{GenerateSlotsRequest, GenerateSlotsResponse, GeneratedSlot};
use crate::models::{NewSlot, Slot, SlotChanges};
use crate::store::BookingStore;
use crate::utils::AppResult;

pub mod generate;

pub use generate::SlotRange;

pub struct SlotCatalog {
    store: Arc<dyn BookingStore>,
    cache: SlotCache,
    pending_hold: chrono::Duration,
}

impl SlotCatalog {
    pub fn new(
        store: Arc<dyn BookingStore>,
        cache: SlotCache,
        pending_hold: std::time::Duration,
    ) -> Self {
        Self {
            store,
            cache,
            pending_hold: admission::hold_duration(pending_hold),
        }
    }

    fn hold_cutoff(&self) -> DateTime<Utc> {
        admission::hold_cutoff(Utc::now(), self.pending_hold)
    }

    pub async fn list(&self, date: Option<NaiveDate>) -> AppResult<Listing> {
        let cutoff = self.hold_cutoff();
        let store = self.store.clone();
        self.cache
            .get_or_load(ListingKey::from(date), move || async move {
                store.list_slots(date, cutoff).await
            })
            .await
    }

    pub async fn upsert(&self, slot: NewSlot) -> AppResult<Slot> {
        let slot = self.store.upsert_slot(slot, self.hold_cutoff()).await?;
        self.cache.invalidate_day(slot.date).await;
        info!(slot_id = %slot.id, date = %slot.date, "Slot saved");
        Ok(slot)
    }

    pub async fn update(&self, id: Uuid, changes: SlotChanges) -> AppResult<Slot> {
        let slot = self.store.update_slot(id, changes, self.hold_cutoff()).await?;
        self.cache.invalidate_day(slot.date).await;
        info!(slot_id = %slot.id, "Slot updated");
        Ok(slot)
    }

    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> AppResult<Slot> {
        let slot = self.store.set_slot_enabled(id, enabled).await?;
        self.cache.invalidate_day(slot.date).await;
        info!(slot_id = %slot.id, enabled, "Slot availability changed");
        Ok(slot)
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<Slot> {
        let slot = self.store.delete_slot(id, self.hold_cutoff()).await?;
        self.cache.invalidate_day(slot.date).await;
        info!(slot_id = %slot.id, "Slot deleted");
        Ok(slot)
    }

    /// Deletes every slot without active bookings.
    pub async fn delete_all(&self) -> AppResult<u64> {
        let deleted = self.store.delete_all_slots(self.hold_cutoff()).await?;
        self.cache.invalidate_all();
        info!(deleted, "Slots deleted");
        Ok(deleted)
    }

    /// Creates the slots of a range, leaving existing `(date, time)` slots untouched.
    pub async fn generate(&self, request: GenerateSlotsRequest) -> AppResult<GenerateSlotsResponse> {
        let range = SlotRange::try_from(request)?;
        let slots = generate::generate(&range);
        let created = self.store.insert_slots_if_absent(&slots).await?;
        self.cache.invalidate_all();

        let total_attempted = slots.len() as u64;
        info!(
            created,
            total_attempted,
            start = %range.start_date,
            end = %range.end_date,
            "Slots generated"
        );

        Ok(GenerateSlotsResponse {
            created,
            existing: total_attempted.saturating_sub(created),
            total_attempted,
            generated_slots: slots
                .into_iter()
                .map(|slot| GeneratedSlot {
                    date: slot.date,
                    time: slot.time,
                    is_night: slot.is_night,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::utils::AppError;
    use chrono::NaiveTime;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn catalog() -> SlotCatalog {
        SlotCatalog::new(
            Arc::new(MemoryStore::new()),
            SlotCache::new(Duration::from_secs(60)),
            Duration::from_secs(15 * 60),
        )
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn new_slot(time: &str) -> NewSlot {
        let time = NaiveTime::parse_from_str(time, "%H:%M").unwrap();
        NewSlot {
            date: day(),
            time,
            price: Decimal::new(1000, 0),
            total_capacity: 3,
            is_night: crate::models::slot::is_night_time(time),
            is_enabled: true,
        }
    }

    fn generate_request(start: &str, end: &str) -> GenerateSlotsRequest {
        GenerateSlotsRequest {
            start_date: "2024-06-01".to_string(),
            end_date: "2024-06-02".to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            interval: 60,
            price: Decimal::new(1000, 0),
            capacity: 3,
        }
    }

    #[tokio::test]
    async fn test_listing_sees_writes() {
        let catalog = catalog();
        assert!(catalog.list(Some(day())).await.unwrap().is_empty());

        let slot = catalog.upsert(new_slot("19:00")).await.unwrap();
        let listing = catalog.list(Some(day())).await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].remaining, 3);

        catalog.set_enabled(slot.id, false).await.unwrap();
        let listing = catalog.list(None).await.unwrap();
        assert!(!listing[0].slot.is_enabled);

        catalog.delete(slot.id).await.unwrap();
        assert!(catalog.list(Some(day())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_conflicting_time() {
        let catalog = catalog();
        catalog.upsert(new_slot("07:00")).await.unwrap();
        let other = catalog.upsert(new_slot("08:00")).await.unwrap();

        let err = catalog
            .update(
                other.id,
                SlotChanges {
                    time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
                    price: Decimal::new(900, 0),
                    total_capacity: 3,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = catalog.delete(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::SlotNotFound(_)));
    }

    #[tokio::test]
    async fn test_generate_reports_existing() {
        let catalog = catalog();
        let first = catalog.generate(generate_request("06:00", "08:00")).await.unwrap();
        assert_eq!(first.total_attempted, 6);
        assert_eq!(first.created, 6);
        assert_eq!(first.existing, 0);

        let second = catalog.generate(generate_request("07:00", "09:00")).await.unwrap();
        assert_eq!(second.created, 2);
        assert_eq!(second.existing, 4);
        assert_eq!(catalog.list(None).await.unwrap().len(), 8);

        assert_eq!(catalog.delete_all().await.unwrap(), 8);
        assert!(catalog.list(None).await.unwrap().is_empty());
    }
}
