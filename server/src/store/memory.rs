//! In-process store. A single mutex guards all state, which makes every
//! trait method atomic. Used by tests and local runs without Postgres.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::Actor;
use crate::ledger::admission::{self, Cancellation, Confirmation};
use crate::models::{
    Booking, BookingStatus, NewBooking, NewSlot, NewTicket, PaymentProof, Slot, SlotAvailability,
    SlotChanges, Ticket,
};
use crate::store::{BookingStore, TicketInsert, TicketUse};
use crate::utils::{AppError, AppResult};

#[derive(Default)]
struct State {
    slots: HashMap<Uuid, Slot>,
    bookings: HashMap<Uuid, Booking>,
    tickets: HashMap<Uuid, Ticket>,
}

impl State {
    fn slot(&self, id: Uuid) -> AppResult<&Slot> {
        self.slots
            .get(&id)
            .ok_or_else(|| AppError::SlotNotFound(id.to_string()))
    }

    fn day_bookings(&self, slot: &Slot) -> Vec<Booking> {
        self.bookings
            .values()
            .filter(|b| b.slot_id == slot.id && b.date == slot.date)
            .filter(|b| b.status != BookingStatus::Cancelled)
            .cloned()
            .collect()
    }

    fn time_taken(&self, date: NaiveDate, time: chrono::NaiveTime, except: Option<Uuid>) -> bool {
        self.slots
            .values()
            .any(|s| s.date == date && s.time == time && Some(s.id) != except)
    }

    fn ticket_by_number(&self, number: &str) -> Option<&Ticket> {
        self.tickets.values().find(|t| t.ticket_number == number)
    }

    fn remove_slot(&mut self, id: Uuid) -> Option<Slot> {
        let slot = self.slots.remove(&id)?;
        let dropped: Vec<Uuid> = self
            .bookings
            .values()
            .filter(|b| b.slot_id == id)
            .map(|b| b.id)
            .collect();
        for booking_id in &dropped {
            self.bookings.remove(booking_id);
        }
        self.tickets.retain(|_, t| !dropped.contains(&t.booking_id));
        Some(slot)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn get_slot(&self, id: Uuid) -> AppResult<Option<Slot>> {
        Ok(self.state.lock().await.slots.get(&id).cloned())
    }

    async fn get_slots(&self, ids: &[Uuid]) -> AppResult<Vec<Slot>> {
        let state = self.state.lock().await;
        Ok(ids.iter().filter_map(|id| state.slots.get(id).cloned()).collect())
    }

    async fn list_slots(
        &self,
        date: Option<NaiveDate>,
        hold_cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<SlotAvailability>> {
        let state = self.state.lock().await;
        let mut listing: Vec<SlotAvailability> = state
            .slots
            .values()
            .filter(|s| date.map_or(true, |d| s.date == d))
            .map(|slot| SlotAvailability {
                remaining: admission::remaining_units(
                    slot,
                    state.bookings.values(),
                    hold_cutoff,
                ),
                slot: slot.clone(),
            })
            .collect();
        listing.sort_by_key(|a| (a.slot.date, a.slot.time));
        Ok(listing)
    }

    async fn upsert_slot(&self, new: NewSlot, hold_cutoff: DateTime<Utc>) -> AppResult<Slot> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let existing = state
            .slots
            .values()
            .find(|s| s.date == new.date && s.time == new.time)
            .cloned();

        let slot = match existing {
            Some(current) => {
                admission::ensure_capacity_covers(
                    &current,
                    new.total_capacity,
                    &state.day_bookings(&current),
                    hold_cutoff,
                )?;
                Slot {
                    price: new.price,
                    total_capacity: new.total_capacity,
                    is_night: new.is_night,
                    is_enabled: new.is_enabled,
                    updated_at: now,
                    ..current
                }
            }
            None => Slot {
                id: Uuid::new_v4(),
                date: new.date,
                time: new.time,
                price: new.price,
                total_capacity: new.total_capacity,
                is_night: new.is_night,
                is_enabled: new.is_enabled,
                created_at: now,
                updated_at: now,
            },
        };
        state.slots.insert(slot.id, slot.clone());
        Ok(slot)
    }

    async fn update_slot(
        &self,
        id: Uuid,
        changes: SlotChanges,
        hold_cutoff: DateTime<Utc>,
    ) -> AppResult<Slot> {
        let mut state = self.state.lock().await;
        let current = state.slot(id)?.clone();

        if state.time_taken(current.date, changes.time, Some(id)) {
            return Err(AppError::Conflict(
                "Another slot already exists at this time".to_string(),
            ));
        }
        admission::ensure_capacity_covers(
            &current,
            changes.total_capacity,
            &state.day_bookings(&current),
            hold_cutoff,
        )?;

        let slot = Slot {
            time: changes.time,
            price: changes.price,
            total_capacity: changes.total_capacity,
            updated_at: Utc::now(),
            ..current
        };
        state.slots.insert(id, slot.clone());
        Ok(slot)
    }

    async fn set_slot_enabled(&self, id: Uuid, enabled: bool) -> AppResult<Slot> {
        let mut state = self.state.lock().await;
        let slot = state
            .slots
            .get_mut(&id)
            .ok_or_else(|| AppError::SlotNotFound(id.to_string()))?;
        slot.is_enabled = enabled;
        slot.updated_at = Utc::now();
        Ok(slot.clone())
    }

    async fn delete_slot(&self, id: Uuid, hold_cutoff: DateTime<Utc>) -> AppResult<Slot> {
        let mut state = self.state.lock().await;
        let slot = state.slot(id)?.clone();
        admission::ensure_deletable(&slot, &state.day_bookings(&slot), hold_cutoff)?;
        state
            .remove_slot(id)
            .ok_or_else(|| AppError::SlotNotFound(id.to_string()))
    }

    async fn delete_all_slots(&self, hold_cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let deletable: Vec<Uuid> = state
            .slots
            .values()
            .filter(|slot| {
                admission::ensure_deletable(slot, &state.day_bookings(slot), hold_cutoff).is_ok()
            })
            .map(|slot| slot.id)
            .collect();
        for id in &deletable {
            state.remove_slot(*id);
        }
        Ok(deletable.len() as u64)
    }

    async fn insert_slots_if_absent(&self, slots: &[NewSlot]) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut created = 0;
        for new in slots {
            if state.time_taken(new.date, new.time, None) {
                continue;
            }
            let slot = Slot {
                id: Uuid::new_v4(),
                date: new.date,
                time: new.time,
                price: new.price,
                total_capacity: new.total_capacity,
                is_night: new.is_night,
                is_enabled: new.is_enabled,
                created_at: now,
                updated_at: now,
            };
            state.slots.insert(slot.id, slot);
            created += 1;
        }
        Ok(created)
    }

    async fn admit_booking(
        &self,
        request: NewBooking,
        hold_cutoff: DateTime<Utc>,
    ) -> AppResult<Booking> {
        let mut state = self.state.lock().await;
        let slot = state.slot(request.slot_id)?.clone();
        let admitted = admission::admit(&slot, &state.day_bookings(&slot), request, hold_cutoff)?;

        for id in &admitted.superseded {
            if let Some(lapsed) = state.bookings.get_mut(id) {
                lapsed.status = BookingStatus::Cancelled;
                lapsed.cancelled_at = Some(admitted.booking.created_at);
            }
        }
        let booking = admitted.booking;
        state.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn attach_order(&self, booking_id: Uuid, order_id: &str) -> AppResult<Booking> {
        let mut state = self.state.lock().await;
        let booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::BookingNotFound(booking_id.to_string()))?;
        booking.order_id = Some(order_id.to_string());
        Ok(booking.clone())
    }

    async fn confirm_booking(
        &self,
        booking_id: Uuid,
        user_id: &str,
        proof: &PaymentProof,
        now: DateTime<Utc>,
        hold_cutoff: DateTime<Utc>,
    ) -> AppResult<Booking> {
        let mut state = self.state.lock().await;
        let booking = state
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| AppError::BookingNotFound(booking_id.to_string()))?;
        let slot = state.slot(booking.slot_id)?.clone();

        match admission::confirm(
            &slot,
            &state.day_bookings(&slot),
            &booking,
            user_id,
            proof,
            now,
            hold_cutoff,
        )? {
            Confirmation::AlreadyConfirmed => Ok(booking),
            Confirmation::Confirm(confirmed) => {
                let reused = state.bookings.values().any(|b| {
                    b.id != booking_id && b.payment_id.as_deref() == Some(proof.payment_id.as_str())
                });
                if reused {
                    return Err(admission::payment_reused());
                }
                state.bookings.insert(booking_id, confirmed.clone());
                Ok(confirmed)
            }
        }
    }

    async fn cancel_booking(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> AppResult<Booking> {
        let mut state = self.state.lock().await;
        let booking = state
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| AppError::BookingNotFound(booking_id.to_string()))?;
        let ticket = state.tickets.values().find(|t| t.booking_id == booking_id);

        match admission::cancel(&booking, actor, ticket)? {
            Cancellation::AlreadyCancelled => Ok(booking),
            Cancellation::Cancel => {
                let cancelled = Booking {
                    status: BookingStatus::Cancelled,
                    cancelled_at: Some(now),
                    ..booking
                };
                state.bookings.insert(booking_id, cancelled.clone());
                Ok(cancelled)
            }
        }
    }

    async fn get_booking(&self, id: Uuid) -> AppResult<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn find_booking_by_order(&self, order_id: &str) -> AppResult<Option<Booking>> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .values()
            .find(|b| b.order_id.as_deref() == Some(order_id))
            .cloned())
    }

    async fn list_user_bookings(&self, user_id: &str) -> AppResult<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| (b.date, b.created_at).cmp(&(a.date, a.created_at)));
        Ok(bookings)
    }

    async fn list_bookings_for_date(&self, date: NaiveDate) -> AppResult<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.date == date)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.created_at);
        Ok(bookings)
    }

    async fn insert_ticket(&self, new: NewTicket) -> AppResult<TicketInsert> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.tickets.values().find(|t| t.booking_id == new.booking_id) {
            return Ok(TicketInsert::Existing(existing.clone()));
        }
        if state.ticket_by_number(&new.ticket_number).is_some() {
            return Ok(TicketInsert::NumberTaken);
        }
        let ticket = Ticket {
            id: Uuid::new_v4(),
            booking_id: new.booking_id,
            user_id: new.user_id,
            ticket_number: new.ticket_number,
            qr_payload: new.qr_payload,
            is_used: false,
            used_at: None,
            created_at: new.created_at,
        };
        state.tickets.insert(ticket.id, ticket.clone());
        Ok(TicketInsert::Inserted(ticket))
    }

    async fn get_ticket_for_booking(&self, booking_id: Uuid) -> AppResult<Option<Ticket>> {
        let state = self.state.lock().await;
        Ok(state
            .tickets
            .values()
            .find(|t| t.booking_id == booking_id)
            .cloned())
    }

    async fn mark_ticket_used(
        &self,
        ticket_number: &str,
        now: DateTime<Utc>,
    ) -> AppResult<TicketUse> {
        let mut state = self.state.lock().await;
        let Some(ticket) = state.ticket_by_number(ticket_number).cloned() else {
            return Ok(TicketUse::NotFound);
        };

        let confirmed = state
            .bookings
            .get(&ticket.booking_id)
            .is_some_and(|b| b.status == BookingStatus::Confirmed);
        if !confirmed {
            return Ok(TicketUse::BookingNotConfirmed(ticket));
        }
        if ticket.is_used {
            return Ok(TicketUse::AlreadyUsed(ticket));
        }

        let used = Ticket {
            is_used: true,
            used_at: Some(now),
            ..ticket
        };
        state.tickets.insert(used.id, used.clone());
        Ok(TicketUse::Marked(used))
    }

    async fn list_user_tickets(&self, user_id: &str) -> AppResult<Vec<Ticket>> {
        let state = self.state.lock().await;
        let mut tickets: Vec<Ticket> = state
            .tickets
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tickets)
    }
}
