//! Persistence for slots, bookings and tickets.
//!
//! Every method that checks state and then writes runs as one atomic unit
//! inside the store, so concurrent requests cannot interleave between the
//! check and the write.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::auth::Actor;
use crate::models::{Booking, NewBooking, NewSlot, NewTicket, PaymentProof, Slot, SlotAvailability, SlotChanges, Ticket};
use crate::utils::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, PartialEq)]
pub enum TicketInsert {
    Inserted(Ticket),
    /// The booking already had a ticket.
    Existing(Ticket),
    /// The generated ticket number collided with another ticket.
    NumberTaken,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TicketUse {
    Marked(Ticket),
    AlreadyUsed(Ticket),
    BookingNotConfirmed(Ticket),
    NotFound,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn get_slot(&self, id: Uuid) -> AppResult<Option<Slot>>;

    async fn get_slots(&self, ids: &[Uuid]) -> AppResult<Vec<Slot>>;

    /// Slots of one day ordered by time, or every slot ordered by date and
    /// time, each with the units still free on its date.
    async fn list_slots(
        &self,
        date: Option<NaiveDate>,
        hold_cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<SlotAvailability>>;

    /// Creates the slot at `(date, time)` or replaces its attributes.
    async fn upsert_slot(&self, slot: NewSlot, hold_cutoff: DateTime<Utc>) -> AppResult<Slot>;

    async fn update_slot(
        &self,
        id: Uuid,
        changes: SlotChanges,
        hold_cutoff: DateTime<Utc>,
    ) -> AppResult<Slot>;

    async fn set_slot_enabled(&self, id: Uuid, enabled: bool) -> AppResult<Slot>;

    async fn delete_slot(&self, id: Uuid, hold_cutoff: DateTime<Utc>) -> AppResult<Slot>;

    /// Deletes every slot without active bookings and returns how many went.
    async fn delete_all_slots(&self, hold_cutoff: DateTime<Utc>) -> AppResult<u64>;

    /// Inserts the slots whose `(date, time)` is still free; returns the number created.
    async fn insert_slots_if_absent(&self, slots: &[NewSlot]) -> AppResult<u64>;

    /// Capacity check and insert as one atomic step. The same user's lapsed
    /// pending bookings on the slot are cancelled in that step.
    async fn admit_booking(
        &self,
        request: NewBooking,
        hold_cutoff: DateTime<Utc>,
    ) -> AppResult<Booking>;

    async fn attach_order(&self, booking_id: Uuid, order_id: &str) -> AppResult<Booking>;

    /// Capacity re-check and pending → confirmed transition as one atomic step.
    /// A payment id already recorded on another booking is a conflict.
    async fn confirm_booking(
        &self,
        booking_id: Uuid,
        user_id: &str,
        proof: &PaymentProof,
        now: DateTime<Utc>,
        hold_cutoff: DateTime<Utc>,
    ) -> AppResult<Booking>;

    async fn cancel_booking(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> AppResult<Booking>;

    async fn get_booking(&self, id: Uuid) -> AppResult<Option<Booking>>;

    /// The booking a gateway order was opened for.
    async fn find_booking_by_order(&self, order_id: &str) -> AppResult<Option<Booking>>;

    /// Newest date first.
    async fn list_user_bookings(&self, user_id: &str) -> AppResult<Vec<Booking>>;

    async fn list_bookings_for_date(&self, date: NaiveDate) -> AppResult<Vec<Booking>>;

    async fn insert_ticket(&self, ticket: NewTicket) -> AppResult<TicketInsert>;

    async fn get_ticket_for_booking(&self, booking_id: Uuid) -> AppResult<Option<Ticket>>;

    /// Marks the ticket used only if it is unused and its booking is confirmed.
    async fn mark_ticket_used(&self, ticket_number: &str, now: DateTime<Utc>)
        -> AppResult<TicketUse>;

    /// Newest first.
    async fn list_user_tickets(&self, user_id: &str) -> AppResult<Vec<Ticket>>;
}
