//! Slot capacity ledger.
//!
//! Admission, payment confirmation, ticket issuance and verification all go
//! through [`SlotLedger`]. The capacity rules live in [`admission`]; the
//! store runs them inside one atomic unit per operation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::Actor;
use crate::cache::SlotCache;
use crate::models::booking::{BookingAdmission, BookingRequest, BookingWithSlot};
use crate::models::{
    Booking, BookingStatus, NewBooking, NewTicket, PaymentProof, Slot, Ticket, VerificationResult,
};
use crate::payments::{to_minor_units, OrderRequest, PaymentGateway, SignatureVerifier};
use crate::store::{BookingStore, TicketInsert, TicketUse};
use crate::tickets::{generate_ticket_number, qr_payload};
use crate::utils::{AppError, AppResult};

pub mod admission;

const TICKET_NUMBER_ATTEMPTS: usize = 5;

pub struct SlotLedger {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: SignatureVerifier,
    cache: SlotCache,
    pending_hold: chrono::Duration,
    currency: String,
}

impl SlotLedger {
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: SignatureVerifier,
        cache: SlotCache,
        pending_hold: std::time::Duration,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            verifier,
            cache,
            pending_hold: admission::hold_duration(pending_hold),
            currency: currency.into(),
        }
    }

    fn hold_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        admission::hold_cutoff(now, self.pending_hold)
    }

    /// Admits a booking and reserves its units.
    ///
    /// A request carrying a verified payment proof confirms the booking the
    /// proof's order was opened for, provided that booking matches the
    /// request. Otherwise the booking is admitted as pending and a gateway
    /// order is opened for its amount; if the gateway fails the hold is
    /// released again.
    #[instrument(skip(self, request), fields(slot_id = %request.slot_id, both_turfs = request.both_turfs), err)]
    pub async fn request_booking(
        &self,
        user_id: &str,
        request: BookingRequest,
    ) -> AppResult<BookingAdmission> {
        if let Some(proof) = &request.payment {
            let booking = self.confirm_paid_request(user_id, &request, proof).await?;
            return Ok(BookingAdmission {
                booking,
                order: None,
                key_id: None,
            });
        }

        let now = Utc::now();
        let booking = self
            .store
            .admit_booking(
                NewBooking {
                    slot_id: request.slot_id,
                    user_id: user_id.to_string(),
                    date: request.date,
                    both_turfs: request.both_turfs,
                    created_at: now,
                },
                self.hold_cutoff(now),
            )
            .await?;
        self.cache.invalidate_day(booking.date).await;

        info!(booking_id = %booking.id, units = booking.units(), "Booking admitted");

        let order = match self.open_order(&booking).await {
            Ok(order) => order,
            Err(e) => {
                warn!(booking_id = %booking.id, "Order creation failed, releasing hold");
                if let Err(cancel_err) = self
                    .store
                    .cancel_booking(booking.id, &Actor::Customer(booking.user_id.clone()), Utc::now())
                    .await
                {
                    warn!(booking_id = %booking.id, error = %cancel_err, "Could not release hold");
                }
                self.cache.invalidate_day(booking.date).await;
                return Err(e);
            }
        };

        let booking = self.store.attach_order(booking.id, &order.id).await?;
        Ok(BookingAdmission {
            booking,
            order: Some(order),
            key_id: self.gateway.public_key(),
        })
    }

    /// A proof only settles the order this service opened for the same user,
    /// slot, date and turf choice.
    async fn confirm_paid_request(
        &self,
        user_id: &str,
        request: &BookingRequest,
        proof: &PaymentProof,
    ) -> AppResult<Booking> {
        self.verify_proof(proof)?;

        let booking = self
            .store
            .find_booking_by_order(&proof.order_id)
            .await?
            .filter(|b| {
                b.user_id == user_id
                    && b.slot_id == request.slot_id
                    && b.date == request.date
                    && b.both_turfs == request.both_turfs
            })
            .ok_or_else(|| {
                warn!(order_id = %proof.order_id, "Payment proof does not match the request");
                AppError::InvalidSignature
            })?;

        self.confirm_payment(user_id, booking.id, proof).await
    }

    async fn open_order(&self, booking: &Booking) -> AppResult<crate::payments::GatewayOrder> {
        let mut notes = BTreeMap::new();
        notes.insert("slotId".to_string(), booking.slot_id.to_string());
        notes.insert("date".to_string(), booking.date.to_string());
        notes.insert("bothTurfs".to_string(), booking.both_turfs.to_string());

        self.gateway
            .create_order(OrderRequest {
                amount: to_minor_units(booking.amount)?,
                currency: self.currency.clone(),
                receipt: booking.id.to_string(),
                notes,
            })
            .await
    }

    fn verify_proof(&self, proof: &PaymentProof) -> AppResult<()> {
        if self
            .verifier
            .verify(&proof.order_id, &proof.payment_id, &proof.signature)
        {
            Ok(())
        } else {
            warn!(order_id = %proof.order_id, "Payment signature rejected");
            Err(AppError::InvalidSignature)
        }
    }

    /// Flips a pending booking to confirmed. Repeating the call with the same
    /// proof returns the confirmed booking unchanged.
    #[instrument(skip(self, proof), fields(booking_id = %booking_id), err)]
    pub async fn confirm_payment(
        &self,
        user_id: &str,
        booking_id: Uuid,
        proof: &PaymentProof,
    ) -> AppResult<Booking> {
        self.verify_proof(proof)?;

        let now = Utc::now();
        let booking = self
            .store
            .confirm_booking(booking_id, user_id, proof, now, self.hold_cutoff(now))
            .await?;
        self.cache.invalidate_day(booking.date).await;

        info!(booking_id = %booking.id, payment_id = %proof.payment_id, "Booking confirmed");
        Ok(booking)
    }

    #[instrument(skip(self), err)]
    pub async fn cancel_booking(&self, booking_id: Uuid, actor: Actor) -> AppResult<Booking> {
        let booking = self
            .store
            .cancel_booking(booking_id, &actor, Utc::now())
            .await?;
        self.cache.invalidate_day(booking.date).await;

        info!(booking_id = %booking.id, "Booking cancelled");
        Ok(booking)
    }

    /// Returns the booking's ticket, creating it on first request.
    #[instrument(skip(self), err)]
    pub async fn issue_ticket(&self, user_id: &str, booking_id: Uuid) -> AppResult<Ticket> {
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .filter(|b| b.user_id == user_id)
            .ok_or_else(|| AppError::BookingNotFound(booking_id.to_string()))?;
        if booking.status != BookingStatus::Confirmed {
            return Err(AppError::BookingNotConfirmed(booking_id.to_string()));
        }

        if let Some(ticket) = self.store.get_ticket_for_booking(booking_id).await? {
            return Ok(ticket);
        }

        let slot = self
            .store
            .get_slot(booking.slot_id)
            .await?
            .ok_or_else(|| AppError::SlotNotFound(booking.slot_id.to_string()))?;

        for _ in 0..TICKET_NUMBER_ATTEMPTS {
            let now = Utc::now();
            let ticket_number = generate_ticket_number(now, &mut rand::thread_rng());
            let new_ticket = NewTicket {
                booking_id,
                user_id: booking.user_id.clone(),
                qr_payload: qr_payload(&ticket_number, &booking, &slot)?,
                ticket_number,
                created_at: now,
            };

            match self.store.insert_ticket(new_ticket).await? {
                TicketInsert::Inserted(ticket) => {
                    info!(ticket_number = %ticket.ticket_number, "Ticket issued");
                    return Ok(ticket);
                }
                TicketInsert::Existing(ticket) => return Ok(ticket),
                TicketInsert::NumberTaken => {
                    warn!(booking_id = %booking_id, "Ticket number collision, retrying");
                }
            }
        }

        Err(AppError::InternalServerError(
            "Could not allocate a ticket number".to_string(),
        ))
    }

    /// Marks a ticket used at the gate. Only one concurrent scan wins; the
    /// others report the winner's `used_at`.
    #[instrument(skip(self), err)]
    pub async fn verify_ticket(&self, ticket_number: &str) -> AppResult<VerificationResult> {
        match self.store.mark_ticket_used(ticket_number, Utc::now()).await? {
            TicketUse::Marked(ticket) => {
                info!(ticket_number, "Ticket verified");
                Ok(VerificationResult {
                    is_valid: true,
                    already_used: false,
                    used_at: ticket.used_at,
                    message: "Ticket verified successfully".to_string(),
                    ticket,
                })
            }
            TicketUse::AlreadyUsed(ticket) => {
                let when = ticket
                    .used_at
                    .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "an earlier scan".to_string());
                Ok(VerificationResult {
                    is_valid: false,
                    already_used: true,
                    used_at: ticket.used_at,
                    message: format!("Ticket was already used on {when}"),
                    ticket,
                })
            }
            TicketUse::BookingNotConfirmed(ticket) => Err(AppError::BookingNotConfirmed(
                ticket.booking_id.to_string(),
            )),
            TicketUse::NotFound => Err(AppError::TicketNotFound(ticket_number.to_string())),
        }
    }

    pub async fn user_bookings(&self, user_id: &str) -> AppResult<Vec<BookingWithSlot>> {
        let bookings = self.store.list_user_bookings(user_id).await?;
        self.with_slots(bookings).await
    }

    pub async fn bookings_for_date(&self, date: NaiveDate) -> AppResult<Vec<BookingWithSlot>> {
        let bookings = self.store.list_bookings_for_date(date).await?;
        self.with_slots(bookings).await
    }

    pub async fn user_tickets(&self, user_id: &str) -> AppResult<Vec<Ticket>> {
        self.store.list_user_tickets(user_id).await
    }

    async fn with_slots(&self, bookings: Vec<Booking>) -> AppResult<Vec<BookingWithSlot>> {
        let mut ids: Vec<Uuid> = bookings.iter().map(|b| b.slot_id).collect();
        ids.sort_unstable();
        ids.dedup();

        let slots: BTreeMap<Uuid, Slot> = self
            .store
            .get_slots(&ids)
            .await?
            .into_iter()
            .map(|slot| (slot.id, slot))
            .collect();

        Ok(bookings
            .into_iter()
            .map(|booking| BookingWithSlot {
                slot: slots.get(&booking.slot_id).cloned(),
                booking,
            })
            .collect())
    }
}
