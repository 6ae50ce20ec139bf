//! Capacity rules shared by every store.
//!
//! Stores load the slot and its bookings for the day inside their atomic
//! unit, run these functions, and persist the outcome.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::auth::Actor;
use crate::models::booking::units_for;
use crate::models::{Booking, BookingStatus, NewBooking, PaymentProof, Slot, Ticket};
use crate::utils::{AppError, AppResult};

/// Converts the configured hold, capping values chrono cannot represent at one day.
pub fn hold_duration(pending_hold: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(pending_hold).unwrap_or_else(|_| {
        tracing::warn!("Pending hold {:?} is out of range, using one day", pending_hold);
        chrono::Duration::days(1)
    })
}

/// Pending bookings created at or before this instant no longer hold capacity.
pub fn hold_cutoff(now: DateTime<Utc>, pending_hold: chrono::Duration) -> DateTime<Utc> {
    now - pending_hold
}

/// Units held on `slot` by active bookings, leaving out `exclude`.
pub fn consumed_units<'a>(
    slot: &Slot,
    bookings: impl IntoIterator<Item = &'a Booking>,
    hold_cutoff: DateTime<Utc>,
    exclude: Option<Uuid>,
) -> i32 {
    bookings
        .into_iter()
        .filter(|b| b.slot_id == slot.id && b.date == slot.date)
        .filter(|b| Some(b.id) != exclude && b.is_active(hold_cutoff))
        .map(Booking::units)
        .sum()
}

pub fn remaining_units<'a>(
    slot: &Slot,
    bookings: impl IntoIterator<Item = &'a Booking>,
    hold_cutoff: DateTime<Utc>,
) -> i32 {
    (slot.total_capacity - consumed_units(slot, bookings, hold_cutoff, None)).max(0)
}

fn check_capacity(slot: &Slot, consumed: i32, both_turfs: bool) -> AppResult<()> {
    if slot.total_capacity - consumed < units_for(both_turfs) {
        return Err(AppError::CapacityExceeded { both_turfs });
    }
    Ok(())
}

/// Outcome of a successful admission.
#[derive(Debug, Clone, PartialEq)]
pub struct Admitted {
    pub booking: Booking,
    /// The same user's lapsed pending bookings on this slot. The store
    /// cancels them together with the insert so they can never be confirmed
    /// next to the new booking.
    pub superseded: Vec<Uuid>,
}

fn duplicate_error(slot: &Slot) -> AppError {
    AppError::DuplicateBooking {
        slot_id: slot.id.to_string(),
        date: slot.date.to_string(),
    }
}

/// Decides whether `request` fits on `slot` and builds the pending booking to insert.
pub fn admit(
    slot: &Slot,
    day_bookings: &[Booking],
    request: NewBooking,
    hold_cutoff: DateTime<Utc>,
) -> AppResult<Admitted> {
    if !slot.is_enabled || slot.date != request.date {
        return Err(AppError::SlotNotFound(request.slot_id.to_string()));
    }

    let consumed = consumed_units(slot, day_bookings, hold_cutoff, None);
    check_capacity(slot, consumed, request.both_turfs)?;

    let own: Vec<&Booking> = day_bookings
        .iter()
        .filter(|b| b.slot_id == slot.id && b.date == slot.date && b.user_id == request.user_id)
        .filter(|b| b.status != BookingStatus::Cancelled)
        .collect();
    if own.iter().any(|b| b.is_active(hold_cutoff)) {
        return Err(duplicate_error(slot));
    }

    let units = units_for(request.both_turfs);
    let booking = Booking {
        id: Uuid::new_v4(),
        slot_id: slot.id,
        user_id: request.user_id,
        date: slot.date,
        status: BookingStatus::Pending,
        amount: slot.price * Decimal::from(units),
        both_turfs: request.both_turfs,
        order_id: None,
        payment_id: None,
        signature: None,
        created_at: request.created_at,
        confirmed_at: None,
        cancelled_at: None,
    };

    Ok(Admitted {
        booking,
        superseded: own.into_iter().map(|b| b.id).collect(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    AlreadyConfirmed,
    Confirm(Booking),
}

/// Validates a pending → confirmed transition. The signature must already
/// have been verified against the gateway secret, and the proof must name
/// the order opened for this booking.
pub fn confirm(
    slot: &Slot,
    day_bookings: &[Booking],
    booking: &Booking,
    user_id: &str,
    proof: &PaymentProof,
    now: DateTime<Utc>,
    hold_cutoff: DateTime<Utc>,
) -> AppResult<Confirmation> {
    if booking.user_id != user_id {
        return Err(AppError::Forbidden(
            "Booking belongs to another user".to_string(),
        ));
    }

    match booking.status {
        BookingStatus::Cancelled => {
            return Err(AppError::BookingCancelled(booking.id.to_string()));
        }
        BookingStatus::Confirmed => {
            return if booking.payment_id.as_deref() == Some(proof.payment_id.as_str()) {
                Ok(Confirmation::AlreadyConfirmed)
            } else {
                Err(AppError::Conflict(
                    "Booking was already confirmed with another payment".to_string(),
                ))
            };
        }
        BookingStatus::Pending => {}
    }

    if booking.order_id.as_deref() != Some(proof.order_id.as_str()) {
        return Err(AppError::InvalidSignature);
    }

    let holds_another = day_bookings.iter().any(|b| {
        b.id != booking.id
            && b.slot_id == booking.slot_id
            && b.user_id == booking.user_id
            && b.is_active(hold_cutoff)
    });
    if holds_another {
        return Err(duplicate_error(slot));
    }

    let consumed = consumed_units(slot, day_bookings, hold_cutoff, Some(booking.id));
    check_capacity(slot, consumed, booking.both_turfs)?;

    Ok(Confirmation::Confirm(Booking {
        status: BookingStatus::Confirmed,
        order_id: Some(proof.order_id.clone()),
        payment_id: Some(proof.payment_id.clone()),
        signature: Some(proof.signature.clone()),
        confirmed_at: Some(now),
        ..booking.clone()
    }))
}

pub fn payment_reused() -> AppError {
    AppError::Conflict("Payment was already used for another booking".to_string())
}

/// Rejects a capacity change that would drop below what active bookings hold.
pub fn ensure_capacity_covers(
    slot: &Slot,
    new_capacity: i32,
    day_bookings: &[Booking],
    hold_cutoff: DateTime<Utc>,
) -> AppResult<()> {
    let consumed = consumed_units(slot, day_bookings, hold_cutoff, None);
    if new_capacity < consumed {
        return Err(AppError::Conflict(format!(
            "{consumed} units are already booked on this slot"
        )));
    }
    Ok(())
}

/// Rejects deleting a slot that still has active bookings.
pub fn ensure_deletable(
    slot: &Slot,
    day_bookings: &[Booking],
    hold_cutoff: DateTime<Utc>,
) -> AppResult<()> {
    if consumed_units(slot, day_bookings, hold_cutoff, None) > 0 {
        return Err(AppError::Conflict(
            "Slot has active bookings".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancellation {
    AlreadyCancelled,
    Cancel,
}

/// Customers may drop their own unpaid bookings; admins may cancel any
/// booking whose ticket has not been used at the gate.
pub fn cancel(booking: &Booking, actor: &Actor, ticket: Option<&Ticket>) -> AppResult<Cancellation> {
    if let Actor::Customer(user_id) = actor {
        if &booking.user_id != user_id {
            return Err(AppError::Forbidden(
                "Booking belongs to another user".to_string(),
            ));
        }
    }

    match (booking.status, actor) {
        (BookingStatus::Cancelled, _) => Ok(Cancellation::AlreadyCancelled),
        (BookingStatus::Confirmed, Actor::Customer(_)) => Err(AppError::Conflict(
            "Paid bookings can only be cancelled by the venue".to_string(),
        )),
        _ if ticket.is_some_and(|t| t.is_used) => Err(AppError::Conflict(
            "Ticket has already been used".to_string(),
        )),
        _ => Ok(Cancellation::Cancel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveTime};

    fn slot(capacity: i32) -> Slot {
        let now = Utc::now();
        Slot {
            id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            price: Decimal::new(800, 0),
            total_capacity: capacity,
            is_night: true,
            is_enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn request(slot: &Slot, user: &str, both_turfs: bool) -> NewBooking {
        NewBooking {
            slot_id: slot.id,
            user_id: user.to_string(),
            date: slot.date,
            both_turfs,
            created_at: Utc::now(),
        }
    }

    fn proof(order: &str) -> PaymentProof {
        PaymentProof {
            order_id: order.to_string(),
            payment_id: "pay_1".to_string(),
            signature: "sig".to_string(),
        }
    }

    fn cutoff() -> DateTime<Utc> {
        hold_cutoff(Utc::now(), Duration::minutes(15))
    }

    fn admitted(slot: &Slot, day: &[Booking], user: &str, both_turfs: bool) -> Booking {
        admit(slot, day, request(slot, user, both_turfs), cutoff()).unwrap().booking
    }

    fn with_order(mut booking: Booking, order: &str) -> Booking {
        booking.order_id = Some(order.to_string());
        booking
    }

    #[test]
    fn test_units_and_amount() {
        let slot = slot(3);
        let single = admitted(&slot, &[], "a", false);
        let double = admitted(&slot, &[], "b", true);
        assert_eq!(single.units(), 1);
        assert_eq!(single.amount, Decimal::new(800, 0));
        assert_eq!(double.units(), 2);
        assert_eq!(double.amount, Decimal::new(1600, 0));
        assert_eq!(single.status, BookingStatus::Pending);
    }

    #[test]
    fn test_capacity_exhaustion() {
        let slot = slot(2);
        let both = admitted(&slot, &[], "a", true);
        let day = vec![both];

        let err = admit(&slot, &day, request(&slot, "b", false), cutoff()).unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded { both_turfs: false }));
        let err = admit(&slot, &day, request(&slot, "b", true), cutoff()).unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded { both_turfs: true }));
    }

    #[test]
    fn test_duplicate_booking() {
        let slot = slot(3);
        let first = admitted(&slot, &[], "a", false);
        let err = admit(&slot, &[first], request(&slot, "a", false), cutoff()).unwrap_err();
        assert!(matches!(err, AppError::DuplicateBooking { .. }));
    }

    #[test]
    fn test_lapsed_and_cancelled_bookings_release_capacity() {
        let slot = slot(1);
        let mut lapsed = admitted(&slot, &[], "a", false);
        lapsed.created_at = Utc::now() - Duration::hours(1);
        let mut cancelled = admitted(&slot, &[], "b", false);
        cancelled.status = BookingStatus::Cancelled;

        assert_eq!(remaining_units(&slot, &[lapsed.clone(), cancelled.clone()], cutoff()), 1);
        // The lapsed hold does not block its owner either.
        assert!(admit(&slot, &[lapsed, cancelled], request(&slot, "a", false), cutoff()).is_ok());
    }

    #[test]
    fn test_disabled_or_wrong_date_slot_is_not_found() {
        let mut disabled = slot(3);
        disabled.is_enabled = false;
        let err = admit(&disabled, &[], request(&disabled, "a", false), cutoff()).unwrap_err();
        assert!(matches!(err, AppError::SlotNotFound(_)));

        let slot = slot(3);
        let mut req = request(&slot, "a", false);
        req.date = slot.date.succ_opt().unwrap();
        assert!(matches!(admit(&slot, &[], req, cutoff()), Err(AppError::SlotNotFound(_))));
    }

    #[test]
    fn test_lapsed_own_booking_is_superseded() {
        let slot = slot(3);
        let mut lapsed = admitted(&slot, &[], "a", false);
        lapsed.created_at = Utc::now() - Duration::hours(1);
        let other = admitted(&slot, &[], "b", false);

        let outcome = admit(&slot, &[lapsed.clone(), other], request(&slot, "a", false), cutoff()).unwrap();
        assert_eq!(outcome.superseded, vec![lapsed.id]);
        assert_eq!(outcome.booking.status, BookingStatus::Pending);
        assert!(outcome.booking.order_id.is_none());
    }

    #[test]
    fn test_confirm_rejects_second_booking_of_same_user() {
        let slot = slot(3);
        let mut lapsed = with_order(admitted(&slot, &[], "a", false), "order_1");
        lapsed.created_at = Utc::now() - Duration::hours(1);
        let fresh = Booking {
            id: Uuid::new_v4(),
            ..with_order(admitted(&slot, &[], "a", false), "order_2")
        };
        let day = vec![lapsed.clone(), fresh];

        let err = confirm(&slot, &day, &lapsed, "a", &proof("order_1"), Utc::now(), cutoff()).unwrap_err();
        assert!(matches!(err, AppError::DuplicateBooking { .. }));
    }

    #[test]
    fn test_confirm_transitions_and_is_idempotent() {
        let slot = slot(3);
        let pending = with_order(admitted(&slot, &[], "a", false), "order_1");
        let day = vec![pending.clone()];

        let confirmed = match confirm(&slot, &day, &pending, "a", &proof("order_1"), Utc::now(), cutoff()).unwrap() {
            Confirmation::Confirm(b) => b,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(confirmed.status, BookingStatus::Confirmed);

        let again = confirm(&slot, &[confirmed.clone()], &confirmed, "a", &proof("order_1"), Utc::now(), cutoff()).unwrap();
        assert_eq!(again, Confirmation::AlreadyConfirmed);
    }

    #[test]
    fn test_confirm_rejects_foreign_order_and_user() {
        let slot = slot(3);
        let pending = with_order(admitted(&slot, &[], "a", false), "order_1");

        let err = confirm(&slot, &[], &pending, "a", &proof("order_2"), Utc::now(), cutoff()).unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature));
        let err = confirm(&slot, &[], &pending, "b", &proof("order_1"), Utc::now(), cutoff()).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_confirm_lapsed_hold_rechecks_capacity() {
        let slot = slot(1);
        let mut lapsed = with_order(admitted(&slot, &[], "a", false), "order_1");
        lapsed.created_at = Utc::now() - Duration::hours(1);
        let newer = admitted(&slot, &[lapsed.clone()], "b", false);

        let err = confirm(&slot, &[lapsed.clone(), newer], &lapsed, "a", &proof("order_1"), Utc::now(), cutoff())
            .unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded { .. }));
    }

    #[test]
    fn test_cancel_rules() {
        let slot = slot(3);
        let pending = admitted(&slot, &[], "a", false);
        let customer = Actor::Customer("a".to_string());

        assert_eq!(cancel(&pending, &customer, None).unwrap(), Cancellation::Cancel);
        assert!(matches!(
            cancel(&pending, &Actor::Customer("b".to_string()), None),
            Err(AppError::Forbidden(_))
        ));

        let confirmed = Booking {
            status: BookingStatus::Confirmed,
            ..pending.clone()
        };
        assert!(matches!(cancel(&confirmed, &customer, None), Err(AppError::Conflict(_))));
        assert_eq!(cancel(&confirmed, &Actor::Admin, None).unwrap(), Cancellation::Cancel);

        let cancelled = Booking {
            status: BookingStatus::Cancelled,
            ..pending
        };
        assert_eq!(cancel(&cancelled, &Actor::Admin, None).unwrap(), Cancellation::AlreadyCancelled);
    }

    #[test]
    fn test_capacity_cannot_shrink_below_bookings() {
        let slot = slot(3);
        let a = admitted(&slot, &[], "a", true);
        assert!(ensure_capacity_covers(&slot, 2, &[a.clone()], cutoff()).is_ok());
        assert!(matches!(
            ensure_capacity_covers(&slot, 1, &[a.clone()], cutoff()),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(ensure_deletable(&slot, &[a], cutoff()), Err(AppError::Conflict(_))));
        assert!(ensure_deletable(&slot, &[], cutoff()).is_ok());
    }
}
