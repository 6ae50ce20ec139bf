//! Postgres store.
//!
//! Capacity decisions lock the slot row (`SELECT ... FOR UPDATE`) for the
//! length of the transaction, so admissions and confirmations for the same
//! slot run one after another. Ticket use holds a share lock on the booking
//! and marks the ticket with a conditional `UPDATE`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::instrument;
use uuid::Uuid;

use crate::auth::Actor;
use crate::ledger::admission::{self, Cancellation, Confirmation};
use crate::models::{
    Booking, BookingStatus, NewBooking, NewSlot, NewTicket, PaymentProof, Slot, SlotAvailability,
    SlotChanges, Ticket,
};
use crate::store::{BookingStore, TicketInsert, TicketUse};
use crate::utils::{AppError, AppResult};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn conflict_on_unique(err: sqlx::Error, conflict: impl FnOnce() -> AppError) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => conflict(),
        _ => AppError::DatabaseError(err),
    }
}

fn slot_time_taken() -> AppError {
    AppError::Conflict("Another slot already exists at this time".to_string())
}

async fn lock_slot(conn: &mut PgConnection, id: Uuid) -> AppResult<Slot> {
    sqlx::query_as::<_, Slot>("SELECT * FROM slots WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::SlotNotFound(id.to_string()))
}

/// Non-cancelled bookings on the slot's date. Call with the slot row locked.
async fn day_bookings(conn: &mut PgConnection, slot: &Slot) -> AppResult<Vec<Booking>> {
    let bookings = sqlx::query_as::<_, Booking>(
        r#"
        SELECT * FROM bookings
        WHERE slot_id = $1 AND date = $2 AND status <> 'cancelled'
        "#,
    )
    .bind(slot.id)
    .bind(slot.date)
    .fetch_all(conn)
    .await?;
    Ok(bookings)
}

async fn booking_for_update(conn: &mut PgConnection, id: Uuid) -> AppResult<Booking> {
    sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::BookingNotFound(id.to_string()))
}

#[async_trait]
impl BookingStore for PgStore {
    async fn get_slot(&self, id: Uuid) -> AppResult<Option<Slot>> {
        let slot = sqlx::query_as::<_, Slot>("SELECT * FROM slots WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(slot)
    }

    async fn get_slots(&self, ids: &[Uuid]) -> AppResult<Vec<Slot>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let slots = sqlx::query_as::<_, Slot>("SELECT * FROM slots WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(slots)
    }

    #[instrument(skip(self), err)]
    async fn list_slots(
        &self,
        date: Option<NaiveDate>,
        hold_cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<SlotAvailability>> {
        let slots = sqlx::query_as::<_, Slot>(
            r#"
            SELECT * FROM slots
            WHERE $1::DATE IS NULL OR date = $1
            ORDER BY date, time
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        let bookings = sqlx::query_as::<_, Booking>(
            r#"
            SELECT b.* FROM bookings b
            JOIN slots s ON s.id = b.slot_id AND s.date = b.date
            WHERE ($1::DATE IS NULL OR b.date = $1) AND b.status <> 'cancelled'
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(slots
            .into_iter()
            .map(|slot| SlotAvailability {
                remaining: admission::remaining_units(&slot, &bookings, hold_cutoff),
                slot,
            })
            .collect())
    }

    #[instrument(skip(self, new), fields(date = %new.date, time = %new.time), err)]
    async fn upsert_slot(&self, new: NewSlot, hold_cutoff: DateTime<Utc>) -> AppResult<Slot> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Slot>(
            "SELECT * FROM slots WHERE date = $1 AND time = $2 FOR UPDATE",
        )
        .bind(new.date)
        .bind(new.time)
        .fetch_optional(&mut *tx)
        .await?;

        let slot = match current {
            Some(current) => {
                let bookings = day_bookings(&mut tx, &current).await?;
                admission::ensure_capacity_covers(
                    &current,
                    new.total_capacity,
                    &bookings,
                    hold_cutoff,
                )?;
                sqlx::query_as::<_, Slot>(
                    r#"
                    UPDATE slots
                    SET price = $2, total_capacity = $3, is_night = $4, is_enabled = $5,
                        updated_at = now()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(current.id)
                .bind(new.price)
                .bind(new.total_capacity)
                .bind(new.is_night)
                .bind(new.is_enabled)
                .fetch_one(&mut *tx)
                .await?
            }
            None => sqlx::query_as::<_, Slot>(
                r#"
                INSERT INTO slots (id, date, time, price, total_capacity, is_night, is_enabled)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(new.date)
            .bind(new.time)
            .bind(new.price)
            .bind(new.total_capacity)
            .bind(new.is_night)
            .bind(new.is_enabled)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| conflict_on_unique(e, slot_time_taken))?,
        };

        tx.commit().await?;
        Ok(slot)
    }

    #[instrument(skip(self, changes), err)]
    async fn update_slot(
        &self,
        id: Uuid,
        changes: SlotChanges,
        hold_cutoff: DateTime<Utc>,
    ) -> AppResult<Slot> {
        let mut tx = self.pool.begin().await?;
        let current = lock_slot(&mut tx, id).await?;
        let bookings = day_bookings(&mut tx, &current).await?;
        admission::ensure_capacity_covers(
            &current,
            changes.total_capacity,
            &bookings,
            hold_cutoff,
        )?;

        let slot = sqlx::query_as::<_, Slot>(
            r#"
            UPDATE slots
            SET time = $2, price = $3, total_capacity = $4, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.time)
        .bind(changes.price)
        .bind(changes.total_capacity)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, slot_time_taken))?;

        tx.commit().await?;
        Ok(slot)
    }

    async fn set_slot_enabled(&self, id: Uuid, enabled: bool) -> AppResult<Slot> {
        sqlx::query_as::<_, Slot>(
            "UPDATE slots SET is_enabled = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(enabled)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::SlotNotFound(id.to_string()))
    }

    #[instrument(skip(self), err)]
    async fn delete_slot(&self, id: Uuid, hold_cutoff: DateTime<Utc>) -> AppResult<Slot> {
        let mut tx = self.pool.begin().await?;
        let slot = lock_slot(&mut tx, id).await?;
        let bookings = day_bookings(&mut tx, &slot).await?;
        admission::ensure_deletable(&slot, &bookings, hold_cutoff)?;

        // Lapsed and cancelled bookings go with the slot (ON DELETE CASCADE).
        sqlx::query("DELETE FROM slots WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(slot)
    }

    #[instrument(skip(self), err)]
    async fn delete_all_slots(&self, hold_cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM slots s
            WHERE NOT EXISTS (
                SELECT 1 FROM bookings b
                WHERE b.slot_id = s.id
                  AND b.date = s.date
                  AND (b.status = 'confirmed' OR (b.status = 'pending' AND b.created_at > $1))
            )
            "#,
        )
        .bind(hold_cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, slots), fields(count = slots.len()), err)]
    async fn insert_slots_if_absent(&self, slots: &[NewSlot]) -> AppResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut created = 0;
        for slot in slots {
            let result = sqlx::query(
                r#"
                INSERT INTO slots (id, date, time, price, total_capacity, is_night, is_enabled)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (date, time) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(slot.date)
            .bind(slot.time)
            .bind(slot.price)
            .bind(slot.total_capacity)
            .bind(slot.is_night)
            .bind(slot.is_enabled)
            .execute(&mut *tx)
            .await?;
            created += result.rows_affected();
        }
        tx.commit().await?;
        Ok(created)
    }

    #[instrument(skip(self, request), fields(slot_id = %request.slot_id, user_id = %request.user_id), err)]
    async fn admit_booking(
        &self,
        request: NewBooking,
        hold_cutoff: DateTime<Utc>,
    ) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await?;
        let slot = lock_slot(&mut tx, request.slot_id).await?;
        let bookings = day_bookings(&mut tx, &slot).await?;
        let admitted = admission::admit(&slot, &bookings, request, hold_cutoff)?;
        let booking = admitted.booking;

        if !admitted.superseded.is_empty() {
            sqlx::query(
                "UPDATE bookings SET status = 'cancelled', cancelled_at = $2 WHERE id = ANY($1)",
            )
            .bind(&admitted.superseded)
            .bind(booking.created_at)
            .execute(&mut *tx)
            .await?;
        }

        let booking = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings
                (id, slot_id, user_id, date, status, amount, both_turfs, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(booking.id)
        .bind(booking.slot_id)
        .bind(&booking.user_id)
        .bind(booking.date)
        .bind(booking.status)
        .bind(booking.amount)
        .bind(booking.both_turfs)
        .bind(booking.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(booking)
    }

    async fn attach_order(&self, booking_id: Uuid, order_id: &str) -> AppResult<Booking> {
        sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET order_id = $2 WHERE id = $1 RETURNING *",
        )
        .bind(booking_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::BookingNotFound(booking_id.to_string()))
    }

    #[instrument(skip(self, proof), err)]
    async fn confirm_booking(
        &self,
        booking_id: Uuid,
        user_id: &str,
        proof: &PaymentProof,
        now: DateTime<Utc>,
        hold_cutoff: DateTime<Utc>,
    ) -> AppResult<Booking> {
        let slot_id: Uuid = sqlx::query_scalar("SELECT slot_id FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::BookingNotFound(booking_id.to_string()))?;

        // Slot before booking, the same order admission takes its locks in.
        let mut tx = self.pool.begin().await?;
        let slot = lock_slot(&mut tx, slot_id).await?;
        let booking = booking_for_update(&mut tx, booking_id).await?;
        let bookings = day_bookings(&mut tx, &slot).await?;

        let confirmed = match admission::confirm(
            &slot,
            &bookings,
            &booking,
            user_id,
            proof,
            now,
            hold_cutoff,
        )? {
            Confirmation::AlreadyConfirmed => return Ok(booking),
            Confirmation::Confirm(confirmed) => confirmed,
        };

        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET status = $2, order_id = $3, payment_id = $4, signature = $5, confirmed_at = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(confirmed.id)
        .bind(confirmed.status)
        .bind(&confirmed.order_id)
        .bind(&confirmed.payment_id)
        .bind(&confirmed.signature)
        .bind(confirmed.confirmed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, admission::payment_reused))?;

        tx.commit().await?;
        Ok(booking)
    }

    #[instrument(skip(self), err)]
    async fn cancel_booking(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await?;
        let booking = booking_for_update(&mut tx, booking_id).await?;
        let ticket =
            sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE booking_id = $1 FOR UPDATE")
                .bind(booking_id)
                .fetch_optional(&mut *tx)
                .await?;

        if admission::cancel(&booking, actor, ticket.as_ref())? == Cancellation::AlreadyCancelled {
            return Ok(booking);
        }

        let booking = sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET status = $2, cancelled_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(booking_id)
        .bind(BookingStatus::Cancelled)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(booking)
    }

    async fn get_booking(&self, id: Uuid) -> AppResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(booking)
    }

    async fn find_booking_by_order(&self, order_id: &str) -> AppResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(booking)
    }

    async fn list_user_bookings(&self, user_id: &str) -> AppResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE user_id = $1 ORDER BY date DESC, created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn list_bookings_for_date(&self, date: NaiveDate) -> AppResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE date = $1 ORDER BY created_at",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn insert_ticket(&self, new: NewTicket) -> AppResult<TicketInsert> {
        let inserted = sqlx::query_as::<_, Ticket>(
            r#"
            INSERT INTO tickets (id, booking_id, user_id, ticket_number, qr_payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.booking_id)
        .bind(&new.user_id)
        .bind(&new.ticket_number)
        .bind(&new.qr_payload)
        .bind(new.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(ticket) = inserted {
            return Ok(TicketInsert::Inserted(ticket));
        }
        Ok(match self.get_ticket_for_booking(new.booking_id).await? {
            Some(existing) => TicketInsert::Existing(existing),
            None => TicketInsert::NumberTaken,
        })
    }

    async fn get_ticket_for_booking(&self, booking_id: Uuid) -> AppResult<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE booking_id = $1")
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    #[instrument(skip(self), err)]
    async fn mark_ticket_used(
        &self,
        ticket_number: &str,
        now: DateTime<Utc>,
    ) -> AppResult<TicketUse> {
        let mut tx = self.pool.begin().await?;

        let Some(ticket) =
            sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE ticket_number = $1")
                .bind(ticket_number)
                .fetch_optional(&mut *tx)
                .await?
        else {
            return Ok(TicketUse::NotFound);
        };

        // Booking before ticket, the same order cancellation locks them in.
        let status: Option<BookingStatus> =
            sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1 FOR SHARE")
                .bind(ticket.booking_id)
                .fetch_optional(&mut *tx)
                .await?;
        if status != Some(BookingStatus::Confirmed) {
            return Ok(TicketUse::BookingNotConfirmed(ticket));
        }

        let marked = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET is_used = TRUE, used_at = $2
            WHERE id = $1 AND NOT is_used
            RETURNING *
            "#,
        )
        .bind(ticket.id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match marked {
            Some(ticket) => TicketUse::Marked(ticket),
            None => {
                let used = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1")
                    .bind(ticket.id)
                    .fetch_one(&mut *tx)
                    .await?;
                TicketUse::AlreadyUsed(used)
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn list_user_tickets(&self, user_id: &str) -> AppResult<Vec<Ticket>> {
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use rust_decimal::Decimal;

    fn new_slot(capacity: i32) -> NewSlot {
        NewSlot {
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            price: Decimal::new(1200, 0),
            total_capacity: capacity,
            is_night: true,
            is_enabled: true,
        }
    }

    fn new_booking(slot: &Slot, user: &str) -> NewBooking {
        NewBooking {
            slot_id: slot.id,
            user_id: user.to_string(),
            date: slot.date,
            both_turfs: false,
            created_at: Utc::now(),
        }
    }

    fn cutoff() -> DateTime<Utc> {
        Utc::now() - chrono::Duration::minutes(15)
    }

    fn proof(order: &str, payment: &str) -> PaymentProof {
        PaymentProof {
            order_id: order.to_string(),
            payment_id: payment.to_string(),
            signature: "verified-upstream".to_string(),
        }
    }

    async fn confirmed(store: &PgStore, slot: &Slot, user: &str, payment: &str) -> Booking {
        let booking = store.admit_booking(new_booking(slot, user), cutoff()).await.unwrap();
        let order = format!("order_{}", booking.id);
        store.attach_order(booking.id, &order).await.unwrap();
        store
            .confirm_booking(booking.id, user, &proof(&order, payment), Utc::now(), cutoff())
            .await
            .unwrap()
    }

    #[sqlx::test]
    async fn test_concurrent_admission_stops_at_capacity(pool: PgPool) {
        let store = PgStore::new(pool);
        let slot = store.upsert_slot(new_slot(3), cutoff()).await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                let request = new_booking(&slot, &format!("user_{i}"));
                tokio::spawn(async move { store.admit_booking(request, cutoff()).await })
            })
            .collect();

        let mut admitted = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(AppError::CapacityExceeded { both_turfs: false }) => rejected += 1,
                Err(e) => panic!("unexpected error: {e:?}"),
            }
        }
        assert_eq!((admitted, rejected), (3, 1));

        let listing = store.list_slots(Some(slot.date), cutoff()).await.unwrap();
        assert_eq!(listing[0].remaining, 0);
    }

    #[sqlx::test]
    async fn test_confirm_is_idempotent(pool: PgPool) {
        let store = PgStore::new(pool);
        let slot = store.upsert_slot(new_slot(3), cutoff()).await.unwrap();
        let first = confirmed(&store, &slot, "user_1", "pay_1").await;
        assert_eq!(first.status, BookingStatus::Confirmed);

        let order = first.order_id.clone().unwrap();
        let again = store
            .confirm_booking(first.id, "user_1", &proof(&order, "pay_1"), Utc::now(), cutoff())
            .await
            .unwrap();
        assert_eq!(again.confirmed_at, first.confirmed_at);

        let found = store.find_booking_by_order(&order).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[sqlx::test]
    async fn test_payment_id_settles_one_booking(pool: PgPool) {
        let store = PgStore::new(pool);
        let slot = store.upsert_slot(new_slot(3), cutoff()).await.unwrap();
        confirmed(&store, &slot, "user_1", "pay_1").await;

        let other = store.admit_booking(new_booking(&slot, "user_2"), cutoff()).await.unwrap();
        store.attach_order(other.id, "order_other").await.unwrap();
        let err = store
            .confirm_booking(other.id, "user_2", &proof("order_other", "pay_1"), Utc::now(), cutoff())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let stored = store.get_booking(other.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
    }

    #[sqlx::test]
    async fn test_rebooking_cancels_lapsed_hold(pool: PgPool) {
        let store = PgStore::new(pool);
        let slot = store.upsert_slot(new_slot(3), cutoff()).await.unwrap();

        let mut stale = new_booking(&slot, "user_1");
        stale.created_at = Utc::now() - chrono::Duration::hours(1);
        let lapsed = store.admit_booking(stale, cutoff()).await.unwrap();
        store.attach_order(lapsed.id, "order_lapsed").await.unwrap();

        store.admit_booking(new_booking(&slot, "user_1"), cutoff()).await.unwrap();

        let err = store
            .confirm_booking(lapsed.id, "user_1", &proof("order_lapsed", "pay_1"), Utc::now(), cutoff())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BookingCancelled(_)));
    }

    #[sqlx::test]
    async fn test_double_scan_reports_first_use(pool: PgPool) {
        let store = PgStore::new(pool);
        let slot = store.upsert_slot(new_slot(3), cutoff()).await.unwrap();
        let booking = confirmed(&store, &slot, "user_1", "pay_1").await;

        let inserted = store
            .insert_ticket(NewTicket {
                booking_id: booking.id,
                user_id: booking.user_id.clone(),
                ticket_number: "TF2406010001".to_string(),
                qr_payload: "{}".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        assert!(matches!(inserted, TicketInsert::Inserted(_)));

        let first = match store.mark_ticket_used("TF2406010001", Utc::now()).await.unwrap() {
            TicketUse::Marked(ticket) => ticket,
            other => panic!("unexpected {other:?}"),
        };
        match store.mark_ticket_used("TF2406010001", Utc::now()).await.unwrap() {
            TicketUse::AlreadyUsed(ticket) => assert_eq!(ticket.used_at, first.used_at),
            other => panic!("unexpected {other:?}"),
        }

        let err = store
            .cancel_booking(booking.id, &Actor::Admin, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(
            store.mark_ticket_used("TF0000000000", Utc::now()).await.unwrap(),
            TicketUse::NotFound
        );
    }

    #[sqlx::test]
    async fn test_cancelled_booking_ticket_is_refused(pool: PgPool) {
        let store = PgStore::new(pool);
        let slot = store.upsert_slot(new_slot(3), cutoff()).await.unwrap();
        let booking = confirmed(&store, &slot, "user_1", "pay_1").await;
        store
            .insert_ticket(NewTicket {
                booking_id: booking.id,
                user_id: booking.user_id.clone(),
                ticket_number: "TF2406010002".to_string(),
                qr_payload: "{}".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        store.cancel_booking(booking.id, &Actor::Admin, Utc::now()).await.unwrap();
        let outcome = store.mark_ticket_used("TF2406010002", Utc::now()).await.unwrap();
        assert!(matches!(outcome, TicketUse::BookingNotConfirmed(ref t) if !t.is_used));
    }
}
