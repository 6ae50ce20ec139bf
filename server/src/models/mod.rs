pub mod booking;
pub mod slot;
pub mod ticket;

pub use booking::{Booking, BookingStatus, NewBooking, PaymentProof};
pub use slot::{NewSlot, Slot, SlotAvailability, SlotChanges};
pub use ticket::{NewTicket, Ticket, VerificationResult};
