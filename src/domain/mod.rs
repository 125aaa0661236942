//! Domain layer: identifiers, ledger rows, QR sessions, reservations and
//! the event system.
//!
//! Everything here is plain data plus the pure rules that apply to it
//! (cost and reward arithmetic, session and reservation state machines,
//! fee rounding). Persistence and orchestration live in
//! [`crate::persistence`] and [`crate::service`].

pub mod catalog;
pub mod clock;
pub mod event_bus;
pub mod ids;
pub mod ledger_entry;
pub mod ledger_event;
pub mod reservation;
pub mod session;

pub use catalog::{Account, ObjectType, Product, ProductPatch, Store};
pub use clock::{Clock, ManualClock, SystemClock};
pub use event_bus::EventBus;
pub use ids::{
    ClientProfileId, GuideProfileId, HistoryId, ObjectTypeId, PaymentId, ProductId, RecyclingId,
    RedemptionId, ReservationId, SessionId, StoreId, UserId,
};
pub use ledger_entry::{
    NewHistorySnapshot, NewRecycling, NewRedemption, PointsHistorySnapshot, RecyclingEvent,
    RedemptionEvent,
};
pub use ledger_event::LedgerEvent;
pub use reservation::{
    FeeBreakdown, NewPayment, NewReservation, PaymentState, PaymentTransaction, Reservation,
    ReservationState, TimeSlot,
};
pub use session::{
    QrSession, RecyclingSession, RecyclingTerms, RedemptionSession, RedemptionTerms, SessionKind,
    SessionState,
};
