//! Fire-and-forget notifications derived from ledger events.
//!
//! A background task subscribes to the [`EventBus`], turns the events
//! worth telling a person about into [`Notification`]s and hands them to
//! a [`Mailer`]. Delivery happens after the ledger transaction committed,
//! so a failed send is logged and never undoes anything.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::domain::{EventBus, GuideProfileId, LedgerEvent, UserId};

/// Delivery failure reported by a [`Mailer`].
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The transport refused or dropped the message.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Who a notification is addressed to. Resolving the address is the
/// mailer's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    /// An end user.
    User(UserId),
    /// The owner of a guide profile.
    Guide(GuideProfileId),
}

/// A message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Addressee.
    pub recipient: Recipient,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl Notification {
    /// Builds the notification for `event`, if it warrants one.
    #[must_use]
    pub fn from_event(event: &LedgerEvent) -> Option<Self> {
        match event {
            LedgerEvent::PointsRedeemed {
                user_id,
                quantity,
                points_spent,
                new_balance,
                ..
            } => Some(Self {
                recipient: Recipient::User(*user_id),
                subject: "Canje realizado".to_string(),
                body: format!(
                    "You redeemed {quantity} item(s) for {points_spent} points. \
                     Your balance is now {new_balance}."
                ),
            }),
            LedgerEvent::PointsEarned {
                user_id,
                points_awarded,
                new_balance,
                ..
            } => Some(Self {
                recipient: Recipient::User(*user_id),
                subject: "Reciclaje registrado".to_string(),
                body: format!(
                    "You earned {points_awarded} points. Your balance is now {new_balance}."
                ),
            }),
            LedgerEvent::ReservationChanged {
                reservation_id,
                guide_profile_id,
                state,
                payment_state,
                ..
            } => Some(Self {
                recipient: Recipient::Guide(*guide_profile_id),
                subject: format!("Reserva {reservation_id}: {state}"),
                body: format!(
                    "Reservation {reservation_id} is now {state} (payment: {payment_state})."
                ),
            }),
            LedgerEvent::StockReplenished { .. }
            | LedgerEvent::SessionOpened { .. }
            | LedgerEvent::SessionConfirmed { .. }
            | LedgerEvent::SessionExpired { .. } => None,
        }
    }
}

/// Boxed future returned by [`Mailer::send`].
pub type MailFuture<'a> = Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>>;

/// Outbound notification transport.
pub trait Mailer: Send + Sync + fmt::Debug {
    /// Delivers one notification.
    fn send(&self, notification: Notification) -> MailFuture<'_>;
}

/// Mailer that writes notifications to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, notification: Notification) -> MailFuture<'_> {
        Box::pin(async move {
            tracing::info!(
                recipient = ?notification.recipient,
                subject = %notification.subject,
                "notification"
            );
            Ok(())
        })
    }
}

/// Spawns the notifier task. It ends when every sender of `bus` is gone.
pub fn spawn_notifier(bus: &EventBus, mailer: Arc<dyn Mailer>) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Some(notification) = Notification::from_event(&event) else {
                        continue;
                    };
                    if let Err(e) = mailer.send(notification).await {
                        tracing::warn!(
                            event_type = event.event_type_str(),
                            error = %e,
                            "notification not delivered"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "notifier lagged behind event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("notifier stopped");
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{ProductId, RedemptionId, StoreId};
    use tokio::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    impl Mailer for RecordingMailer {
        fn send(&self, notification: Notification) -> MailFuture<'_> {
            Box::pin(async move {
                self.sent.lock().await.push(notification);
                if self.fail {
                    return Err(NotifyError::Delivery("smtp down".to_string()));
                }
                Ok(())
            })
        }
    }

    fn redeemed() -> LedgerEvent {
        LedgerEvent::PointsRedeemed {
            redemption_id: RedemptionId::new(1),
            user_id: UserId::new(7),
            store_id: StoreId::new(2),
            product_id: ProductId::new(3),
            quantity: 2,
            points_spent: 300,
            new_balance: 200,
            remaining_stock: 3,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn session_events_are_not_mailed() {
        let opened = LedgerEvent::SessionExpired {
            session_id: crate::domain::SessionId::new(),
            kind: crate::domain::SessionKind::Redemption,
            timestamp: chrono::Utc::now(),
        };
        assert!(Notification::from_event(&opened).is_none());

        let Some(n) = Notification::from_event(&redeemed()) else {
            panic!("redemption is notified");
        };
        assert_eq!(n.recipient, Recipient::User(UserId::new(7)));
        assert!(n.body.contains("300 points"));
    }

    #[tokio::test]
    async fn notifier_delivers_and_survives_failures() {
        let bus = EventBus::new(8);
        let mailer = Arc::new(RecordingMailer {
            fail: true,
            ..RecordingMailer::default()
        });
        let handle = spawn_notifier(&bus, Arc::clone(&mailer) as Arc<dyn Mailer>);

        bus.publish(redeemed());
        bus.publish(redeemed());
        drop(bus);

        tokio_test::assert_ok!(handle.await);
        assert_eq!(mailer.sent.lock().await.len(), 2);
    }
}
