use std::any::Any;
use std::sync::Arc;

use super::{Activity, ActivityCell, ActivityError, ActivityKind, ActivityState, Request};

/// A transfer of bytes between two hosts.
///
/// Created either directly with [`Comm::sendto`], or through a
/// [`Mailbox`](crate::Mailbox) where a sender and a receiver are matched
/// before any byte moves.
#[derive(Debug, Clone)]
pub struct Comm {
    cell: Arc<ActivityCell>,
}

impl Comm {
    /// Direct host-to-host transfer, not yet started.
    pub fn sendto(src: impl Into<String>, dst: impl Into<String>, bytes: f64) -> Self {
        Self::with_request(
            bytes,
            Request::Transfer {
                src: src.into(),
                dst: dst.into(),
                bytes,
                rate: None,
            },
        )
    }

    /// Direct transfer, started right away.
    ///
    /// # Errors
    ///
    /// See [`Activity::start`].
    pub fn sendto_async(
        src: impl Into<String>,
        dst: impl Into<String>,
        bytes: f64,
    ) -> Result<Self, ActivityError> {
        let comm = Self::sendto(src, dst, bytes);
        comm.start()?;
        Ok(comm)
    }

    pub(crate) fn put(mailbox: &str, payload: Box<dyn Any + Send>, bytes: f64) -> Self {
        let comm = Self::with_request(
            bytes,
            Request::MailboxPut {
                mailbox: mailbox.to_string(),
                bytes,
                rate: None,
            },
        );
        comm.cell.lock().payload = Some(payload);
        comm
    }

    pub(crate) fn get(mailbox: &str) -> Self {
        // The size is only known once a sender is matched.
        Self::with_request(
            0.0,
            Request::MailboxGet {
                mailbox: mailbox.to_string(),
            },
        )
    }

    fn with_request(total: f64, request: Request) -> Self {
        Self {
            cell: ActivityCell::new(ActivityKind::Comm, total, request),
        }
    }

    /// Caps the transfer rate in bytes per second.
    ///
    /// # Errors
    ///
    /// - `ActivityError::NotInited` - Already started
    pub fn set_rate(&self, rate: f64) -> Result<&Self, ActivityError> {
        let mut inner = self.cell.lock();
        if inner.state != ActivityState::Inited {
            return Err(ActivityError::NotInited { state: inner.state });
        }
        match &mut inner.request {
            Request::Transfer { rate: current, .. } | Request::MailboxPut { rate: current, .. } => {
                *current = Some(rate);
            }
            _ => {}
        }
        Ok(self)
    }

    /// Mailbox this communication goes through, if any.
    pub fn mailbox(&self) -> Option<String> {
        match &self.cell.lock().request {
            Request::MailboxPut { mailbox, .. } | Request::MailboxGet { mailbox } => {
                Some(mailbox.clone())
            }
            _ => None,
        }
    }

    /// Takes the value carried by a received communication.
    ///
    /// # Errors
    ///
    /// - `ActivityError::NoPayload` - Nothing was received yet, or it was already taken
    /// - `ActivityError::PayloadType` - The payload is of another type; it is left in place
    pub fn take_payload<T: Any>(&self) -> Result<T, ActivityError> {
        let payload = self.cell.take_payload().ok_or(ActivityError::NoPayload)?;
        match payload.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(payload) => {
                self.cell.lock().payload = Some(payload);
                Err(ActivityError::PayloadType {
                    expected: std::any::type_name::<T>(),
                })
            }
        }
    }
}

impl Activity for Comm {
    fn cell(&self) -> &Arc<ActivityCell> {
        &self.cell
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_type_mismatch_keeps_payload() {
        let comm = Comm::put("box", Box::new(42u32), 8.0);
        assert_eq!(comm.mailbox().as_deref(), Some("box"));

        assert!(matches!(
            comm.take_payload::<String>(),
            Err(ActivityError::PayloadType { .. })
        ));
        assert_eq!(comm.take_payload::<u32>(), Ok(42));
        assert_eq!(comm.take_payload::<u32>(), Err(ActivityError::NoPayload));
    }

    #[test]
    fn test_direct_transfer_has_no_mailbox() {
        let comm = Comm::sendto("a", "b", 1e6);
        comm.set_rate(1e3).unwrap();
        assert_eq!(comm.mailbox(), None);
        assert_eq!(comm.get_remaining(), 1e6);
    }
}
