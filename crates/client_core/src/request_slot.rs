use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RequestTicket {
    pub id: u64,
    pub token: CancellationToken,
}

#[derive(Debug, Default)]
pub struct RequestSlot {
    active: Option<RequestTicket>,
    next_id: u64,
}

impl RequestSlot {
    pub fn begin(&mut self) -> RequestTicket {
        self.next_id += 1;
        let ticket = RequestTicket {
            id: self.next_id,
            token: CancellationToken::new(),
        };
        if let Some(previous) = self.active.replace(ticket.clone()) {
            debug!(
                superseded = previous.id,
                request_id = ticket.id,
                "cancelling superseded request"
            );
            previous.token.cancel();
        }
        ticket
    }

    pub fn cancel_current(&mut self) -> Option<u64> {
        let previous = self.active.take()?;
        previous.token.cancel();
        Some(previous.id)
    }

    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        !ticket.token.is_cancelled()
            && self
                .active
                .as_ref()
                .is_some_and(|active| active.id == ticket.id)
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Empties the slot if `ticket` still owns it.
    pub fn finish(&mut self, ticket: &RequestTicket) {
        if self.is_current(ticket) {
            self.active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_cancels_previous_owner() {
        let mut slot = RequestSlot::default();
        let first = slot.begin();
        let second = slot.begin();

        assert!(first.token.is_cancelled());
        assert!(!slot.is_current(&first));
        assert!(slot.is_current(&second));
        assert!(second.id > first.id);
    }

    #[test]
    fn cancel_current_empties_slot() {
        let mut slot = RequestSlot::default();
        let ticket = slot.begin();

        assert_eq!(slot.cancel_current(), Some(ticket.id));
        assert!(ticket.token.is_cancelled());
        assert!(!slot.is_busy());
        assert_eq!(slot.cancel_current(), None);
    }

    #[test]
    fn finish_ignores_stale_tickets() {
        let mut slot = RequestSlot::default();
        let stale = slot.begin();
        let live = slot.begin();

        slot.finish(&stale);
        assert!(slot.is_current(&live));

        slot.finish(&live);
        assert!(!slot.is_busy());
    }
}
