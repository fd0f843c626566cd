use std::{cell::RefCell, collections::VecDeque};

use crossbeam::channel::{Receiver, TryRecvError};

use crate::{
    error::{Error, Result},
    protocol::{Envelope, Matcher, Ticket, ANY_SOURCE},
};

/// A receive posted ahead of its message.
struct Posted {
    ticket: u64,
    matcher: Matcher,
    envelope: Option<Envelope>,
}

#[derive(Default)]
struct State {
    /// Arrived messages that no receive has claimed yet, in arrival order.
    unexpected: VecDeque<Envelope>,
    /// Posted receives in the order they were posted.
    posted: VecDeque<Posted>,
    next_ticket: u64,
    /// Peers whose connection ended.
    closed: ahash::HashSet<usize>,
}

impl State {
    /// Hands an incoming envelope to the oldest posted receive that accepts
    /// it, or gives it back if none does.
    fn deliver(&mut self, envelope: Envelope) -> Option<Envelope> {
        if envelope.is_hangup() {
            tracing::debug!(peer = envelope.source, "peer hung up");
            self.closed.insert(envelope.source);
            return None;
        }
        let waiting = self
            .posted
            .iter_mut()
            .find(|p| p.envelope.is_none() && p.matcher.matches(&envelope));
        match waiting {
            Some(posted) => {
                posted.envelope = Some(envelope);
                None
            }
            None => Some(envelope),
        }
    }

    fn take_unexpected(&mut self, matcher: &Matcher) -> Option<Envelope> {
        let index = self.unexpected.iter().position(|e| matcher.matches(e))?;
        self.unexpected.remove(index)
    }
}

/// Incoming messages of one rank.
///
/// Messages that arrive while waiting for a different one are kept in
/// arrival order, so a later receive still observes the messages of each
/// source in the order they were sent. Receives posted with
/// [`reserve`](Mailbox::reserve) are matched when they are posted: an
/// arriving message goes to the oldest posted receive that accepts it
/// before any other receive sees it.
pub struct Mailbox {
    size: usize,
    inbox: Receiver<Envelope>,
    state: RefCell<State>,
}

impl Mailbox {
    /// Mailbox of a rank in a universe of `size` ranks.
    pub fn new(inbox: Receiver<Envelope>, size: usize) -> Self {
        Self {
            size,
            inbox,
            state: RefCell::default(),
        }
    }

    /// Blocks until a message accepted by `matcher` is available and
    /// removes it.
    pub fn take(&self, matcher: Matcher) -> Result<Envelope> {
        let mut state = self.state.borrow_mut();
        if let Some(envelope) = state.take_unexpected(&matcher) {
            return Ok(envelope);
        }

        loop {
            let envelope = self.next(&state, &matcher)?;
            if let Some(envelope) = state.deliver(envelope) {
                if matcher.matches(&envelope) {
                    return Ok(envelope);
                }
                tracing::trace!(
                    source = envelope.source,
                    tag = envelope.tag,
                    kind = envelope.kind,
                    "deferring message"
                );
                state.unexpected.push_back(envelope);
            }
        }
    }

    /// Posts a receive for the next message accepted by `matcher`.
    ///
    /// A matching message that already arrived is bound to the ticket
    /// immediately.
    pub fn reserve(&self, matcher: Matcher) -> Ticket {
        let mut state = self.state.borrow_mut();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        let envelope = state.take_unexpected(&matcher);
        state.posted.push_back(Posted {
            ticket,
            matcher,
            envelope,
        });
        Ticket(ticket)
    }

    /// Blocks until the message bound to `ticket` has arrived and returns
    /// it.
    pub fn claim(&self, ticket: Ticket) -> Result<Envelope> {
        let mut state = self.state.borrow_mut();
        loop {
            let index = state
                .posted
                .iter()
                .position(|p| p.ticket == ticket.0)
                .ok_or(Error::UnknownRequest)?;
            if state.posted[index].envelope.is_some() {
                return state
                    .posted
                    .remove(index)
                    .and_then(|p| p.envelope)
                    .ok_or(Error::UnknownRequest);
            }

            let matcher = state.posted[index].matcher;
            let envelope = match self.next(&state, &matcher) {
                Ok(envelope) => envelope,
                Err(err) => {
                    state.posted.remove(index);
                    return Err(err);
                }
            };
            if let Some(envelope) = state.deliver(envelope) {
                state.unexpected.push_back(envelope);
            }
        }
    }

    /// Whether no message accepted by `matcher` can arrive anymore.
    fn is_lost(&self, state: &State, matcher: &Matcher) -> bool {
        if matcher.source == ANY_SOURCE {
            !state.closed.is_empty() && state.closed.len() + 1 >= self.size
        } else {
            state.closed.contains(&matcher.source)
        }
    }

    /// Next envelope of the inbox. Once the awaited peers are gone, only
    /// envelopes already queued are returned.
    fn next(&self, state: &State, matcher: &Matcher) -> Result<Envelope> {
        if self.is_lost(state, matcher) {
            return match self.inbox.try_recv() {
                Ok(envelope) => Ok(envelope),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => Err(Error::Disconnected),
            };
        }
        self.inbox.recv().map_err(|_| Error::Disconnected)
    }
}
