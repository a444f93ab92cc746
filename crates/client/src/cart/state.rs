//! In-memory cart state and the per-product sync ledger.
//!
//! Every request the cart store sends gets a [`Ticket`] carrying a sequence
//! number drawn from one monotonically increasing counter. The ledger keeps,
//! per product, the newest sequence number issued and the newest one whose
//! server answer was accepted. Answers are applied in issue order no matter
//! the order they arrive in:
//!
//! - an answer older than the last accepted one is dropped
//! - an accepted answer replaces the displayed row only if no newer request
//!   for that product is still pending (otherwise the newer optimistic value
//!   stays on screen)
//! - a failure reverts to the last confirmed row only if it belongs to the
//!   newest request for that product
//!
//! Nothing here does I/O, so the rules are tested directly below.

use std::collections::{HashMap, HashSet};

use atelier_core::{CurrencyCode, Price, ProductId, UserId};

use super::types::{CartItem, CartSnapshot, CartStatus, sum_lines};
use crate::error::StoreError;

/// Identifies one request for the lifetime of one cart identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    pub seq: u64,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct LineSync {
    last_issued: u64,
    last_applied: u64,
    /// Row as the server last confirmed it; `None` when absent server-side.
    confirmed: Option<CartItem>,
    /// Display position the row had before it was last removed locally.
    slot: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct CartState {
    owner: Option<UserId>,
    currency: CurrencyCode,
    generation: u64,
    next_seq: u64,
    items: Vec<CartItem>,
    ledger: HashMap<ProductId, LineSync>,
    status: CartStatus,
    last_error: Option<StoreError>,
    in_flight: usize,
    fetching: bool,
}

impl CartState {
    pub fn new(owner: Option<UserId>, currency: CurrencyCode) -> Self {
        Self {
            owner,
            currency,
            generation: 0,
            next_seq: 0,
            items: Vec::new(),
            ledger: HashMap::new(),
            status: CartStatus::Empty,
            last_error: None,
            in_flight: 0,
            fetching: false,
        }
    }

    pub fn owner(&self) -> Option<&UserId> {
        self.owner.as_ref()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn find(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.product_id == product_id)
    }

    /// Currency of another line if `row` is priced in a different one.
    pub fn currency_conflict(&self, row: &CartItem) -> Option<CurrencyCode> {
        self.items
            .iter()
            .filter(|item| item.product_id != row.product_id)
            .map(|item| item.price.currency_code)
            .find(|currency| *currency != row.price.currency_code)
    }

    pub const fn status(&self) -> CartStatus {
        self.status
    }

    /// Whether `ticket` was issued for the current identity.
    pub const fn is_current(&self, ticket: Ticket) -> bool {
        ticket.generation == self.generation
    }

    /// Drop everything and start over for `owner`. Answers to requests
    /// issued before the reset are ignored from now on.
    pub fn reset(&mut self, owner: Option<UserId>) {
        self.generation += 1;
        self.owner = owner;
        self.items.clear();
        self.ledger.clear();
        self.status = CartStatus::Empty;
        self.last_error = None;
        self.in_flight = 0;
        self.fetching = false;
    }

    /// Load lines from the persisted cache. They count as confirmed until
    /// the next fetch says otherwise.
    pub fn restore(&mut self, items: Vec<CartItem>) {
        for item in &items {
            self.ledger.entry(item.product_id.clone()).or_default().confirmed = Some(item.clone());
        }
        self.items = items;
        self.status = CartStatus::Ready;
    }

    fn next_ticket(&mut self) -> Ticket {
        self.next_seq += 1;
        Ticket {
            seq: self.next_seq,
            generation: self.generation,
        }
    }

    /// Replace, insert, or remove the displayed row for `product_id`.
    fn put_line(&mut self, product_id: &ProductId, row: Option<CartItem>) {
        let position = self
            .items
            .iter()
            .position(|item| &item.product_id == product_id);

        match (position, row) {
            (Some(index), Some(row)) => {
                if let Some(slot) = self.items.get_mut(index) {
                    *slot = row;
                }
            }
            (Some(index), None) => {
                self.items.remove(index);
                self.ledger.entry(product_id.clone()).or_default().slot = Some(index);
            }
            (None, Some(row)) => {
                let at = self
                    .ledger
                    .get(product_id)
                    .and_then(|sync| sync.slot)
                    .map_or(self.items.len(), |slot| slot.min(self.items.len()));
                self.items.insert(at, row);
            }
            (None, None) => {}
        }
    }

    // =========================================================================
    // Local-only (guest) changes
    // =========================================================================

    /// Apply a change that needs no server confirmation.
    pub fn commit_local(&mut self, product_id: &ProductId, row: Option<CartItem>) {
        if row.is_some() && self.find(product_id).is_none() {
            // Fresh lines go to the end
            self.ledger.remove(product_id);
        }
        self.put_line(product_id, row.clone());
        self.ledger.entry(product_id.clone()).or_default().confirmed = row;
        self.status = CartStatus::Ready;
        self.last_error = None;
    }

    pub fn clear_local(&mut self) {
        self.items.clear();
        self.ledger.clear();
        self.status = CartStatus::Ready;
        self.last_error = None;
    }

    // =========================================================================
    // Line mutations
    // =========================================================================

    /// Show `row` optimistically and issue a ticket for the request that
    /// will confirm it.
    pub fn begin_mutation(&mut self, product_id: &ProductId, row: Option<CartItem>) -> Ticket {
        let ticket = self.next_ticket();
        if row.is_some() && self.find(product_id).is_none() {
            if let Some(sync) = self.ledger.get_mut(product_id) {
                sync.slot = None;
            }
        }
        self.put_line(product_id, row);
        self.ledger.entry(product_id.clone()).or_default().last_issued = ticket.seq;
        self.in_flight += 1;
        self.status = CartStatus::Mutating;
        ticket
    }

    /// Accept the server's view of one line. Returns `false` if the answer
    /// was stale and dropped.
    pub fn settle_line(
        &mut self,
        ticket: Ticket,
        product_id: &ProductId,
        server_row: Option<CartItem>,
    ) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        let sync = self.ledger.entry(product_id.clone()).or_default();
        if ticket.seq < sync.last_applied {
            return false;
        }
        sync.last_applied = ticket.seq;
        sync.confirmed.clone_from(&server_row);
        let newest = ticket.seq == sync.last_issued;
        if newest {
            self.put_line(product_id, server_row);
        }
        true
    }

    /// Undo the optimistic change made for `ticket`. Returns `true` if the
    /// displayed row was reverted.
    pub fn rollback_line(&mut self, ticket: Ticket, product_id: &ProductId) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        let confirmed = match self.ledger.get(product_id) {
            Some(sync) if ticket.seq == sync.last_issued && ticket.seq > sync.last_applied => {
                sync.confirmed.clone()
            }
            _ => return false,
        };
        self.put_line(product_id, confirmed);
        true
    }

    // =========================================================================
    // Clear
    // =========================================================================

    /// Empty the cart optimistically. The empty state is kept even if the
    /// server call fails.
    pub fn begin_clear(&mut self) -> Ticket {
        let ticket = self.next_ticket();
        let issued: Vec<ProductId> = self.items.iter().map(|i| i.product_id.clone()).collect();
        for product_id in issued {
            self.ledger.entry(product_id).or_default().last_issued = ticket.seq;
        }
        self.items.clear();
        self.in_flight += 1;
        self.status = CartStatus::Mutating;
        ticket
    }

    pub fn settle_clear(&mut self, ticket: Ticket) {
        if !self.is_current(ticket) {
            return;
        }
        for sync in self.ledger.values_mut() {
            if sync.last_issued <= ticket.seq {
                sync.last_applied = sync.last_applied.max(ticket.seq);
                sync.confirmed = None;
            }
        }
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    pub fn begin_fetch(&mut self) -> Ticket {
        let ticket = self.next_ticket();
        self.fetching = true;
        self.status = CartStatus::Loading;
        ticket
    }

    /// Replace the lines with the server's, except for products that have
    /// a request newer than the fetch. Returns `false` if the fetch belongs
    /// to an older identity.
    pub fn settle_fetch(&mut self, ticket: Ticket, server_items: Vec<CartItem>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }

        let mut merged = Vec::with_capacity(server_items.len());
        let mut seen = HashSet::new();

        for row in server_items {
            if !seen.insert(row.product_id.clone()) {
                continue;
            }
            let sync = self.ledger.entry(row.product_id.clone()).or_default();
            if sync.last_issued > ticket.seq {
                if let Some(local) = self.items.iter().find(|i| i.product_id == row.product_id) {
                    merged.push(local.clone());
                }
            } else {
                sync.last_applied = sync.last_applied.max(ticket.seq);
                sync.confirmed = Some(row.clone());
                merged.push(row);
            }
        }

        for local in &self.items {
            if seen.contains(&local.product_id) {
                continue;
            }
            if self
                .ledger
                .get(&local.product_id)
                .is_some_and(|sync| sync.last_issued > ticket.seq)
            {
                merged.push(local.clone());
            }
        }

        for (product_id, sync) in &mut self.ledger {
            if !seen.contains(product_id) && sync.last_issued <= ticket.seq {
                sync.last_applied = sync.last_applied.max(ticket.seq);
                sync.confirmed = None;
            }
        }

        self.items = merged;
        self.fetching = false;
        self.last_error = None;
        self.status = if self.in_flight > 0 {
            CartStatus::Mutating
        } else {
            CartStatus::Ready
        };
        true
    }

    pub fn fail_fetch(&mut self, ticket: Ticket, error: StoreError) {
        if !self.is_current(ticket) {
            return;
        }
        self.fetching = false;
        self.status = CartStatus::Error;
        self.last_error = Some(error);
    }

    /// Record that the mutation behind `ticket` has completed.
    pub fn finish(&mut self, ticket: Ticket, error: Option<StoreError>) {
        if !self.is_current(ticket) {
            return;
        }
        self.in_flight = self.in_flight.saturating_sub(1);
        match error {
            Some(error) => {
                self.status = CartStatus::Error;
                self.last_error = Some(error);
            }
            None if self.in_flight == 0 && !self.fetching => {
                self.status = CartStatus::Ready;
                self.last_error = None;
            }
            None => {}
        }
    }

    // =========================================================================
    // Selectors
    // =========================================================================

    pub fn total(&self) -> Price {
        let currency = self
            .items
            .first()
            .map_or(self.currency, |item| item.price.currency_code);
        Price::new(sum_lines(&self.items), currency)
    }

    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity.get())).sum()
    }

    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            owner: self.owner.clone(),
            items: self.items.clone(),
            total: self.total(),
            item_count: self.item_count(),
            status: self.status,
            last_error: self.last_error.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use atelier_core::Quantity;

    use super::*;

    fn line(id: &str, cents: i64, qty: u32) -> CartItem {
        CartItem {
            product_id: ProductId::new(id),
            quantity: Quantity::try_from(qty).unwrap(),
            name: id.to_uppercase(),
            price: Price::from_minor_units(cents, CurrencyCode::USD),
            image_url: None,
            slug: id.to_string(),
        }
    }

    fn ready(items: Vec<CartItem>) -> CartState {
        let mut state = CartState::new(Some(UserId::new("u_1")), CurrencyCode::USD);
        let ticket = state.begin_fetch();
        assert!(state.settle_fetch(ticket, items));
        state
    }

    fn ids(state: &CartState) -> Vec<&str> {
        state.items().iter().map(|i| i.product_id.as_str()).collect()
    }

    #[test]
    fn test_out_of_order_responses_issue_order_wins() {
        let a = ProductId::new("a");
        let mut state = ready(vec![line("a", 1000, 1)]);

        let first = state.begin_mutation(&a, Some(line("a", 1000, 3)));
        let second = state.begin_mutation(&a, Some(line("a", 1000, 5)));

        // The answer for 5 arrives first
        assert!(state.settle_line(second, &a, Some(line("a", 1000, 5))));
        state.finish(second, None);
        assert!(!state.settle_line(first, &a, Some(line("a", 1000, 3))));
        state.finish(first, None);

        assert_eq!(state.find(&a).unwrap().quantity.get(), 5);
        assert_eq!(state.status(), CartStatus::Ready);
    }

    #[test]
    fn test_older_answer_does_not_replace_newer_optimistic_row() {
        let a = ProductId::new("a");
        let mut state = ready(vec![line("a", 1000, 1)]);

        let first = state.begin_mutation(&a, Some(line("a", 1000, 3)));
        let _second = state.begin_mutation(&a, Some(line("a", 1000, 5)));

        assert!(state.settle_line(first, &a, Some(line("a", 1000, 3))));
        state.finish(first, None);

        assert_eq!(state.find(&a).unwrap().quantity.get(), 5);
        assert_eq!(state.status(), CartStatus::Mutating);
    }

    #[test]
    fn test_failure_reverts_to_confirmed_row() {
        let a = ProductId::new("a");
        let mut state = ready(vec![line("a", 1000, 2)]);

        let ticket = state.begin_mutation(&a, Some(line("a", 1000, 7)));
        assert!(state.rollback_line(ticket, &a));
        state.finish(ticket, Some(StoreError::Timeout));

        assert_eq!(state.find(&a).unwrap().quantity.get(), 2);
        assert_eq!(state.status(), CartStatus::Error);
        assert_eq!(state.snapshot().last_error, Some(StoreError::Timeout));
    }

    #[test]
    fn test_failure_of_superseded_request_keeps_newer_value() {
        let a = ProductId::new("a");
        let mut state = ready(vec![line("a", 1000, 2)]);

        let first = state.begin_mutation(&a, Some(line("a", 1000, 3)));
        let _second = state.begin_mutation(&a, Some(line("a", 1000, 4)));

        assert!(!state.rollback_line(first, &a));
        assert_eq!(state.find(&a).unwrap().quantity.get(), 4);
    }

    #[test]
    fn test_reverted_removal_returns_to_its_position() {
        let b = ProductId::new("b");
        let mut state = ready(vec![line("a", 100, 1), line("b", 200, 1), line("c", 300, 1)]);

        let ticket = state.begin_mutation(&b, None);
        assert_eq!(ids(&state), ["a", "c"]);

        assert!(state.rollback_line(ticket, &b));
        assert_eq!(ids(&state), ["a", "b", "c"]);
    }

    #[test]
    fn test_fetch_keeps_rows_with_newer_requests() {
        let a = ProductId::new("a");
        let mut state = ready(vec![line("a", 1000, 1)]);

        let fetch = state.begin_fetch();
        let _update = state.begin_mutation(&a, Some(line("a", 1000, 9)));

        assert!(state.settle_fetch(fetch, vec![line("a", 1000, 1), line("b", 500, 2)]));

        assert_eq!(state.find(&a).unwrap().quantity.get(), 9);
        assert_eq!(ids(&state), ["a", "b"]);
        assert_eq!(state.status(), CartStatus::Mutating);
    }

    #[test]
    fn test_fetch_keeps_optimistic_add_missing_from_server() {
        let mut state = ready(vec![]);
        let fetch = state.begin_fetch();
        let _add = state.begin_mutation(&ProductId::new("n"), Some(line("n", 100, 1)));

        assert!(state.settle_fetch(fetch, vec![]));
        assert_eq!(ids(&state), ["n"]);
    }

    #[test]
    fn test_fetch_deduplicates_rows() {
        let state = ready(vec![line("a", 100, 1), line("a", 100, 4)]);
        assert_eq!(state.items().len(), 1);
    }

    #[test]
    fn test_answers_from_previous_identity_are_ignored() {
        let a = ProductId::new("a");
        let mut state = ready(vec![line("a", 1000, 1)]);
        let ticket = state.begin_mutation(&a, Some(line("a", 1000, 2)));

        state.reset(Some(UserId::new("u_2")));

        assert!(!state.settle_line(ticket, &a, Some(line("a", 1000, 2))));
        state.finish(ticket, None);
        assert!(state.items().is_empty());
        assert_eq!(state.status(), CartStatus::Empty);
    }

    #[test]
    fn test_clear_discards_earlier_answers() {
        let a = ProductId::new("a");
        let mut state = ready(vec![line("a", 1000, 1)]);

        let update = state.begin_mutation(&a, Some(line("a", 1000, 2)));
        let clear = state.begin_clear();
        state.settle_clear(clear);
        state.finish(clear, None);

        assert!(!state.settle_line(update, &a, Some(line("a", 1000, 2))));
        assert!(state.items().is_empty());
    }

    #[test]
    fn test_clear_failure_keeps_empty_state() {
        let mut state = ready(vec![line("a", 1000, 1)]);
        let clear = state.begin_clear();
        state.finish(clear, Some(StoreError::Network("down".to_string())));

        assert!(state.items().is_empty());
        assert_eq!(state.status(), CartStatus::Error);
    }

    #[test]
    fn test_currency_conflict_ignores_the_same_product() {
        let state = ready(vec![line("a", 1000, 1), line("b", 500, 2)]);
        let mut euro = line("c", 900, 1);
        euro.price = Price::from_minor_units(900, CurrencyCode::EUR);

        assert_eq!(state.currency_conflict(&euro), Some(CurrencyCode::USD));
        assert_eq!(state.currency_conflict(&line("c", 900, 1)), None);

        let single = ready(vec![line("a", 1000, 1)]);
        let mut repriced = line("a", 1000, 1);
        repriced.price = Price::from_minor_units(1000, CurrencyCode::EUR);
        assert_eq!(single.currency_conflict(&repriced), None);
    }

    #[test]
    fn test_total_is_sum_of_lines() {
        let state = ready(vec![line("a", 1000, 2), line("b", 333, 3)]);
        assert_eq!(state.total().amount, Decimal::new(2999, 2));
        assert_eq!(state.item_count(), 5);

        let empty = CartState::new(None, CurrencyCode::EUR);
        assert_eq!(empty.total(), Price::zero(CurrencyCode::EUR));
    }

    #[test]
    fn test_local_commit_appends_new_lines() {
        let mut state = CartState::new(None, CurrencyCode::USD);
        state.commit_local(&ProductId::new("a"), Some(line("a", 100, 1)));
        state.commit_local(&ProductId::new("b"), Some(line("b", 100, 1)));
        state.commit_local(&ProductId::new("a"), None);
        state.commit_local(&ProductId::new("a"), Some(line("a", 100, 1)));

        assert_eq!(ids(&state), ["b", "a"]);
        assert_eq!(state.status(), CartStatus::Ready);
    }
}
