//! Scripted mail transport for tests.
//!
//! Outcomes are consumed in order; once the script runs out every send
//! succeeds. Successful sends are recorded for inspection. Calls can also be
//! made to hang forever, standing in for a relay that never answers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ports::{MailTransport, OutboundEmail, TransportError, TransportReceipt};

#[derive(Debug, Default)]
pub struct MockMailTransport {
    script: Mutex<VecDeque<Result<(), TransportError>>>,
    sent: Mutex<Vec<OutboundEmail>>,
    calls: AtomicUsize,
    hangs: AtomicUsize,
}

impl MockMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next unscripted call.
    pub fn push_outcome(&self, outcome: Result<(), TransportError>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
    }

    /// Fail the next `n` calls with `error`.
    pub fn fail_times(&self, n: usize, error: TransportError) {
        for _ in 0..n {
            self.push_outcome(Err(error.clone()));
        }
    }

    /// Make the next `n` calls never complete.
    pub fn hang_next(&self, n: usize) {
        self.hangs.fetch_add(n, Ordering::SeqCst);
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Every call, successful or not.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailTransport for MockMailTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<TransportReceipt, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let hang = self
            .hangs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hang {
            std::future::pending::<()>().await;
        }

        let outcome = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(Ok(()));

        outcome?;
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(email.clone());
        Ok(TransportReceipt {
            message_id: Some(format!("mock-{}", call)),
        })
    }
}
