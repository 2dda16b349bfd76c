// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook subscription and delivery engine.
//!
//! Flow: a domain event reaches the [`Dispatcher`], which writes one
//! `pending` delivery row and one `webhook/deliver` job per matching active
//! subscription. A [`WorkerPool`] drains the queue; each [`DeliveryWorker`]
//! signs the stored payload with the subscription's derived key, POSTs it,
//! and records the outcome. Failed deliveries are re-sent only by an
//! explicit [`RetryCoordinator::retry`]. The [`TestProbe`] sends an
//! unrecorded `test` event signed with a public test key.

pub mod dispatcher;
pub mod engine;
pub mod payload;
pub mod pool;
pub mod probe;
pub mod retry;
pub mod sender;
pub mod store;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use engine::{Collaborators, WebhookEngine};
pub use pool::WorkerPool;
pub use probe::{ProbeOutcome, TestProbe};
pub use retry::RetryCoordinator;
pub use store::{CreatedSubscription, NewSubscription, SubscriptionStore};
pub use worker::DeliveryWorker;
