//! End-to-end workflow scenarios against a scripted device

mod helpers;

mod cancellation;
mod concurrent_executions;
mod failure_handling;
mod loop_until;
mod notifications;
mod retry_behavior;
mod success_chain;
