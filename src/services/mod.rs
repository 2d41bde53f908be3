// Head Unit Bridge - Background Services
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Background services driving the features.
//!
//! - Orchestrator: decides which features run and starts/stops them
//! - Worker: dedicated execution context owned by each running feature

pub mod orchestrator;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::{Collaborators, HostLifecycle, Orchestrator};
pub use worker::{FeatureApp, FeatureWorker, HostContext, WorkerHandle};
