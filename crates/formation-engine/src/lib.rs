// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Formation Engine - formation assignment notification engine
//!
//! A formation groups applications, runtimes and runtime contexts of one
//! tenant. Whenever a participant joins or leaves, every other participant is
//! notified through its configured webhook, and the outcome is tracked per
//! directional pair as a [`FormationAssignment`](model::FormationAssignment).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 FormationMembershipService                    │
//! │        assign / unassign objects, ASA callbacks, resync       │
//! └──────────────────────────────────────────────────────────────┘
//!          │                                   │
//!          ▼                                   ▼
//! ┌────────────────────────────┐   ┌─────────────────────────────┐
//! │ FormationAssignmentService │──►│    NotificationsService     │
//! │  state machine, pairing,   │   │ generator + builder + send  │
//! │  keyed locks, read paths   │   └─────────────────────────────┘
//! └────────────────────────────┘                 │
//!          │                                     ▼
//!          ▼                         ┌─────────────────────────────┐
//! ┌────────────────────────────┐     │ formation-webhook           │
//! │  AssignmentRepository      │     │ (templates + HTTP client)   │
//! │  (SQLite)                  │     └─────────────────────────────┘
//! └────────────────────────────┘
//! ```
//!
//! # Assignment states
//!
//! | Outcome                        | Assign          | Unassign        |
//! |--------------------------------|-----------------|-----------------|
//! | No webhook                     | `READY`         | deleted         |
//! | Success                        | `READY`         | deleted         |
//! | Incomplete status code         | `CONFIG_PENDING`| `DELETE_ERROR`  |
//! | Async accepted                 | `CREATING`      | `DELETING`      |
//! | Rejected by remote             | `CREATE_ERROR`  | `DELETE_ERROR`  |
//! | Gone                           | `CREATE_ERROR`  | deleted         |
//! | Transport / template failure   | `CREATE_ERROR`  | `DELETE_ERROR`  |
//!
//! Labels, scenarios and ASA rule matching are consumed through the
//! [`directory::FormationDirectory`] and [`asa::AsaEngine`] traits.

pub mod asa;
pub mod assignment;
pub mod config;
pub mod directory;
pub mod error;
pub mod membership;
pub mod migrations;
pub mod model;
pub mod notifications;
pub mod persistence;
pub mod telemetry;
pub mod template_input;

pub use assignment::{FormationAssignmentService, PairOperation, ProcessingReport};
pub use error::{FormationError, Result};
pub use membership::FormationMembershipService;
pub use notifications::{NotificationRequest, NotificationsService};
