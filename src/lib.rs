//! # Todo Harness
//!
//! Pulls actionable work out of the services you already use and turns the
//! pieces you pick into todos.
//!
//! Adapters fetch recent items from Quip, Slack, Chorus, Mail, and the
//! calendar; the classifier keeps the ones that ask for action or mention
//! you and infers a priority and a due date; the aggregator merges
//! everything into one review list; the materializer turns accepted
//! candidates into persisted todos without duplicating them on re-import.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌────────────┐   ┌───────────┐   ┌──────────┐
//! │     Adapters     │──▶│  Classify  │──▶│   Merge   │──▶│  Review  │
//! │ Quip/Slack/      │   │ keywords + │   │ per-source│   │  (CLI)   │
//! │ Chorus/Mail/Cal  │   │ mentions   │   │ order     │   └────┬─────┘
//! └──────────────────┘   └────────────┘   └───────────┘        │
//!                                                              ▼
//!                                                 ┌────────────────────┐
//!                                                 │ Materialize → SQLite│
//!                                                 └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! td init                          # create the todo database
//! td profile set --display-name "Jane Doe" --email jane@company.com
//! td auth slack --token xoxb-…     # connect an adapter
//! td sync                          # review actionable items
//! td import --all                  # turn them into todos
//! td list --filter active
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Records, candidates, and todos |
//! | [`profile`] | User profile and mention detection |
//! | [`traits`] | `Adapter` trait and registry |
//! | [`adapter_quip`] | Quip documents |
//! | [`adapter_slack`] | Slack channel messages |
//! | [`adapter_chorus`] | Chorus meeting insights |
//! | [`adapter_mail`] | Mail.app messages |
//! | [`adapter_calendar`] | Upcoming calendar events |
//! | [`osascript`] | Local application automation |
//! | [`classify`] | Actionability, priority, due date |
//! | [`due_date`] | Due-date phrase extraction |
//! | [`aggregate`] | Merging per-source candidate lists |
//! | [`materialize`] | Candidate → todo, idempotent per source |
//! | [`store`] | Todo persistence |
//! | [`sync`] | Concurrent fan-out over adapters |
//! | [`credentials`] | Named credential slots |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod adapter_calendar;
pub mod adapter_chorus;
pub mod adapter_mail;
pub mod adapter_quip;
pub mod adapter_slack;
pub mod aggregate;
pub mod classify;
pub mod config;
pub mod credentials;
pub mod db;
pub mod due_date;
pub mod error;
pub mod http;
pub mod ingest;
pub mod materialize;
pub mod migrate;
pub mod models;
pub mod osascript;
pub mod profile;
pub mod sources;
pub mod store;
pub mod sync;
pub mod todo_cmd;
pub mod traits;
