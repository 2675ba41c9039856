//! # sgsync - Security-Group Allowlist Synchronizer
//!
//! Keeps an AWS security group's inbound allowlist in step with a published
//! IP-range feed, so only currently valid external ranges are permitted
//! while a limited rule quota is conserved.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        sgsync                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: sync, feed, rules, version                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml)                                        │
//! │    └── Feed, firewall target, ceiling, Slack destination    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Feed (reqwest + rustls)                                    │
//! │    └── Published JSON range feed, service/direction filter  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Canonicalizer + Differ + Quota guard (ipnet)               │
//! │    └── Minimal disjoint CIDR set, add/remove delta          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Firewall store (FirewallStore trait)                       │
//! │    └── Ec2SecurityGroup (aws-sdk-ec2)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Notifier (Slack chat.postMessage)                          │
//! │    └── One outcome summary per run                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A run is stateless: it re-fetches the feed and re-reads the group every
//! time, computes the minimal delta, and applies it removals-first. Every
//! mutation is idempotent at the store boundary, so a failed run is simply
//! retried by the next scheduled invocation.
//!
//! ## Example
//!
//! ```no_run
//! use sgsync::config::Config;
//! use sgsync::feed::HttpFeed;
//! use sgsync::firewall::Ec2SecurityGroup;
//! use sgsync::notify::NoopNotifier;
//! use sgsync::reconciler::{Reconciler, SyncSettings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/sgsync/config.yaml")?;
//!     let feed = HttpFeed::new(&config.feed.url)?;
//!     let store = Ec2SecurityGroup::connect(
//!         &config.firewall.region,
//!         &config.firewall.group_id,
//!         config.firewall.port,
//!         &config.firewall.description,
//!     )
//!     .await;
//!
//!     let settings = SyncSettings {
//!         service: config.feed.service.clone(),
//!         direction: config.feed.direction.clone(),
//!         target: config.firewall.group_id.clone(),
//!         rule_ceiling: config.firewall.rule_ceiling,
//!         dry_run: config.dry_run,
//!         context: config.context.resolve(),
//!     };
//!     let summary = Reconciler::new(&feed, &store, &NoopNotifier, settings)
//!         .run()
//!         .await;
//!     println!("{}", summary.render_text());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`canon`] - CIDR parsing, deduplication, and collapse
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`diff`] - Desired/current rule-set difference
//! - [`exit`] - Process exit code contract
//! - [`feed`] - HTTP feed source
//! - [`firewall`] - Security-group store (aws-sdk-ec2)
//! - [`lock`] - File locking against overlapping runs
//! - [`notify`] - Slack outcome delivery
//! - [`quota`] - Rule-count ceiling enforcement
//! - [`reconciler`] - The fetch/diff/guard/apply/report pipeline
//! - [`summary`] - Outcome summary types and rendering

pub mod canon;
pub mod cli;
pub mod commands;
pub mod config;
pub mod diff;
pub mod exit;
pub mod feed;
pub mod firewall;
pub mod lock;
pub mod notify;
pub mod quota;
pub mod reconciler;
pub mod summary;

pub use cli::{Cli, Commands};
pub use config::Config;
