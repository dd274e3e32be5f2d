#![doc = "slack-assets-core: core ingestion pipeline for slack-assets-bot."]

//! This crate contains the chat- and host-agnostic logic of the asset bot:
//! turning one uploaded zip archive into a new branch, a single commit and a
//! pull request, and reporting the outcome back through the message system.
//!
//! Concrete Slack and GitHub bindings live in the `slack-assets-bot` crate and
//! plug in through the traits in [`contract`].
//!
//! # Pipeline
//! [`ingest::AssetIngestor`] drives, strictly in sequence:
//! validate → [`contract::MessageSystem::download_file`] → [`archive::extract`]
//! → [`commit::CommitBuilder::create_commit`]
//! → [`publish::PullRequestPublisher::create_pull_request`] → notify.
//!
//! Scratch files are removed on every exit path.

pub mod archive;
pub mod commit;
pub mod config;
pub mod contract;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod model;
pub mod publish;
