#![deny(missing_docs)]
//! Oxide Relay - Rust implementation
//!
//! A Telegram bot that relays media behind shared links (Instagram reels and
//! posts, TeraBox files) into the chat: the link is classified, resolved to
//! direct fetch locations, streamed to a staging directory and re-uploaded.

/// Telegram bot implementation
pub mod bot;
/// Configuration management
pub mod config;
/// Content acquisition and relay pipeline
pub mod relay;
/// Shared test doubles for the relay pipeline
pub mod testing;
pub mod utils;
