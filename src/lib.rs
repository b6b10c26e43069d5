//! Channel archiver library.
//!
//! Archives a channel's videos by downloading them with yt-dlp and
//! re-uploading them to the Internet Archive, tracking per-item progress in
//! a shared record store so that runs are resumable and idempotent.

pub mod archiver;
pub mod config;
pub mod constants;
pub mod ia;
pub mod store;
