//! TV guide: XMLTV to JSON conversion and the timeline shown by the client

pub mod categories;
pub mod config;
pub mod convert;
pub mod epg;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod models;
pub mod selection;
pub mod source;
pub mod store;
pub mod time;

pub use error::{GuideError, Result};
