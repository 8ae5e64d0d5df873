//! Conversions from external infrastructure errors into port errors.
//!
//! Neither side of these conversions is defined in this crate, so they are
//! expressed as extension traits instead of `From` impls.

use clinicdesk_common::cache::StoreError;
use clinicdesk_core::TransportError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Map a reqwest failure onto the transport port
pub trait IntoTransportError {
    fn into_transport(self) -> TransportError;
}

/// Map a SQLite failure onto the persistent tier port
pub trait IntoStoreError {
    fn into_store(self) -> StoreError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TransportError */
/* -------------------------------------------------------------------------- */

impl IntoTransportError for HttpError {
    fn into_transport(self) -> TransportError {
        if self.is_timeout() {
            return TransportError::Timeout { message: self.to_string() };
        }

        if self.is_builder() {
            return TransportError::InvalidRequest { message: self.to_string() };
        }

        // Connect, request, body and decode failures all mean the response
        // never fully arrived
        TransportError::Network { message: self.to_string() }
    }
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → StoreError */
/* -------------------------------------------------------------------------- */

impl IntoStoreError for SqlError {
    fn into_store(self) -> StoreError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        let message = match self {
            RE::SqliteFailure(err, maybe_message) => match err.code {
                ErrorCode::DatabaseBusy => "database is busy".to_string(),
                ErrorCode::DatabaseLocked => "database is locked".to_string(),
                ErrorCode::ReadOnly => "database is read-only".to_string(),
                ErrorCode::DiskFull => "disk is full".to_string(),
                _ => format!(
                    "sqlite failure {:?} (code {}): {}",
                    err.code,
                    err.extended_code,
                    maybe_message.unwrap_or_default()
                ),
            },
            RE::InvalidPath(path) => {
                format!("invalid database path: {}", path.to_string_lossy())
            }
            other => other.to_string(),
        };

        StoreError::Unavailable { message }
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
