// crates/vigil-store/src/audit.rs
// ============================================================================
// Module: Audit Repository
// Description: Append-only audit event SQL with idempotent inserts.
// Purpose: Persist audit events exactly once and page them for review.
// Dependencies: base64, postgres, vigil-core
// ============================================================================

//! ## Overview
//! Audit writes insert with `ON CONFLICT (event_id) DO NOTHING`, so caller
//! retries and spool replays collapse to one row. No update or delete
//! surface exists; retention purges are the single exception and refuse any
//! cutoff newer than the seven-year policy horizon.
//!
//! ## Invariants
//! - `write_event` is idempotent by `event_id`.
//! - Query order is `(created_at DESC, id DESC)` with an opaque keyset
//!   cursor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use postgres::Row;
use postgres::Transaction;
use time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use vigil_core::AuditEvent;
use vigil_core::AuditEventId;
use vigil_core::AuditResult;
use vigil_core::TenantId;
use vigil_core::UserId;

use crate::store::PgStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum records one export streams.
pub const EXPORT_RECORD_CAP: usize = 100_000;

/// Retention horizon: purges must be at least this far in the past.
pub const RETENTION_YEARS: i64 = 7;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps an audit row into its domain shape, returning the keyset id too.
fn audit_from_row(row: &Row) -> Result<(i64, AuditEvent), PgStoreError> {
    let result_text: String = row.try_get("result")?;
    let result = match result_text.as_str() {
        "success" => AuditResult::Success,
        "failure" => AuditResult::Failure,
        other => return Err(PgStoreError::Corrupt(format!("audit result {other:?}"))),
    };
    let keyset_id: i64 = row.try_get("id")?;
    Ok((
        keyset_id,
        AuditEvent {
            event_id: AuditEventId::new(row.try_get::<_, Uuid>("event_id")?),
            tenant_id: TenantId::new(row.try_get::<_, Uuid>("tenant_id")?),
            actor_user_id: row.try_get::<_, Option<Uuid>>("actor_user_id")?.map(UserId::new),
            action: row.try_get("action")?,
            target_type: row.try_get("target_type")?,
            target_id: row.try_get("target_id")?,
            result,
            reason_code: row.try_get("reason_code")?,
            request_id: row.try_get("request_id")?,
            client_ip: row.try_get("client_ip")?,
            user_agent: row.try_get("user_agent")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        },
    ))
}

/// Audit columns shared by every select.
const AUDIT_COLUMNS: &str = "id, event_id, tenant_id, actor_user_id, action, target_type, \
                             target_id, result, reason_code, request_id, client_ip, \
                             user_agent, metadata, created_at";

// ============================================================================
// SECTION: Writes
// ============================================================================

/// Inserts an audit event idempotently. Returns true when a row was
/// written, false when the `event_id` already existed.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn write_event(tx: &mut Transaction<'_>, event: &AuditEvent) -> Result<bool, PgStoreError> {
    let result = match event.result {
        AuditResult::Success => "success",
        AuditResult::Failure => "failure",
    };
    let inserted = tx.execute(
        "INSERT INTO audit_events (event_id, tenant_id, actor_user_id, action, target_type, \
         target_id, result, reason_code, request_id, client_ip, user_agent, metadata, \
         created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         ON CONFLICT (event_id) DO NOTHING",
        &[
            &event.event_id.as_uuid(),
            &event.tenant_id.as_uuid(),
            &event.actor_user_id.map(|id| id.as_uuid()),
            &event.action,
            &event.target_type,
            &event.target_id,
            &result,
            &event.reason_code,
            &event.request_id,
            &event.client_ip,
            &event.user_agent,
            &event.metadata,
            &event.created_at,
        ],
    )?;
    Ok(inserted > 0)
}

// ============================================================================
// SECTION: Cursors
// ============================================================================

/// Decoded keyset cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditCursor {
    /// `created_at` of the last row seen, as unix nanoseconds.
    pub created_at_nanos: i128,
    /// Keyset id of the last row seen.
    pub id: i64,
}

/// Encodes a cursor into its opaque URL-safe form.
#[must_use]
pub fn encode_cursor(cursor: AuditCursor) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}:{}", cursor.created_at_nanos, cursor.id))
}

/// Decodes an opaque cursor.
///
/// # Errors
///
/// Returns [`PgStoreError::Corrupt`] for malformed cursors.
pub fn decode_cursor(encoded: &str) -> Result<AuditCursor, PgStoreError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded.as_bytes())
        .map_err(|_| PgStoreError::Corrupt("audit cursor".to_string()))?;
    let text =
        String::from_utf8(bytes).map_err(|_| PgStoreError::Corrupt("audit cursor".to_string()))?;
    let Some((nanos, id)) = text.split_once(':') else {
        return Err(PgStoreError::Corrupt("audit cursor".to_string()));
    };
    Ok(AuditCursor {
        created_at_nanos: nanos
            .parse()
            .map_err(|_| PgStoreError::Corrupt("audit cursor".to_string()))?,
        id: id.parse().map_err(|_| PgStoreError::Corrupt("audit cursor".to_string()))?,
    })
}

// ============================================================================
// SECTION: Query / Export
// ============================================================================

/// One page of audit events with the continuation cursor.
#[derive(Debug, Clone)]
pub struct AuditPage {
    /// Events in `(created_at DESC, id DESC)` order.
    pub events: Vec<AuditEvent>,
    /// Cursor for the next page; absent when exhausted.
    pub next_cursor: Option<String>,
}

/// Pages audit events for the bound tenant.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn query_events(
    tx: &mut Transaction<'_>,
    cursor: Option<&str>,
    limit: i64,
) -> Result<AuditPage, PgStoreError> {
    let limit = limit.clamp(1, 500);
    let rows = match cursor.map(decode_cursor).transpose()? {
        Some(cursor) => {
            let boundary = OffsetDateTime::from_unix_timestamp_nanos(cursor.created_at_nanos)
                .map_err(|_| PgStoreError::Corrupt("audit cursor".to_string()))?;
            let sql = format!(
                "SELECT {AUDIT_COLUMNS} FROM audit_events \
                 WHERE (created_at, id) < ($1, $2) \
                 ORDER BY created_at DESC, id DESC LIMIT $3"
            );
            tx.query(sql.as_str(), &[&boundary, &cursor.id, &limit])?
        }
        None => {
            let sql = format!(
                "SELECT {AUDIT_COLUMNS} FROM audit_events \
                 ORDER BY created_at DESC, id DESC LIMIT $1"
            );
            tx.query(sql.as_str(), &[&limit])?
        }
    };
    let mut events = Vec::with_capacity(rows.len());
    let mut last: Option<AuditCursor> = None;
    for row in &rows {
        let (keyset_id, event) = audit_from_row(row)?;
        last = Some(AuditCursor {
            created_at_nanos: event.created_at.unix_timestamp_nanos(),
            id: keyset_id,
        });
        events.push(event);
    }
    let next_cursor = if events.len() == usize::try_from(limit).unwrap_or(usize::MAX) {
        last.map(encode_cursor)
    } else {
        None
    };
    Ok(AuditPage {
        events,
        next_cursor,
    })
}

/// Streams up to [`EXPORT_RECORD_CAP`] events through the callback.
///
/// # Errors
///
/// Returns [`PgStoreError`] when a statement fails; callback errors abort
/// the export.
pub fn export_events(
    tx: &mut Transaction<'_>,
    mut emit: impl FnMut(&AuditEvent) -> Result<(), PgStoreError>,
) -> Result<usize, PgStoreError> {
    let mut cursor: Option<String> = None;
    let mut total = 0_usize;
    loop {
        let page = query_events(tx, cursor.as_deref(), 500)?;
        for event in &page.events {
            if total >= EXPORT_RECORD_CAP {
                return Ok(total);
            }
            emit(event)?;
            total += 1;
        }
        match page.next_cursor {
            Some(next) if total < EXPORT_RECORD_CAP => cursor = Some(next),
            _ => return Ok(total),
        }
    }
}

/// Purges events older than the cutoff, enforcing the retention policy.
///
/// # Errors
///
/// Returns [`PgStoreError::Conflict`] when the cutoff is newer than the
/// seven-year horizon.
pub fn purge_before(
    tx: &mut Transaction<'_>,
    cutoff: OffsetDateTime,
    now: OffsetDateTime,
) -> Result<u64, PgStoreError> {
    let horizon = now - Duration::days(RETENTION_YEARS * 365);
    if cutoff > horizon {
        return Err(PgStoreError::Conflict(
            "audit purge cutoff violates retention policy".to_string(),
        ));
    }
    let deleted = tx.execute("DELETE FROM audit_events WHERE created_at < $1", &[&cutoff])?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    #[test]
    fn cursor_round_trips() {
        let cursor = AuditCursor {
            created_at_nanos: 1_750_000_000_123_456_789,
            id: 42,
        };
        let encoded = encode_cursor(cursor);
        assert_eq!(decode_cursor(&encoded).unwrap(), cursor);
    }

    #[test]
    fn malformed_cursor_is_rejected() {
        assert!(decode_cursor("not base64!").is_err());
        let encoded = URL_SAFE_NO_PAD.encode("missing-separator");
        assert!(decode_cursor(&encoded).is_err());
    }
}
