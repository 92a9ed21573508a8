//! Performance metric repository: observed service-call samples.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::columns::{self, Metadata};
use super::{validate, Database, DatabaseError};

const COLUMNS: &str = "id, service_name, endpoint, response_time, status_code, timestamp, metadata";

/// One observed service call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetric {
    pub id: i64,
    pub service_name: String,
    pub endpoint: String,
    /// Response time in seconds.
    pub response_time: f64,
    pub status_code: u16,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<Metadata>,
}

impl PerformanceMetric {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            service_name: row.get(1)?,
            endpoint: row.get(2)?,
            response_time: row.get(3)?,
            status_code: row.get(4)?,
            timestamp: columns::timestamp_at(row, 5)?,
            metadata: columns::json_at(row, 6)?,
        })
    }
}

/// Input for [`record`].
#[derive(Debug, Clone)]
pub struct PerformanceSample {
    pub service_name: String,
    pub endpoint: String,
    pub response_time: f64,
    pub status_code: u16,
    pub metadata: Option<Metadata>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl PerformanceSample {
    pub fn new(
        service_name: impl Into<String>,
        endpoint: impl Into<String>,
        response_time: f64,
        status_code: u16,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            endpoint: endpoint.into(),
            response_time,
            status_code,
            metadata: None,
            timestamp: None,
        }
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), DatabaseError> {
        validate::non_blank("service_name", &self.service_name)?;
        validate::non_blank("endpoint", &self.endpoint)?;
        validate::non_negative("response_time", self.response_time)
    }
}

fn insert(conn: &Connection, sample: &PerformanceSample) -> Result<PerformanceMetric, DatabaseError> {
    let timestamp = sample
        .timestamp
        .map(columns::truncate)
        .unwrap_or_else(columns::now);
    conn.execute(
        "INSERT INTO performance_metrics (service_name, endpoint, response_time, status_code,
         timestamp, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            sample.service_name,
            sample.endpoint,
            sample.response_time,
            sample.status_code,
            columns::encode_timestamp(&timestamp),
            columns::encode_json(sample.metadata.as_ref())?,
        ],
    )?;
    Ok(PerformanceMetric {
        id: conn.last_insert_rowid(),
        service_name: sample.service_name.clone(),
        endpoint: sample.endpoint.clone(),
        response_time: sample.response_time,
        status_code: sample.status_code,
        timestamp,
        metadata: sample.metadata.clone(),
    })
}

/// Records a single sample.
pub fn record(db: &Database, sample: &PerformanceSample) -> Result<PerformanceMetric, DatabaseError> {
    sample.validate()?;
    db.with_conn(|conn| insert(conn, sample))
}

/// Records many samples in one transaction. Nothing is written if any
/// sample is invalid.
pub fn record_batch(db: &Database, samples: &[PerformanceSample]) -> Result<usize, DatabaseError> {
    for sample in samples {
        sample.validate()?;
    }
    db.with_tx(|tx| {
        for sample in samples {
            insert(tx, sample)?;
        }
        Ok(samples.len())
    })
}

/// Query filter parameters for sample listing.
#[derive(Debug, Default, Clone)]
pub struct PerformanceFilter {
    pub service_name: Option<String>,
    pub endpoint: Option<String>,
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

/// Queries samples in timestamp order (oldest first).
pub fn query(db: &Database, filter: &PerformanceFilter) -> Result<Vec<PerformanceMetric>, DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref service) = filter.service_name {
            conditions.push(format!("service_name = ?{}", param_values.len() + 1));
            param_values.push(Box::new(service.clone()));
        }
        if let Some(ref endpoint) = filter.endpoint {
            conditions.push(format!("endpoint = ?{}", param_values.len() + 1));
            param_values.push(Box::new(endpoint.clone()));
        }
        if let Some(ref from) = filter.from {
            conditions.push(format!("timestamp >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(columns::encode_timestamp(from)));
        }
        if let Some(ref to) = filter.to {
            conditions.push(format!("timestamp < ?{}", param_values.len() + 1));
            param_values.push(Box::new(columns::encode_timestamp(to)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        // SQLite treats a negative LIMIT as unbounded.
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        param_values.push(Box::new(limit));
        let sql = format!(
            "SELECT {} FROM performance_metrics {} ORDER BY timestamp ASC, id ASC LIMIT ?{}",
            COLUMNS,
            where_clause,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), PerformanceMetric::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Per-endpoint aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStat {
    pub endpoint: String,
    pub count: u64,
    pub avg_time: f64,
}

/// Aggregate over one service's samples since a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStats {
    pub service_name: String,
    pub since: DateTime<Utc>,
    pub total_requests: u64,
    pub avg_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    pub status_codes: BTreeMap<u16, u64>,
    pub endpoints: Vec<EndpointStat>,
}

/// Returns request count, latency and status breakdown for a service.
pub fn service_stats(
    db: &Database,
    service_name: &str,
    since: DateTime<Utc>,
) -> Result<ServiceStats, DatabaseError> {
    let since_raw = columns::encode_timestamp(&since);
    db.with_conn(|conn| {
        let (total_requests, avg, min, max): (u64, f64, f64, f64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(AVG(response_time), 0), COALESCE(MIN(response_time), 0),
             COALESCE(MAX(response_time), 0)
             FROM performance_metrics WHERE service_name = ?1 AND timestamp >= ?2",
            params![service_name, since_raw],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )?;

        let mut stmt = conn.prepare(
            "SELECT status_code, COUNT(*) FROM performance_metrics
             WHERE service_name = ?1 AND timestamp >= ?2
             GROUP BY status_code",
        )?;
        let status_codes = stmt
            .query_map(params![service_name, since_raw], |r| {
                Ok((r.get::<_, u16>(0)?, r.get::<_, u64>(1)?))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT endpoint, COUNT(*), AVG(response_time) FROM performance_metrics
             WHERE service_name = ?1 AND timestamp >= ?2
             GROUP BY endpoint ORDER BY COUNT(*) DESC, endpoint ASC",
        )?;
        let endpoints = stmt
            .query_map(params![service_name, since_raw], |r| {
                Ok(EndpointStat {
                    endpoint: r.get(0)?,
                    count: r.get(1)?,
                    avg_time: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ServiceStats {
            service_name: service_name.to_string(),
            since,
            total_requests,
            avg_response_time: avg,
            min_response_time: min,
            max_response_time: max,
            status_codes,
            endpoints,
        })
    })
}

/// Removes samples recorded strictly before `cutoff`. Returns the number
/// of rows deleted.
pub fn delete_older_than(db: &Database, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError> {
    let removed = db.with_conn(|conn| {
        Ok(conn.execute(
            "DELETE FROM performance_metrics WHERE timestamp < ?1",
            params![columns::encode_timestamp(&cutoff)],
        )?)
    })?;

    log::info!(
        "Pruned {} performance samples older than {}",
        removed,
        columns::encode_timestamp(&cutoff)
    );
    Ok(removed as u64)
}
