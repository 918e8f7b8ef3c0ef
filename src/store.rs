use crate::delay::ReconcilePlan;
use crate::types::{DelayedTrip, PositionSample, ScheduleStop, WindowRow};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;

/// Access to the shared relational store. Position samples and the
/// delayed-trip table are owned here; the schedule reference tables
/// (`stop_times`, `station_routes`) belong to the schedule importer and are
/// only read.
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Create the tables this service owns.
    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vehicle_positions (
                sample_id UUID PRIMARY KEY,
                entity_id TEXT NOT NULL,
                trip_id TEXT NOT NULL,
                route_id TEXT NOT NULL,
                schedule_relationship INTEGER NOT NULL,
                latitude DOUBLE PRECISION,
                longitude DOUBLE PRECISION,
                vehicle_id TEXT,
                label TEXT,
                retrieved_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vehicle_positions_retrieved_at \
             ON vehicle_positions (retrieved_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS delay_trips (
                trip_id TEXT PRIMARY KEY,
                route_name TEXT,
                trip_start TIME NOT NULL,
                trip_end TIME NOT NULL,
                active BOOLEAN NOT NULL,
                map_link TEXT,
                idle_minutes INTEGER NOT NULL,
                is_idle BOOLEAN NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Append one poll's samples. All rows land or none do.
    pub async fn insert_samples(&self, samples: &[PositionSample]) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for sample in samples {
            inserted += sqlx::query(
                r#"
                INSERT INTO vehicle_positions (
                    sample_id, entity_id, trip_id, route_id, schedule_relationship,
                    latitude, longitude, vehicle_id, label, retrieved_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(sample.sample_id)
            .bind(&sample.entity_id)
            .bind(&sample.trip_id)
            .bind(&sample.route_id)
            .bind(sample.schedule_relationship)
            .bind(sample.latitude)
            .bind(sample.longitude)
            .bind(&sample.vehicle_id)
            .bind(&sample.label)
            .bind(sample.retrieved_at)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Samples newer than the cutoff, joined against route metadata and
    /// limited to short route names with the given prefix. Ordered so that a
    /// trip's newest sample comes first within its route.
    pub async fn window_rows(
        &self,
        cutoff: DateTime<Utc>,
        route_prefix: &str,
    ) -> Result<Vec<WindowRow>, sqlx::Error> {
        sqlx::query_as::<_, WindowRow>(
            r#"
            SELECT vp.sample_id, vp.entity_id, vp.trip_id, vp.route_id,
                   vp.schedule_relationship, vp.latitude, vp.longitude,
                   vp.vehicle_id, vp.label, vp.retrieved_at,
                   sr.route_short_name, sr.route_long_name, sr.route_color
            FROM vehicle_positions vp
            JOIN station_routes sr
                ON TRIM(LOWER(vp.route_id)) = TRIM(LOWER(sr.route_id))
            WHERE vp.retrieved_at > $1
              AND sr.route_short_name LIKE $2
            ORDER BY sr.route_short_name, vp.trip_id, vp.retrieved_at DESC
            "#,
        )
        .bind(cutoff)
        .bind(format!("{route_prefix}%"))
        .fetch_all(&self.pool)
        .await
    }

    /// Final scheduled stop (highest stop_sequence) for each of the given
    /// trips. Trips without schedule rows are simply absent from the result.
    pub async fn final_stops(
        &self,
        trip_ids: &[String],
    ) -> Result<HashMap<String, ScheduleStop>, sqlx::Error> {
        if trip_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let stops = sqlx::query_as::<_, ScheduleStop>(
            r#"
            SELECT DISTINCT ON (trip_id)
                   trip_id, stop_sequence, arrival_time, departure_time
            FROM stop_times
            WHERE trip_id = ANY($1)
            ORDER BY trip_id, stop_sequence DESC
            "#,
        )
        .bind(trip_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(stops
            .into_iter()
            .map(|stop| (stop.trip_id.clone(), stop))
            .collect())
    }

    pub async fn delayed_trip_ids(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT trip_id FROM delay_trips")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn delayed_trips(&self) -> Result<Vec<DelayedTrip>, sqlx::Error> {
        sqlx::query_as::<_, DelayedTrip>(
            "SELECT trip_id, route_name, trip_start, trip_end, active, \
             map_link, idle_minutes, is_idle \
             FROM delay_trips ORDER BY trip_id",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Apply one cycle's reconciliation plan in a single transaction: insert
    /// newly stalled trips at one idle minute, bump continuing ones, then
    /// flag and remove the trips that did not come back stalled. Any failure
    /// rolls the whole cycle back.
    pub async fn apply_reconciliation(&self, plan: &ReconcilePlan) -> Result<(), sqlx::Error> {
        if plan.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;

        for draft in &plan.inserts {
            sqlx::query(
                r#"
                INSERT INTO delay_trips (
                    trip_id, route_name, trip_start, trip_end, active,
                    map_link, idle_minutes, is_idle
                ) VALUES ($1, $2, $3, $4, TRUE, $5, 1, TRUE)
                ON CONFLICT (trip_id) DO NOTHING
                "#,
            )
            .bind(&draft.trip_id)
            .bind(&draft.route_name)
            .bind(draft.trip_start)
            .bind(draft.trip_end)
            .bind(&draft.map_link)
            .execute(&mut *tx)
            .await?;
        }

        if !plan.increments.is_empty() {
            sqlx::query(
                "UPDATE delay_trips \
                 SET idle_minutes = idle_minutes + 1, is_idle = TRUE \
                 WHERE trip_id = ANY($1)",
            )
            .bind(&plan.increments)
            .execute(&mut *tx)
            .await?;
        }

        if !plan.deletes.is_empty() {
            sqlx::query("UPDATE delay_trips SET is_idle = FALSE WHERE trip_id = ANY($1)")
                .bind(&plan.deletes)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM delay_trips WHERE trip_id = ANY($1) AND is_idle = FALSE")
                .bind(&plan.deletes)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await
    }
}
