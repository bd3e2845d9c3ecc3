//! SQL schema for the forecast store.
//!
//! Executed once at connection startup and again by
//! [`ensure_schema`](jma_core::store::ForecastStore::ensure_schema). Future
//! migrations will be gated on `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Flattened taxonomy snapshot. Column names follow the upstream document.
CREATE TABLE IF NOT EXISTS area (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    level       TEXT NOT NULL,   -- 'region' | 'office' | 'subdivision10' | ...
    code        TEXT NOT NULL UNIQUE,
    name        TEXT,
    enName      TEXT,
    parent      TEXT,
    children    TEXT,            -- comma-joined child codes or NULL
    officeName  TEXT,
    kana        TEXT
);

CREATE TABLE IF NOT EXISTS publishing_offices (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL UNIQUE,
    code  TEXT
);

-- Areas seen in forecast documents, including observation points.
CREATE TABLE IF NOT EXISTS areas (
    code       TEXT PRIMARY KEY,
    name       TEXT,
    area_type  TEXT              -- area level, NULL outside the taxonomy
);

-- Fact tables. Every timestamp is UTC RFC 3339 with second precision so
-- that text order is time order. report_datetime always holds the newest
-- report seen for the natural key.
CREATE TABLE IF NOT EXISTS weather_forecasts (
    id                    INTEGER PRIMARY KEY,
    publishing_office_id  INTEGER NOT NULL REFERENCES publishing_offices(id),
    report_datetime       TEXT NOT NULL,
    area_code             TEXT NOT NULL REFERENCES areas(code),
    target_datetime       TEXT NOT NULL,
    weather_code          TEXT,
    weather_text          TEXT,
    wind_text             TEXT,
    wave_text             TEXT,
    UNIQUE (publishing_office_id, area_code, target_datetime)
);

CREATE TABLE IF NOT EXISTS precipitation_probability_forecasts (
    id                    INTEGER PRIMARY KEY,
    publishing_office_id  INTEGER NOT NULL REFERENCES publishing_offices(id),
    report_datetime       TEXT NOT NULL,
    area_code             TEXT NOT NULL REFERENCES areas(code),
    target_datetime       TEXT NOT NULL,
    probability           INTEGER,
    UNIQUE (publishing_office_id, area_code, target_datetime)
);

CREATE TABLE IF NOT EXISTS temperature_forecasts (
    id                    INTEGER PRIMARY KEY,
    publishing_office_id  INTEGER NOT NULL REFERENCES publishing_offices(id),
    report_datetime       TEXT NOT NULL,
    area_code             TEXT NOT NULL REFERENCES areas(code),
    target_datetime       TEXT NOT NULL,
    temp_type             TEXT NOT NULL,   -- 'low' | 'high'
    temperature           REAL,
    temperature_upper     REAL,
    temperature_lower     REAL,
    UNIQUE (publishing_office_id, area_code, target_datetime, temp_type)
);

CREATE TABLE IF NOT EXISTS weekly_forecasts (
    id                         INTEGER PRIMARY KEY,
    publishing_office_id       INTEGER NOT NULL REFERENCES publishing_offices(id),
    report_datetime            TEXT NOT NULL,
    area_code                  TEXT NOT NULL REFERENCES areas(code),
    target_date                TEXT NOT NULL,   -- YYYY-MM-DD, local day
    day_start                  TEXT NOT NULL,   -- local midnight, as UTC
    day_end                    TEXT NOT NULL,   -- next local midnight, as UTC
    weather_code               TEXT,
    precipitation_probability  INTEGER,
    reliability                TEXT,
    UNIQUE (publishing_office_id, area_code, target_date)
);

CREATE TABLE IF NOT EXISTS climate_averages (
    id                    INTEGER PRIMARY KEY,
    publishing_office_id  INTEGER NOT NULL REFERENCES publishing_offices(id),
    report_datetime       TEXT NOT NULL,
    area_code             TEXT NOT NULL REFERENCES areas(code),
    type                  TEXT NOT NULL,   -- 'temperature' | 'precipitation'
    min_value             REAL,
    max_value             REAL,
    UNIQUE (publishing_office_id, area_code, type)
);

CREATE INDEX IF NOT EXISTS idx_weather_forecasts_datetime
    ON weather_forecasts(target_datetime);
CREATE INDEX IF NOT EXISTS idx_precipitation_forecasts_datetime
    ON precipitation_probability_forecasts(target_datetime);
CREATE INDEX IF NOT EXISTS idx_temperature_forecasts_datetime
    ON temperature_forecasts(target_datetime);
CREATE INDEX IF NOT EXISTS idx_weekly_forecasts_day
    ON weekly_forecasts(day_start);
CREATE INDEX IF NOT EXISTS idx_climate_averages_report
    ON climate_averages(report_datetime);

PRAGMA user_version = 1;
";
