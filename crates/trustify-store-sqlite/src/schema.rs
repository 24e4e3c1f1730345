//! SQL schema for the Trustify SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Keyed by the authentication provider's principal id.
CREATE TABLE IF NOT EXISTS users (
    user_id     TEXT PRIMARY KEY,
    email       TEXT,
    name        TEXT NOT NULL,
    role        TEXT NOT NULL DEFAULT 'student',  -- 'student' | 'tutor' | 'admin'
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS applications (
    application_id    TEXT PRIMARY KEY,
    student_id        TEXT NOT NULL,
    student_email     TEXT,
    student_name      TEXT NOT NULL,
    first_name        TEXT NOT NULL,
    last_name         TEXT NOT NULL,
    document_number   TEXT NOT NULL,
    institution       TEXT NOT NULL,
    program           TEXT NOT NULL,
    plant_type        TEXT NOT NULL,
    plant_location    TEXT NOT NULL,
    activities        TEXT NOT NULL,
    start_date        TEXT NOT NULL,   -- YYYY-MM-DD
    end_date          TEXT NOT NULL,
    status            TEXT,            -- NULL reads as 'pending'
    verification_code TEXT NOT NULL UNIQUE,
    created_at        TEXT NOT NULL,   -- RFC 3339 UTC, fixed width
    updated_at        TEXT NOT NULL,
    revision          INTEGER NOT NULL DEFAULT 1,
    review_json       TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS applications_student_idx ON applications(student_id);
CREATE INDEX IF NOT EXISTS applications_created_idx ON applications(created_at);
CREATE INDEX IF NOT EXISTS applications_status_idx  ON applications(status);

-- Identity and provenance columns never change after insert.
CREATE TRIGGER IF NOT EXISTS applications_immutable
BEFORE UPDATE ON applications
WHEN NEW.student_id        IS NOT OLD.student_id
  OR NEW.verification_code IS NOT OLD.verification_code
  OR NEW.created_at        IS NOT OLD.created_at
BEGIN
    SELECT RAISE(ABORT, 'immutable application column');
END;

PRAGMA user_version = 1;
";
