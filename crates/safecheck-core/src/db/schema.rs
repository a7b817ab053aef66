pub(super) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS app_user (
    id                  TEXT PRIMARY KEY,
    role                TEXT NOT NULL,
    first_name          TEXT NOT NULL,
    last_name           TEXT NOT NULL,
    phone               TEXT,
    email               TEXT,
    backup_contact_ids  TEXT NOT NULL DEFAULT '[]',
    worker_ids          TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS shift (
    id                          TEXT PRIMARY KEY,
    worker_id                   TEXT NOT NULL,
    location_id                 TEXT NOT NULL,
    status                      TEXT NOT NULL,
    start_time                  INTEGER NOT NULL,
    end_time                    INTEGER,
    estimated_end_time          INTEGER NOT NULL,
    check_in_interval_minutes   INTEGER
);

-- At most one active shift per worker.
CREATE UNIQUE INDEX IF NOT EXISTS shift_one_active_per_worker
    ON shift(worker_id) WHERE status = 'active';

CREATE TABLE IF NOT EXISTS check_in (
    id                  TEXT PRIMARY KEY,
    shift_id            TEXT NOT NULL,
    worker_id           TEXT NOT NULL,
    scheduled_time      INTEGER NOT NULL,
    response_time       INTEGER,
    status              TEXT NOT NULL,
    response_seconds    INTEGER
);

CREATE INDEX IF NOT EXISTS check_in_status_idx ON check_in(status, scheduled_time);
CREATE INDEX IF NOT EXISTS check_in_shift_idx ON check_in(shift_id);

CREATE TABLE IF NOT EXISTS alert (
    id                  TEXT PRIMARY KEY,
    shift_id            TEXT,
    worker_id           TEXT NOT NULL,
    backup_contact_id   TEXT,
    type                TEXT NOT NULL,
    severity            TEXT NOT NULL,
    status              TEXT NOT NULL,
    message             TEXT NOT NULL,
    created_at          INTEGER NOT NULL,
    acknowledged_at     INTEGER,
    acknowledged_by     TEXT,
    resolved_at         INTEGER,
    resolved_by         TEXT,
    escalated_to_index  INTEGER NOT NULL DEFAULT 0,
    last_escalated_at   INTEGER
);

CREATE INDEX IF NOT EXISTS alert_status_idx ON alert(status, created_at);
CREATE INDEX IF NOT EXISTS alert_worker_idx ON alert(worker_id);

CREATE TABLE IF NOT EXISTS notification (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    type        TEXT NOT NULL,
    title       TEXT NOT NULL,
    message     TEXT NOT NULL,
    is_read     INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL,
    action_url  TEXT
);

CREATE INDEX IF NOT EXISTS notification_user_idx ON notification(user_id, created_at);

CREATE TABLE IF NOT EXISTS system_settings (
    id                          INTEGER PRIMARY KEY CHECK (id = 1),
    check_in_interval_minutes   INTEGER NOT NULL,
    response_timeout_seconds    INTEGER NOT NULL,
    escalation_delay_minutes    INTEGER NOT NULL,
    enable_sms_notifications    INTEGER NOT NULL,
    enable_email_notifications  INTEGER NOT NULL,
    enable_push_notifications   INTEGER NOT NULL,
    updated_at                  INTEGER NOT NULL,
    updated_by                  TEXT
);
"#;
