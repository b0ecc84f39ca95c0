//! Database schema definitions.

/// SQL schema for the channel database.
pub const SCHEMA_SQL: &str = r#"
-- Satellite and LNB settings, one row per scanned satellite
CREATE TABLE IF NOT EXISTS sat_paras (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    lnb_num INTEGER DEFAULT 0,
    lof_lo INTEGER NOT NULL,              -- kHz
    lof_hi INTEGER NOT NULL,              -- kHz
    lof_threshold INTEGER NOT NULL,       -- kHz
    voltage TEXT,
    tone_22k TEXT,
    diseqc_committed INTEGER,
    diseqc_uncommitted INTEGER,
    motor_num INTEGER DEFAULT 0,
    position INTEGER DEFAULT 0,
    longitude REAL DEFAULT 0,             -- degrees, east positive
    unicable_user_band INTEGER,
    unicable_band_freq INTEGER,           -- MHz
    created_at INTEGER DEFAULT (strftime('%s', 'now'))
);

-- Locked transponders (analog carriers included)
CREATE TABLE IF NOT EXISTS transponders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source INTEGER NOT NULL,              -- SourceKind code (0=analog, 1=cable, 2=terrestrial, 3=satellite, 4=atsc)
    frequency INTEGER NOT NULL,           -- Hz, kHz for satellite
    polarisation INTEGER NOT NULL DEFAULT -1,
    sat_para_id INTEGER,
    tune_params TEXT NOT NULL,            -- JSON encoded TuneParams
    transport_stream_id INTEGER,
    original_network_id INTEGER,
    snr INTEGER,
    ber INTEGER,
    strength INTEGER,
    created_at INTEGER DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER DEFAULT (strftime('%s', 'now')),
    FOREIGN KEY(sat_para_id) REFERENCES sat_paras(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_transponders_source ON transponders(source, frequency);

-- Services found on a transponder
CREATE TABLE IF NOT EXISTS services (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    transponder_id INTEGER NOT NULL,
    source INTEGER NOT NULL,
    sat_para_id INTEGER,
    service_id INTEGER NOT NULL,
    name TEXT,
    service_type INTEGER NOT NULL,        -- ServiceType code (1=TV, 2=radio, 3=analog)
    video_pid INTEGER DEFAULT 8191,
    video_format TEXT,
    pcr_pid INTEGER DEFAULT 8191,
    scrambled INTEGER DEFAULT 0,
    free_ca INTEGER DEFAULT 1,
    eit_schedule INTEGER DEFAULT 0,
    eit_present_following INTEGER DEFAULT 0,
    running_status INTEGER DEFAULT 0,
    -- ATSC virtual channel
    major INTEGER,
    minor INTEGER,
    access_controlled INTEGER DEFAULT 0,
    hidden INTEGER DEFAULT 0,
    hide_guide INTEGER DEFAULT 0,
    source_id INTEGER,
    -- Numbering
    lcn INTEGER,                          -- Resolved logical channel number
    sd_lcn INTEGER,
    hd_lcn INTEGER,
    skip INTEGER DEFAULT 0,               -- Not visible in the channel list
    default_chan_num INTEGER DEFAULT -1,
    chan_num INTEGER DEFAULT -1,
    chan_order INTEGER DEFAULT 0,
    created_at INTEGER DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER DEFAULT (strftime('%s', 'now')),
    UNIQUE(transponder_id, service_id),
    FOREIGN KEY(transponder_id) REFERENCES transponders(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_services_source ON services(source, chan_num);

CREATE TABLE IF NOT EXISTS service_audios (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    service_ref INTEGER NOT NULL,
    pid INTEGER NOT NULL,
    format TEXT,
    language TEXT,
    FOREIGN KEY(service_ref) REFERENCES services(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS service_subtitles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    service_ref INTEGER NOT NULL,
    pid INTEGER NOT NULL,
    language TEXT,
    subtitling_type INTEGER,
    composition_page INTEGER,
    ancillary_page INTEGER,
    FOREIGN KEY(service_ref) REFERENCES services(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS service_teletexts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    service_ref INTEGER NOT NULL,
    pid INTEGER NOT NULL,
    language TEXT,
    teletext_type INTEGER,
    magazine INTEGER,
    page INTEGER,
    FOREIGN KEY(service_ref) REFERENCES services(id) ON DELETE CASCADE
);

-- Scan history table
CREATE TABLE IF NOT EXISTS scan_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source INTEGER NOT NULL,              -- Digital source, 0 for analog-only scans
    scan_time INTEGER DEFAULT (strftime('%s', 'now')),
    end_code TEXT NOT NULL,
    transponder_count INTEGER,
    service_count INTEGER
);
"#;
