//! Catalog schema. Every statement is idempotent so it can run on each open.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY,
    username    TEXT,
    email       TEXT,
    title       TEXT,
    realname    TEXT
);

CREATE TABLE IF NOT EXISTS user_aliases (
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    alias       TEXT NOT NULL,
    PRIMARY KEY (user_id, alias)
);
CREATE INDEX IF NOT EXISTS user_alias_by_alias ON user_aliases (lower(alias));

CREATE TABLE IF NOT EXISTS packages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    arch        TEXT NOT NULL,
    version     TEXT NOT NULL,
    description TEXT,
    url         TEXT,
    pkg_group   TEXT,
    license     TEXT,
    packager    TEXT,
    uploader    TEXT,
    base_name   TEXT,
    file_path   TEXT NOT NULL DEFAULT '',
    build_date  INTEGER,
    size        INTEGER,
    depends     TEXT NOT NULL DEFAULT '[]',
    opt_depends TEXT NOT NULL DEFAULT '[]',
    enabled     INTEGER NOT NULL DEFAULT 1,
    latest      INTEGER NOT NULL DEFAULT 0,
    last_update INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER)),
    flag_date   INTEGER,
    owner       INTEGER REFERENCES users(id) ON DELETE SET NULL
);
CREATE INDEX IF NOT EXISTS package_by_name ON packages (name);
CREATE INDEX IF NOT EXISTS package_by_path ON packages (file_path);
CREATE INDEX IF NOT EXISTS package_by_latest ON packages (latest);
CREATE INDEX IF NOT EXISTS package_by_name_arch_enabled ON packages (name, arch, enabled);
CREATE INDEX IF NOT EXISTS package_by_owner ON packages (owner);
CREATE UNIQUE INDEX IF NOT EXISTS package_by_name_arch_ver ON packages (name, arch, version);
CREATE UNIQUE INDEX IF NOT EXISTS package_one_latest ON packages (name, arch) WHERE latest;

CREATE VIRTUAL TABLE IF NOT EXISTS packages_fts USING fts5(
    name, base_name, description,
    content='packages', content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS packages_fts_insert AFTER INSERT ON packages BEGIN
    INSERT INTO packages_fts (rowid, name, base_name, description)
    VALUES (new.id, new.name, new.base_name, new.description);
END;

CREATE TRIGGER IF NOT EXISTS packages_fts_delete AFTER DELETE ON packages BEGIN
    INSERT INTO packages_fts (packages_fts, rowid, name, base_name, description)
    VALUES ('delete', old.id, old.name, old.base_name, old.description);
END;

CREATE TRIGGER IF NOT EXISTS packages_fts_update AFTER UPDATE OF name, base_name, description ON packages BEGIN
    INSERT INTO packages_fts (packages_fts, rowid, name, base_name, description)
    VALUES ('delete', old.id, old.name, old.base_name, old.description);
    INSERT INTO packages_fts (rowid, name, base_name, description)
    VALUES (new.id, new.name, new.base_name, new.description);
END;
"#;
