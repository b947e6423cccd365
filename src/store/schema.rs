//! Relational schema for the reconciled catalog
//!
//! Seven domain tables plus the crawl-state marker. Cascade rules follow
//! the compound downward (links, concentrations, references) while a food
//! category deletion only nulls the category reference on its foods.

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS food_category (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS food (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    category_id INTEGER REFERENCES food_category (id) ON DELETE SET NULL,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS compound_class (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS compound (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    class_id INTEGER REFERENCES compound_class (id) ON DELETE CASCADE,
    name TEXT NOT NULL UNIQUE,
    hmdb_id TEXT UNIQUE,
    foodb_id TEXT UNIQUE
);

CREATE TABLE IF NOT EXISTS food_compounds (
    compound_id INTEGER NOT NULL REFERENCES compound (id) ON DELETE CASCADE,
    food_id INTEGER NOT NULL REFERENCES food (id) ON DELETE CASCADE,
    average_value REAL,
    max_value REAL,
    min_value REAL,
    PRIMARY KEY (compound_id, food_id)
);

CREATE TABLE IF NOT EXISTS biospecimen (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS compound_biospecimens (
    compound_id INTEGER NOT NULL REFERENCES compound (id) ON DELETE CASCADE,
    biospecimen_id INTEGER NOT NULL REFERENCES biospecimen (id) ON DELETE CASCADE,
    PRIMARY KEY (compound_id, biospecimen_id)
);

CREATE TABLE IF NOT EXISTS concentration (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    compound_id INTEGER NOT NULL REFERENCES compound (id) ON DELETE CASCADE,
    biospecimen_id INTEGER NOT NULL REFERENCES biospecimen (id) ON DELETE CASCADE,
    value TEXT NOT NULL,
    units TEXT NOT NULL,
    age TEXT,
    sex TEXT,
    condition TEXT,
    comment TEXT
);

CREATE TABLE IF NOT EXISTS reference (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    concentration_id INTEGER NOT NULL REFERENCES concentration (id) ON DELETE CASCADE,
    reference_text TEXT,
    pubmed_id TEXT
);

CREATE TABLE IF NOT EXISTS crawl_state (
    source TEXT PRIMARY KEY,
    completed_at TEXT NOT NULL
);
"#;
